//! Type-erased steps.
//!
//! A chain stores heterogeneous tasks in one `Vec`. Each `Task<I, O, R>` is
//! wrapped in a `TypedStep` that moves values in and out as `Box<dyn Any>`.
//! `ChainBuilder` only accepts tasks whose input matches the previous output,
//! so the downcasts below are expected to always succeed.

use std::any::{Any, type_name};
use std::sync::Arc;

use tracing::error;

use super::task::Task;
use crate::domain::StepResult;
use crate::ports::ExecutionContext;

pub(crate) type Payload = Box<dyn Any + Send>;

pub(crate) enum ErasedResult {
    Success { next: Payload, undo: Payload },
    Failure { reason: String },
}

pub(crate) trait DynStep: Send {
    fn label(&self) -> &str;

    fn context(&self) -> &Arc<dyn ExecutionContext>;

    fn execute_dyn(&self, input: Payload) -> ErasedResult;

    fn rollback_dyn(&self, undo: Payload);
}

pub(crate) struct TypedStep<I, O, R> {
    task: Task<I, O, R>,
}

impl<I, O, R> TypedStep<I, O, R> {
    pub(crate) fn new(task: Task<I, O, R>) -> Self {
        Self { task }
    }
}

impl<I, O, R> DynStep for TypedStep<I, O, R>
where
    I: Send + 'static,
    O: Send + 'static,
    R: Send + 'static,
{
    fn label(&self) -> &str {
        self.task.label()
    }

    fn context(&self) -> &Arc<dyn ExecutionContext> {
        self.task.context()
    }

    fn execute_dyn(&self, input: Payload) -> ErasedResult {
        let input = match input.downcast::<I>() {
            Ok(input) => *input,
            Err(_) => {
                return ErasedResult::Failure {
                    reason: format!("input is not a {}", type_name::<I>()),
                };
            }
        };

        match self.task.execute(input) {
            StepResult::Success { next, undo } => ErasedResult::Success {
                next: Box::new(next),
                undo: Box::new(undo),
            },
            StepResult::Failure { reason } => ErasedResult::Failure { reason },
        }
    }

    fn rollback_dyn(&self, undo: Payload) {
        match undo.downcast::<R>() {
            Ok(undo) => self.task.rollback(*undo),
            Err(_) => error!(
                task = self.task.label(),
                expected = type_name::<R>(),
                "rollback value has the wrong type, skipping rollback"
            ),
        }
    }
}
