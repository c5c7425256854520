//! Task - 型付きタスク
//!
//! `Task<I, O, R>` は 3 つの要素で構成されます：
//!
//! - ExecutionContext（どのスレッドで実行するか）
//! - execute: `I -> StepResult<O, R>`
//! - rollback: `R -> ()`（後続のタスクが失敗したときだけ呼ばれる）
//!
//! タスクは再利用できます。`Clone` は中身の関数を `Arc` で共有するだけです。

use std::fmt;
use std::sync::Arc;

use crate::domain::StepResult;
use crate::ports::ExecutionContext;

type ExecuteFn<I, O, R> = dyn Fn(I) -> StepResult<O, R> + Send + Sync;
type RollbackFn<R> = dyn Fn(R) + Send + Sync;

/// A reusable, context-bound unit of work with its compensating action.
///
/// `I` is consumed by `execute`; on success `O` feeds the next task and `R`
/// is kept until the chain either finishes (then it is dropped) or unwinds
/// past this task (then it is handed to `rollback`).
///
/// Rollback cannot fail. A compensation that can go wrong has to deal with
/// that itself, for example by logging and moving on.
pub struct Task<I, O, R = ()> {
    label: String,
    context: Arc<dyn ExecutionContext>,
    execute: Arc<ExecuteFn<I, O, R>>,
    rollback: Arc<RollbackFn<R>>,
}

impl<I, O, R> Task<I, O, R>
where
    I: Send + 'static,
    O: Send + 'static,
    R: Send + 'static,
{
    pub fn new(
        context: impl ExecutionContext,
        execute: impl Fn(I) -> StepResult<O, R> + Send + Sync + 'static,
        rollback: impl Fn(R) + Send + Sync + 'static,
    ) -> Self {
        Self::with_context(Arc::new(context), execute, rollback)
    }

    /// Same as `new`, for a context that is already shared.
    pub fn with_context(
        context: Arc<dyn ExecutionContext>,
        execute: impl Fn(I) -> StepResult<O, R> + Send + Sync + 'static,
        rollback: impl Fn(R) + Send + Sync + 'static,
    ) -> Self {
        Self {
            label: "task".to_string(),
            context,
            execute: Arc::new(execute),
            rollback: Arc::new(rollback),
        }
    }

    /// Label used in log lines. Defaults to `"task"`.
    pub fn named(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn context(&self) -> &Arc<dyn ExecutionContext> {
        &self.context
    }

    pub fn execute(&self, input: I) -> StepResult<O, R> {
        (self.execute)(input)
    }

    pub fn rollback(&self, undo: R) {
        (self.rollback)(undo)
    }
}

impl<I, O> Task<I, O, ()>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// A task with nothing to compensate.
    pub fn forward_only(
        context: impl ExecutionContext,
        execute: impl Fn(I) -> StepResult<O, ()> + Send + Sync + 'static,
    ) -> Self {
        Self::new(context, execute, |()| {})
    }
}

// derive(Clone) would require I: Clone, O: Clone, R: Clone.
impl<I, O, R> Clone for Task<I, O, R> {
    fn clone(&self) -> Self {
        Self {
            label: self.label.clone(),
            context: Arc::clone(&self.context),
            execute: Arc::clone(&self.execute),
            rollback: Arc::clone(&self.rollback),
        }
    }
}

impl<I, O, R> fmt::Debug for Task<I, O, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("label", &self.label)
            .field("context", &self.context.name())
            .finish_non_exhaustive()
    }
}
