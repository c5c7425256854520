//! Outcome model: what a single step reports, and how a whole chain ends.
//!
//! This module is context-agnostic: it does not know about threads or pools.
//! It only defines the "shape" of results that flow through a chain.

use serde::{Deserialize, Serialize};

/// Terminal outcome of a task chain.
///
/// Exactly one of these is delivered to the initiator, exactly once.
/// Serialized as SCREAMING_SNAKE_CASE: SUCCEEDED / ROLLED_BACK.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChainOutcome {
    /// Every task's execution operation reported success.
    Succeeded,

    /// A task failed; every task that had succeeded before it was rolled back.
    RolledBack,
}

impl ChainOutcome {
    pub fn is_success(self) -> bool {
        matches!(self, ChainOutcome::Succeeded)
    }
}

/// Result of one task's execution operation.
///
/// On success a step hands two values onward:
/// - `next`: the input of the following task
/// - `undo`: what this task's own rollback needs if a later task fails
///
/// On failure nothing is handed on; the reason is only logged; the initiator
/// just sees `ChainOutcome::RolledBack`.
#[derive(Debug, Clone, PartialEq)]
pub enum StepResult<O, R> {
    Success { next: O, undo: R },
    Failure { reason: String },
}

impl<O, R> StepResult<O, R> {
    pub fn success(next: O, undo: R) -> Self {
        StepResult::Success { next, undo }
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        StepResult::Failure {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, StepResult::Success { .. })
    }
}

impl<O> StepResult<O, ()> {
    /// Success for a task with nothing to undo.
    pub fn done(next: O) -> Self {
        StepResult::Success { next, undo: () }
    }
}
