//! State machines for chains and work items.

use serde::{Deserialize, Serialize};

use super::outcome::ChainOutcome;

/// Chain state.
///
/// State transitions:
/// - Advancing -> Advancing (cursor + 1, or suspended for a context hop)
/// - Advancing -> Finished(Succeeded) (cursor reached the task count)
/// - Advancing -> Unwinding (a step reported failure)
/// - Unwinding -> Unwinding (cursor - 1, or suspended for a context hop)
/// - Unwinding -> Finished(RolledBack) (cursor reached zero)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChainState {
    Advancing,
    Unwinding,
    Finished(ChainOutcome),
}

impl ChainState {
    /// Is this a terminal state (no further transitions)?
    pub fn is_terminal(self) -> bool {
        matches!(self, ChainState::Finished(_))
    }
}

/// Which queue a work item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Affinity {
    /// Any background worker thread may run it.
    Background,

    /// Only the primary thread runs it, when it drains its queue.
    Primary,
}

/// Work item status.
///
/// - Pending -> Processing -> Done
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkItemStatus {
    /// Created, or sitting in a queue.
    Pending,

    /// Its job is running right now.
    Processing,

    /// Its job has run; it will never run again.
    Done,
}

impl WorkItemStatus {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            WorkItemStatus::Pending => 0,
            WorkItemStatus::Processing => 1,
            WorkItemStatus::Done => 2,
        }
    }

    pub(crate) fn from_u8(raw: u8) -> Self {
        match raw {
            0 => WorkItemStatus::Pending,
            1 => WorkItemStatus::Processing,
            _ => WorkItemStatus::Done,
        }
    }
}
