//! Status - プールの状態スナップショット

use serde::{Deserialize, Serialize};

/// Point-in-time counters of a `WorkerPool`.
///
/// Values are read without a common lock, so they are only mutually
/// consistent when the pool is quiet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStats {
    pub threads: usize,
    pub pending_background: usize,
    pub pending_primary: usize,
    pub active_workers: usize,
    /// Work items run since the pool started.
    pub processed: u64,
    /// Largest background backlog seen so far.
    pub backlog_high_water: usize,
}
