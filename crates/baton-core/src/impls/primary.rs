//! PrimaryContext - primary スレッド（メインループ）で実行する

use std::sync::Arc;

use crate::chain::SuspendedChain;
use crate::pool::{WorkItem, WorkerPool};
use crate::ports::ExecutionContext;

/// Runs the task on the pool's primary thread.
///
/// Moving here queues a primary-only item; the chain resumes the next time
/// the primary thread calls `drain_primary_queue` (usually once per tick).
#[derive(Debug, Clone)]
pub struct PrimaryContext {
    pool: Arc<WorkerPool>,
}

impl PrimaryContext {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }
}

impl ExecutionContext for PrimaryContext {
    fn name(&self) -> &'static str {
        "primary"
    }

    fn is_in_target_context(&self) -> bool {
        self.pool.is_primary_context()
    }

    fn move_to_target_context(&self, chain: SuspendedChain) {
        self.pool.submit(WorkItem::primary(move || chain.resume()));
    }
}
