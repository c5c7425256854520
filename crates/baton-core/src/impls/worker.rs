//! WorkerContext - WorkerPool のバックグラウンドスレッドで実行する

use std::sync::Arc;

use crate::chain::SuspendedChain;
use crate::pool::{WorkItem, WorkerPool};
use crate::ports::ExecutionContext;

/// Runs the task on one of the pool's background threads.
///
/// Moving here submits a background work item that resumes the chain
/// exactly where it left off.
#[derive(Debug, Clone)]
pub struct WorkerContext {
    pool: Arc<WorkerPool>,
}

impl WorkerContext {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }
}

impl ExecutionContext for WorkerContext {
    fn name(&self) -> &'static str {
        "worker"
    }

    fn is_in_target_context(&self) -> bool {
        self.pool.is_worker_context()
    }

    fn move_to_target_context(&self, chain: SuspendedChain) {
        self.pool.submit(WorkItem::background(move || chain.resume()));
    }
}
