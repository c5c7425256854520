//! CallingContext - 呼び出し元スレッドでそのまま実行する

use crate::chain::SuspendedChain;
use crate::ports::ExecutionContext;

/// Runs the task on whichever thread most recently resumed the chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallingContext;

impl ExecutionContext for CallingContext {
    fn name(&self) -> &'static str {
        "calling"
    }

    fn is_in_target_context(&self) -> bool {
        true
    }

    // Never reached through a chain, since the context is always satisfied.
    fn move_to_target_context(&self, chain: SuspendedChain) {
        chain.resume();
    }
}
