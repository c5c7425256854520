//! ExecutionContext port - 実行コンテキストの抽象化
//!
//! タスクは「どのスレッドで実行されるべきか」を ExecutionContext で宣言します。
//! チェーンは各ステップの前に 2 つの操作だけを使います：
//!
//! - `is_in_target_context()`: 今のスレッドで実行してよいか
//! - `move_to_target_context(chain)`: チェーンの所有権を受け取り、
//!   目的のコンテキストで後から `resume()` する
//!
//! # 実装
//! - **CallingContext**: 常に true（サスペンドしない）
//! - **WorkerContext**: WorkerPool のワーカースレッド
//! - **PrimaryContext**: WorkerPool の primary スレッド（tick で drain）

use crate::chain::SuspendedChain;

/// A thread-affinity requirement a task declares.
///
/// # Contract
/// - `move_to_target_context` takes ownership of the suspended chain and must
///   eventually call `SuspendedChain::resume` on a thread where
///   `is_in_target_context()` holds. It must not resume on the calling stack
///   unless the calling thread already satisfies the context.
/// - Dropping the chain instead abandons it; its initiator observes
///   `ChainError::Abandoned`.
pub trait ExecutionContext: Send + Sync + 'static {
    /// Short name for log fields.
    fn name(&self) -> &'static str;

    fn is_in_target_context(&self) -> bool;

    fn move_to_target_context(&self, chain: SuspendedChain);
}
