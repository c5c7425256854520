//! Impls - ExecutionContext の実装
//!
//! # 含まれる実装
//! - **CallingContext**: 呼び出し元スレッド
//! - **WorkerContext**: WorkerPool のワーカースレッド
//! - **PrimaryContext**: WorkerPool の primary スレッド

pub mod calling;
pub mod primary;
pub mod worker;

pub use self::calling::CallingContext;
pub use self::primary::PrimaryContext;
pub use self::worker::WorkerContext;
