//! App - アプリケーション層
//!
//! # 主要コンポーネント
//! - **RuntimeBuilder / Runtime**: プールの構築とコンテキストの提供
//! - **PoolStats**: プールの状態スナップショット

pub mod runtime;
pub mod status;

pub use self::runtime::{Runtime, RuntimeBuilder};
pub use self::status::PoolStats;
