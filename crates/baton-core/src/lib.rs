//! baton-core
//!
//! Transactional task chains on top of a small worker pool.
//!
//! タスクを順番に実行し、途中で失敗したら成功済みのタスクを逆順に
//! ロールバックします。各タスクは実行スレッド（コンテキスト）を宣言し、
//! チェーンは必要に応じて自分自身を別スレッドへ移動させます。
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, outcome, state, errors）
//! - **pool**: WorkerPool（バックグラウンドキュー + primary キュー）と設定
//! - **ports**: ExecutionContext trait
//! - **impls**: CallingContext / WorkerContext / PrimaryContext
//! - **typed**: 型付き Task API
//! - **chain**: ChainBuilder、状態機械、CompletionHandle
//! - **app**: Runtime のワイヤリングと統計

pub mod app;
pub mod chain;
pub mod domain;
pub mod impls;
pub mod pool;
pub mod ports;
pub mod typed;

pub use app::{PoolStats, Runtime, RuntimeBuilder};
pub use chain::{ChainBuilder, CompletionHandle, SuspendedChain};
pub use domain::{
    BuildError, ChainError, ChainId, ChainOutcome, ConfigError, ItemError, PoolError, StepResult,
};
pub use impls::{CallingContext, PrimaryContext, WorkerContext};
pub use pool::{ItemHandle, PoolConfig, WorkItem, WorkerPool};
pub use ports::ExecutionContext;
pub use typed::Task;
