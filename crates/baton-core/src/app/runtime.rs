//! Runtime - プールとコンテキストのワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - グローバルシングルトンを使わず、明示的に渡す
//!
//! Runtime は起動フェーズで 1 回だけ作り、必要なサブシステムに渡します。
//! 構築したスレッドが primary スレッドになります。

use std::path::Path;
use std::sync::Arc;

use super::status::PoolStats;
use crate::domain::BuildError;
use crate::impls::{CallingContext, PrimaryContext, WorkerContext};
use crate::pool::{ItemHandle, PoolConfig, WorkItem, WorkerPool};

/// RuntimeBuilder は Runtime を構築
///
/// # 使用例
/// ```ignore
/// let runtime = RuntimeBuilder::new()
///     .threads(4)
///     .build()?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct RuntimeBuilder {
    config: PoolConfig,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a JSON config file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, BuildError> {
        Ok(Self::new().config(PoolConfig::from_file(path)?))
    }

    /// The configuration `build` would start the pool with.
    pub fn config_ref(&self) -> &PoolConfig {
        &self.config
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: PoolConfig) -> Self {
        self.config = config;
        self
    }

    pub fn threads(mut self, threads: usize) -> Self {
        self.config.threads = Some(threads);
        self
    }

    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    pub fn force_primary(mut self, force_primary: bool) -> Self {
        self.config.force_primary = force_primary;
        self
    }

    pub fn backlog_warning_threshold(mut self, threshold: usize) -> Self {
        self.config.backlog_warning_threshold = Some(threshold);
        self
    }

    /// Validate the configuration and start the pool.
    pub fn build(self) -> Result<Runtime, BuildError> {
        self.config.validate()?;
        let pool = WorkerPool::start(self.config)?;
        Ok(Runtime { pool })
    }
}

/// Runtime は WorkerPool を所有し、3 種類のコンテキストを提供する
pub struct Runtime {
    pool: Arc<WorkerPool>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn pool(&self) -> &Arc<WorkerPool> {
        &self.pool
    }

    pub fn calling(&self) -> CallingContext {
        CallingContext
    }

    pub fn worker(&self) -> WorkerContext {
        WorkerContext::new(Arc::clone(&self.pool))
    }

    pub fn primary(&self) -> PrimaryContext {
        PrimaryContext::new(Arc::clone(&self.pool))
    }

    pub fn submit(&self, item: Arc<WorkItem>) {
        self.pool.submit(item);
    }

    /// See `WorkerPool::call_in_worker`.
    pub fn call_in_worker(&self, job: impl FnOnce() + Send + 'static) -> ItemHandle {
        self.pool.call_in_worker(job)
    }

    /// Run the primary work queued so far. Call once per iteration of the
    /// primary loop. Returns the number of items run.
    pub fn tick(&self) -> usize {
        self.pool.drain_primary_queue()
    }

    pub fn wait_idle(&self) {
        self.pool.wait_idle();
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Finish all queued work and stop the worker threads.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

impl Drop for Runtime {
    // Tasks and queued chains hold their own references to the pool, so the
    // pool itself may outlive this handle.
    fn drop(&mut self) {
        self.pool.shutdown();
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime").field("pool", &self.pool).finish()
    }
}
