//! Pool module: configuration, work items, and the worker pool itself.

mod config;
mod handle;
mod item;
mod worker_pool;

pub use config::PoolConfig;
pub use handle::ItemHandle;
pub use item::WorkItem;
pub use worker_pool::WorkerPool;
