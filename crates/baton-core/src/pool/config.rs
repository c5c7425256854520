//! Pool configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::domain::ConfigError;

/// Configuration for a `WorkerPool`.
///
/// Every field has a default, so a config file only needs the keys it changes:
///
/// ```json
/// { "threads": 4, "backlog_warning_threshold": 1000 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Number of background threads. `None` means
    /// `max(hardware concurrency - 1, 1)`.
    pub threads: Option<usize>,

    /// Worker threads are named `{prefix}{index}`.
    pub thread_name_prefix: String,

    /// Route every submitted item to the primary queue.
    /// Useful to debug a chain as if the engine were single-threaded.
    pub force_primary: bool,

    /// Warn when the background backlog reaches this many pending items.
    /// Queues stay unbounded either way. Must be at least 1.
    pub backlog_warning_threshold: Option<usize>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            threads: None,
            thread_name_prefix: "WorkerThread".to_string(),
            force_primary: false,
            backlog_warning_threshold: None,
        }
    }
}

impl PoolConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: PoolConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.threads == Some(0) {
            return Err(ConfigError::ZeroThreads);
        }
        if self.thread_name_prefix.is_empty() {
            return Err(ConfigError::EmptyThreadNamePrefix);
        }
        if self.backlog_warning_threshold == Some(0) {
            return Err(ConfigError::ZeroBacklogThreshold);
        }
        Ok(())
    }

    /// Thread count after applying the hardware default.
    pub fn resolved_threads(&self) -> usize {
        self.threads.unwrap_or_else(default_thread_count)
    }
}

/// One thread is left for the primary context.
fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}
