//! Errors - エラー型
//!
//! Step failures are NOT errors: they are routed into the chain's rollback
//! path and only surface as `ChainOutcome::RolledBack`. The types below cover
//! what can go wrong around the chains (configuration, thread spawning, a lost
//! completion signal).

use std::path::PathBuf;

use thiserror::Error;

use super::ids::{ChainId, WorkItemId};

/// ConfigError は設定の検証・読み込みエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("thread count must be at least 1")]
    ZeroThreads,

    #[error("thread name prefix must not be empty")]
    EmptyThreadNamePrefix,

    #[error("backlog warning threshold must be at least 1")]
    ZeroBacklogThreshold,

    #[error("failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config json")]
    Parse(#[from] serde_json::Error),
}

/// PoolError は WorkerPool の起動エラー
#[derive(Debug, Error)]
pub enum PoolError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn worker thread {name}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

/// BuildError は Runtime 構築時のエラー
#[derive(Debug, Error)]
pub enum BuildError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// ChainError is what a waiting initiator can observe besides an outcome.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("{0} was dropped before reaching a terminal state")]
    Abandoned(ChainId),
}

/// ItemError is what a caller waiting on a single work item can observe.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ItemError {
    #[error("{0} was dropped before it ran")]
    Dropped(WorkItemId),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_error_is_transparent() {
        let err = BuildError::from(ConfigError::ZeroThreads);
        assert_eq!(err.to_string(), "thread count must be at least 1");
    }

    #[test]
    fn pool_error_wraps_config_error() {
        let err = PoolError::from(ConfigError::ZeroThreads);
        assert!(matches!(err, PoolError::Config(ConfigError::ZeroThreads)));
        assert_eq!(err.to_string(), "thread count must be at least 1");
    }

    #[test]
    fn abandoned_mentions_chain() {
        let id = ChainId::generate();
        let msg = ChainError::Abandoned(id).to_string();
        assert!(msg.starts_with("chain-"));
        assert!(msg.contains("dropped"));
    }
}
