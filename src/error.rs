//! Error types for aggregation and snapshot caching.

use std::path::PathBuf;

/// Errors raised while building or caching usage snapshots.
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    #[error("tenant directory unavailable: {0}")]
    DirectoryUnavailable(String),

    #[error("snapshot store error for key '{key}': {message}")]
    Store { key: String, message: String },

    #[error("failed to parse network description {}: {message}", .path.display())]
    Network { path: PathBuf, message: String },

    #[error("snapshot serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl UsageError {
    /// Shorthand for a store failure on `key`.
    pub fn store(key: &str, message: impl Into<String>) -> Self {
        Self::Store {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

pub type UsageResult<T> = Result<T, UsageError>;
