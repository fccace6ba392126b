//! Error types for the scheduler module

use thiserror::Error;

use crate::generator::GenerationError;
use crate::storage::StorageError;

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;

/// Scheduler-specific errors
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A configuration update was rejected; nothing was written
    #[error("invalid scheduler config '{field}': {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Config store read/write failure
    #[error("config store error during '{operation}': {reason}")]
    Store { operation: String, reason: String },

    /// Run lock acquisition or release failure (NOT the lock being
    /// held; a held lock is a normal no-op outcome, not an error)
    #[error("run lock error: {0}")]
    Lock(String),

    /// Generation pipeline failure, terminal for the run
    #[error(transparent)]
    Generation(#[from] GenerationError),

    /// Article persistence failure, terminal for the run
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SchedulerError {
    /// Create an invalid config error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a store error with operation context
    pub fn store(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Store {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error should be surfaced synchronously to an API
    /// caller rather than contained at the loop boundary
    pub fn is_config_validation(&self) -> bool {
        matches!(self, Self::InvalidConfig { .. })
    }
}

impl From<rusqlite::Error> for SchedulerError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Store {
            operation: "query".to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        Self::Store {
            operation: "serialize".to_string(),
            reason: err.to_string(),
        }
    }
}
