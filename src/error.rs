//! Unified error handling for the caldera crate
//!
//! Domain modules define their own error enums; this module wraps them
//! into a single [`Error`] for use across module boundaries, with a
//! coarse [`ErrorCategory`] classification that the scheduler loop and
//! logging use to decide handling strategy.

use std::io;
use thiserror::Error;

// Re-export domain-specific errors for convenience
pub use crate::generator::GenerationError;
pub use crate::scheduler::SchedulerError;
pub use crate::storage::StorageError;

/// Classification of errors for handling strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Model endpoint and other network failures
    Network,

    /// Model response parsing and validation failures
    Generation,

    /// Database and I/O failures
    Storage,

    /// Configuration and validation failures
    Config,

    /// Scheduler and locking failures
    Scheduler,

    /// Other/unknown errors
    Other,
}

/// Unified error type for the caldera crate
#[derive(Error, Debug)]
pub enum Error {
    /// Generation pipeline errors
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Article and config persistence errors
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Scheduler errors
    #[error("scheduler error: {0}")]
    Scheduler(#[from] SchedulerError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP client errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Process configuration errors
    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Get the error category for handling strategies
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Generation(e) => match e {
                GenerationError::Request(_) | GenerationError::Timeout { .. } => {
                    ErrorCategory::Network
                }
                _ => ErrorCategory::Generation,
            },
            Self::Storage(_) => ErrorCategory::Storage,
            Self::Scheduler(e) => match e {
                SchedulerError::InvalidConfig { .. } => ErrorCategory::Config,
                SchedulerError::Generation(_) => ErrorCategory::Generation,
                SchedulerError::Storage(_) | SchedulerError::Store { .. } => {
                    ErrorCategory::Storage
                }
                _ => ErrorCategory::Scheduler,
            },
            Self::Io(_) => ErrorCategory::Storage,
            Self::Json(_) => ErrorCategory::Generation,
            Self::Http(_) => ErrorCategory::Network,
            Self::Config(_) => ErrorCategory::Config,
        }
    }

    /// Check if this error is recoverable (worth retrying later)
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Generation(e) => !e.is_terminal(),
            Self::Storage(e) => !e.is_duplicate_slug(),
            Self::Scheduler(e) => !e.is_config_validation(),
            Self::Io(_) => true,
            Self::Http(_) => true,
            Self::Json(_) => false,
            Self::Config(_) => false,
        }
    }
}

/// Result type alias using the unified Error type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_timeout_is_network() {
        let err: Error = GenerationError::Timeout { seconds: 60 }.into();
        assert_eq!(err.category(), ErrorCategory::Network);
        assert!(err.is_recoverable());
    }

    #[test]
    fn test_exhausted_generation_is_terminal() {
        let err: Error = GenerationError::Exhausted {
            attempts: 3,
            last_error: "timeout".to_string(),
        }
        .into();
        assert_eq!(err.category(), ErrorCategory::Generation);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_duplicate_slug_category() {
        let err: Error = StorageError::duplicate_slug("some-slug").into();
        assert_eq!(err.category(), ErrorCategory::Storage);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_config_validation_category() {
        let err: Error = SchedulerError::invalid_config("topics", "empty category").into();
        assert_eq!(err.category(), ErrorCategory::Config);
        assert!(!err.is_recoverable());
    }

    #[test]
    fn test_config_error_constructor() {
        let err = Error::config("missing endpoint");
        assert_eq!(err.category(), ErrorCategory::Config);
    }
}
