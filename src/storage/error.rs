//! Error types for the storage module

use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Storage-specific errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// A slug collided at the storage layer despite pre-resolution.
    /// Terminal for the run; the article is not written.
    #[error("slug already exists: {slug}")]
    DuplicateSlug { slug: String },

    /// Underlying database failure
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Filesystem failure (database directory creation)
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Column (de)serialization failure
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Create a duplicate slug error
    pub fn duplicate_slug(slug: impl Into<String>) -> Self {
        Self::DuplicateSlug { slug: slug.into() }
    }

    /// Whether this error is a slug uniqueness conflict
    pub fn is_duplicate_slug(&self) -> bool {
        matches!(self, Self::DuplicateSlug { .. })
    }
}
