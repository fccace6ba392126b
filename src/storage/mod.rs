//! Article persistence
//!
//! SQLite-backed storage for generated articles, behind a repository
//! trait so the scheduler and API can be tested against an in-memory
//! mock.

pub mod error;
pub mod repository;

pub use error::{StorageError, StorageResult};
pub use repository::{
    ArticleFilter, ArticleRepository, MockArticleRepository, NewArticle, SqliteArticleRepository,
};
