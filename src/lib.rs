//! caldera - Autonomous SEO content engine
//!
//! The background service behind the Caldera Custom Homes marketing
//! site: a scheduler that periodically decides whether to produce a new
//! SEO article, selects a topic, invokes a text-generation model,
//! validates and deduplicates the result, and persists it for the
//! presentation layer to read.
//!
//! # Architecture
//!
//! The library is organized into several modules:
//!
//! - [`config`] - Process configuration from environment variables
//! - [`models`] - Core data structures (articles, topics, drafts)
//! - [`slug`] - URL slug derivation and deduplication
//! - [`generator`] - Model invocation, validation, and retry policy
//! - [`scheduler`] - Config store, topic rotation, locking, and the
//!   control loop
//! - [`storage`] - Article persistence (SQLite)
//! - [`api`] - Admin configuration API and content read API
//!
//! # Example
//!
//! ```no_run
//! use caldera::config::AppConfig;
//! use caldera::scheduler::{SchedulerLoop, SqliteConfigStore, SystemClock, LocalRunLock};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = AppConfig::from_env()?;
//!     // wire stores, generator, and the loop; see src/main.rs
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod error;
pub mod generator;
pub mod models;
pub mod scheduler;
pub mod slug;
pub mod storage;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::AppConfig;
    pub use crate::error::{Error, ErrorCategory, Result};
    pub use crate::generator::{ArticleGenerator, GenerationError, Generator};
    pub use crate::models::{Article, ArticleDraft, ArticleSummary, Topic};
    pub use crate::scheduler::{
        ConfigStore, RunState, SchedulerConfig, SchedulerLoop, TickOutcome,
    };
    pub use crate::storage::{ArticleFilter, ArticleRepository, SqliteArticleRepository};
}

// Direct re-exports for convenience
pub use models::{Article, ArticleDraft, ArticleSummary, Topic};
