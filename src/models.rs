// Core data structures for the caldera content engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// A generated SEO article as persisted by the repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    /// Repository-assigned identifier (UUID v4)
    pub id: String,

    /// Unique URL-safe identifier, immutable after creation
    pub slug: String,

    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub tags: Vec<String>,
    pub category: String,
    pub meta_description: String,
    pub meta_keywords: String,
    pub author_name: String,
    pub featured_image: Option<String>,

    /// None = draft, excluded from public listing
    pub published_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,

    /// Monotonically non-decreasing view counter
    pub views: u64,

    /// SHA256 of content, for duplicate-content detection
    pub content_hash: Option<String>,
}

impl Article {
    /// Check whether this article is an unpublished draft
    pub fn is_draft(&self) -> bool {
        self.published_at.is_none()
    }

    /// Reduce to the summary shape returned by list endpoints
    pub fn summary(&self) -> ArticleSummary {
        ArticleSummary {
            id: self.id.clone(),
            slug: self.slug.clone(),
            title: self.title.clone(),
            excerpt: self.excerpt.clone(),
            category: self.category.clone(),
            tags: self.tags.clone(),
            published_at: self.published_at,
            views: self.views,
        }
    }
}

/// Article summary without the body, for listings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleSummary {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub excerpt: String,
    pub category: String,
    pub tags: Vec<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub views: u64,
}

/// Validated output of one model invocation
///
/// Produced only by the generator after schema validation; downstream
/// code never re-checks field presence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArticleDraft {
    pub title: String,
    pub excerpt: String,
    pub content: String,
    pub tags: Vec<String>,
    pub meta_description: String,
    pub meta_keywords: String,
}

impl ArticleDraft {
    /// Calculate content hash using SHA256
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.content.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// A category plus keywords used to bias a generated article's subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub category: String,

    #[serde(default)]
    pub keywords: Vec<String>,
}

impl Topic {
    pub fn new(category: impl Into<String>, keywords: Vec<&str>) -> Self {
        Self {
            category: category.into(),
            keywords: keywords.into_iter().map(String::from).collect(),
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.keywords.is_empty() {
            write!(f, "{}", self.category)
        } else {
            write!(f, "{} [{}]", self.category, self.keywords.join(", "))
        }
    }
}

/// Transient record of one scheduler run
///
/// Exists only for the duration of a tick; logged, never persisted.
#[derive(Debug, Clone)]
pub struct GenerationAttempt {
    pub topic: Topic,
    pub attempts: u32,
    pub outcome: AttemptOutcome,
}

/// How a generation run ended
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    Published { slug: String },
    Failed { reason: String },
}

impl GenerationAttempt {
    pub fn published(topic: Topic, attempts: u32, slug: impl Into<String>) -> Self {
        Self {
            topic,
            attempts,
            outcome: AttemptOutcome::Published { slug: slug.into() },
        }
    }

    pub fn failed(topic: Topic, attempts: u32, reason: impl Into<String>) -> Self {
        Self {
            topic,
            attempts,
            outcome: AttemptOutcome::Failed {
                reason: reason.into(),
            },
        }
    }

    /// Whether the run produced an article
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Published { .. })
    }
}
