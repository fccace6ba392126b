//! Article persistence
//!
//! Trait-based repository abstraction with a SQLite implementation for
//! production and an in-memory mock for tests. The repository owns id
//! assignment and slug resolution; slug uniqueness is enforced twice:
//! a pre-check via [`crate::slug::unique_slug`] for the common path and
//! a UNIQUE constraint at the storage layer so a race surfaces as
//! [`StorageError::DuplicateSlug`] instead of a silent overwrite.

use std::path::Path;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::error::{StorageError, StorageResult};
use crate::models::{Article, ArticleDraft};
use crate::slug::{slugify, unique_slug};

/// Base slug used when a title reduces to nothing
const FALLBACK_SLUG: &str = "article";

// ============================================================================
// Inputs
// ============================================================================

/// Input to [`ArticleRepository::create`]
#[derive(Debug, Clone)]
pub struct NewArticle {
    pub draft: ArticleDraft,
    pub category: String,
    pub author_name: String,
    pub featured_image: Option<String>,

    /// true = publish immediately, false = store as draft
    pub publish: bool,
}

/// Filter for article listings
#[derive(Debug, Clone, Default)]
pub struct ArticleFilter {
    pub category: Option<String>,
    pub tag: Option<String>,

    /// Drafts are excluded unless explicitly requested
    pub include_drafts: bool,

    pub limit: Option<usize>,
}

// ============================================================================
// Repository Trait
// ============================================================================

/// Repository for generated articles
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Persist a new article; assigns the id and resolves a unique slug
    async fn create(&self, new: NewArticle) -> StorageResult<Article>;

    /// List articles ordered by `published_at` descending
    async fn list(&self, filter: &ArticleFilter) -> StorageResult<Vec<Article>>;

    /// Fetch by slug, atomically incrementing the view counter
    async fn get_by_slug(&self, slug: &str) -> StorageResult<Option<Article>>;

    /// Check whether a slug is taken
    async fn slug_exists(&self, slug: &str) -> StorageResult<bool>;

    /// Check whether identical content was already stored
    async fn content_exists(&self, hash: &str) -> StorageResult<bool>;

    /// Count all articles, drafts included
    async fn count(&self) -> StorageResult<usize>;
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of [`ArticleRepository`]
///
/// Uses `Mutex` to ensure thread-safety for the SQLite connection; the
/// view increment runs as a storage-level `UPDATE ... SET views = views + 1`
/// so concurrent readers never lose counts.
pub struct SqliteArticleRepository {
    conn: Mutex<Connection>,
}

impl SqliteArticleRepository {
    /// Create a new SQLite repository
    pub fn new(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;

        tracing::info!(path = %path.display(), "article repository initialized");
        Ok(repo)
    }

    /// Create in-memory repository (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.create_schema()?;
        Ok(repo)
    }

    fn create_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS articles (
                id TEXT PRIMARY KEY,
                slug TEXT NOT NULL UNIQUE,
                title TEXT NOT NULL,
                excerpt TEXT NOT NULL,
                content TEXT NOT NULL,
                tags TEXT NOT NULL,
                category TEXT NOT NULL,
                meta_description TEXT NOT NULL,
                meta_keywords TEXT NOT NULL,
                author_name TEXT NOT NULL,
                featured_image TEXT,
                published_at TEXT,
                updated_at TEXT NOT NULL,
                views INTEGER NOT NULL DEFAULT 0,
                content_hash TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_articles_category
                ON articles(category);

            CREATE INDEX IF NOT EXISTS idx_articles_published_at
                ON articles(published_at);

            CREATE INDEX IF NOT EXISTS idx_articles_content_hash
                ON articles(content_hash);
            "#,
        )?;

        Ok(())
    }

    fn slug_taken(conn: &Connection, slug: &str) -> bool {
        conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM articles WHERE slug = ?1)",
            params![slug],
            |row| row.get::<_, bool>(0),
        )
        .unwrap_or(false)
    }

    /// Insert with an already-resolved slug; the UNIQUE constraint turns
    /// a racing duplicate into [`StorageError::DuplicateSlug`]
    fn insert(conn: &Connection, article: &Article) -> StorageResult<()> {
        let tags_json = serde_json::to_string(&article.tags)?;

        let result = conn.execute(
            r#"
            INSERT INTO articles (
                id, slug, title, excerpt, content, tags, category,
                meta_description, meta_keywords, author_name, featured_image,
                published_at, updated_at, views, content_hash
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            "#,
            params![
                article.id,
                article.slug,
                article.title,
                article.excerpt,
                article.content,
                tags_json,
                article.category,
                article.meta_description,
                article.meta_keywords,
                article.author_name,
                article.featured_image,
                article.published_at.map(|t| t.to_rfc3339()),
                article.updated_at.to_rfc3339(),
                article.views as i64,
                article.content_hash,
            ],
        );

        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StorageError::duplicate_slug(&article.slug))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn row_to_article(row: &rusqlite::Row<'_>) -> rusqlite::Result<Article> {
        let tags_json: String = row.get(5)?;
        let tags: Vec<String> = serde_json::from_str(&tags_json).unwrap_or_default();

        Ok(Article {
            id: row.get(0)?,
            slug: row.get(1)?,
            title: row.get(2)?,
            excerpt: row.get(3)?,
            content: row.get(4)?,
            tags,
            category: row.get(6)?,
            meta_description: row.get(7)?,
            meta_keywords: row.get(8)?,
            author_name: row.get(9)?,
            featured_image: row.get(10)?,
            published_at: row
                .get::<_, Option<String>>(11)?
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            updated_at: row
                .get::<_, String>(12)?
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
            views: row.get::<_, i64>(13)? as u64,
            content_hash: row.get(14)?,
        })
    }

    const SELECT_COLUMNS: &'static str = "id, slug, title, excerpt, content, tags, category, \
         meta_description, meta_keywords, author_name, featured_image, \
         published_at, updated_at, views, content_hash";
}

/// Build an [`Article`] from a creation request; slug must already be
/// resolved against existing articles
fn build_article(new: NewArticle, slug: String, now: DateTime<Utc>) -> Article {
    let content_hash = new.draft.content_hash();
    Article {
        id: Uuid::new_v4().to_string(),
        slug,
        title: new.draft.title,
        excerpt: new.draft.excerpt,
        content: new.draft.content,
        tags: new.draft.tags,
        category: new.category,
        meta_description: new.draft.meta_description,
        meta_keywords: new.draft.meta_keywords,
        author_name: new.author_name,
        featured_image: new.featured_image,
        published_at: new.publish.then_some(now),
        updated_at: now,
        views: 0,
        content_hash: Some(content_hash),
    }
}

/// Derive the base slug for a title, with a fallback for titles that
/// reduce to nothing
fn base_slug(title: &str) -> String {
    let base = slugify(title);
    if base.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        base
    }
}

#[async_trait]
impl ArticleRepository for SqliteArticleRepository {
    async fn create(&self, new: NewArticle) -> StorageResult<Article> {
        let conn = self.conn.lock().unwrap();

        let base = base_slug(&new.draft.title);
        let slug = unique_slug(&base, |candidate| Self::slug_taken(&conn, candidate));

        let article = build_article(new, slug, Utc::now());
        Self::insert(&conn, &article)?;

        tracing::info!(slug = %article.slug, category = %article.category, "article stored");
        Ok(article)
    }

    async fn list(&self, filter: &ArticleFilter) -> StorageResult<Vec<Article>> {
        let conn = self.conn.lock().unwrap();

        let mut sql = format!("SELECT {} FROM articles", Self::SELECT_COLUMNS);
        let mut clauses: Vec<String> = Vec::new();
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

        if !filter.include_drafts {
            clauses.push("published_at IS NOT NULL".to_string());
        }
        if let Some(ref category) = filter.category {
            args.push(Box::new(category.clone()));
            clauses.push(format!("category = ?{}", args.len()));
        }
        if let Some(ref tag) = filter.tag {
            // tags are stored as a JSON array of strings
            args.push(Box::new(format!("%\"{tag}\"%")));
            clauses.push(format!("tags LIKE ?{}", args.len()));
        }

        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        // NULL published_at sorts last under DESC, so drafts trail
        sql.push_str(" ORDER BY published_at DESC");
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let articles = stmt
            .query_map(params.as_slice(), Self::row_to_article)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(articles)
    }

    async fn get_by_slug(&self, slug: &str) -> StorageResult<Option<Article>> {
        let conn = self.conn.lock().unwrap();

        // Storage-level increment; never read-modify-write in application code
        let changed = conn.execute(
            "UPDATE articles SET views = views + 1 WHERE slug = ?1",
            params![slug],
        )?;
        if changed == 0 {
            return Ok(None);
        }

        let article = conn
            .query_row(
                &format!(
                    "SELECT {} FROM articles WHERE slug = ?1",
                    Self::SELECT_COLUMNS
                ),
                params![slug],
                Self::row_to_article,
            )
            .optional()?;

        Ok(article)
    }

    async fn slug_exists(&self, slug: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        Ok(Self::slug_taken(&conn, slug))
    }

    async fn content_exists(&self, hash: &str) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM articles WHERE content_hash = ?1)",
            params![hash],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    async fn count(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM articles", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

// ============================================================================
// Mock Implementation (for testing)
// ============================================================================

/// In-memory mock implementation of [`ArticleRepository`]
pub struct MockArticleRepository {
    articles: RwLock<Vec<Article>>,
    fail_creates: std::sync::atomic::AtomicBool,
}

impl MockArticleRepository {
    /// Create a new mock repository
    pub fn new() -> Self {
        Self {
            articles: RwLock::new(Vec::new()),
            fail_creates: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Make subsequent create calls fail with a database error
    pub fn set_fail_creates(&self, fail: bool) {
        self.fail_creates
            .store(fail, std::sync::atomic::Ordering::SeqCst);
    }

    /// Get the number of stored articles
    pub fn len(&self) -> usize {
        self.articles.read().unwrap().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.articles.read().unwrap().is_empty()
    }
}

impl Default for MockArticleRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArticleRepository for MockArticleRepository {
    async fn create(&self, new: NewArticle) -> StorageResult<Article> {
        if self.fail_creates.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(StorageError::Database(rusqlite::Error::InvalidQuery));
        }

        let mut articles = self.articles.write().unwrap();

        let base = base_slug(&new.draft.title);
        let slug = unique_slug(&base, |candidate| {
            articles.iter().any(|a| a.slug == candidate)
        });

        let article = build_article(new, slug, Utc::now());
        articles.push(article.clone());
        Ok(article)
    }

    async fn list(&self, filter: &ArticleFilter) -> StorageResult<Vec<Article>> {
        let articles = self.articles.read().unwrap();
        let mut matched: Vec<Article> = articles
            .iter()
            .filter(|a| filter.include_drafts || !a.is_draft())
            .filter(|a| filter.category.as_ref().map_or(true, |c| &a.category == c))
            .filter(|a| filter.tag.as_ref().map_or(true, |t| a.tags.contains(t)))
            .cloned()
            .collect();

        matched.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        if let Some(limit) = filter.limit {
            matched.truncate(limit);
        }
        Ok(matched)
    }

    async fn get_by_slug(&self, slug: &str) -> StorageResult<Option<Article>> {
        let mut articles = self.articles.write().unwrap();
        Ok(articles.iter_mut().find(|a| a.slug == slug).map(|a| {
            a.views += 1;
            a.clone()
        }))
    }

    async fn slug_exists(&self, slug: &str) -> StorageResult<bool> {
        let articles = self.articles.read().unwrap();
        Ok(articles.iter().any(|a| a.slug == slug))
    }

    async fn content_exists(&self, hash: &str) -> StorageResult<bool> {
        let articles = self.articles.read().unwrap();
        Ok(articles
            .iter()
            .any(|a| a.content_hash.as_deref() == Some(hash)))
    }

    async fn count(&self) -> StorageResult<usize> {
        Ok(self.articles.read().unwrap().len())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample_new(title: &str, publish: bool) -> NewArticle {
        NewArticle {
            draft: ArticleDraft {
                title: title.to_string(),
                excerpt: "Teaser".to_string(),
                content: format!("Body for {title}"),
                tags: vec!["bend".to_string(), "homes".to_string()],
                meta_description: "desc".to_string(),
                meta_keywords: "kw".to_string(),
            },
            category: "Neighborhoods".to_string(),
            author_name: "Caldera Custom Homes".to_string(),
            featured_image: None,
            publish,
        }
    }

    fn repos() -> Vec<Arc<dyn ArticleRepository>> {
        vec![
            Arc::new(SqliteArticleRepository::in_memory().unwrap()),
            Arc::new(MockArticleRepository::new()),
        ]
    }

    #[tokio::test]
    async fn test_create_assigns_slug_and_defaults() {
        for repo in repos() {
            let article = repo
                .create(sample_new("Custom Homes in Bend, Oregon!", true))
                .await
                .unwrap();

            assert_eq!(article.slug, "custom-homes-in-bend-oregon");
            assert_eq!(article.views, 0);
            assert!(article.published_at.is_some());
            assert!(article.content_hash.is_some());
            assert!(!article.id.is_empty());
        }
    }

    #[tokio::test]
    async fn test_create_suffixes_colliding_titles() {
        for repo in repos() {
            let first = repo.create(sample_new("Same Title", true)).await.unwrap();
            let second = repo.create(sample_new("Same Title", true)).await.unwrap();

            assert_eq!(first.slug, "same-title");
            assert_eq!(second.slug, "same-title-2");
        }
    }

    #[tokio::test]
    async fn test_create_falls_back_for_empty_slug() {
        for repo in repos() {
            let article = repo.create(sample_new("!?!?", true)).await.unwrap();
            assert_eq!(article.slug, "article");
        }
    }

    #[tokio::test]
    async fn test_insert_rejects_duplicate_slug_at_storage_layer() {
        let repo = SqliteArticleRepository::in_memory().unwrap();

        let first = repo.create(sample_new("Race Title", true)).await.unwrap();

        // Simulate the losing side of a race: same slug, straight to insert
        let clashing = build_article(
            sample_new("Race Title", true),
            first.slug.clone(),
            Utc::now(),
        );
        let conn = repo.conn.lock().unwrap();
        let err = SqliteArticleRepository::insert(&conn, &clashing).unwrap_err();
        assert!(err.is_duplicate_slug());
    }

    #[tokio::test]
    async fn test_list_excludes_drafts_by_default() {
        for repo in repos() {
            repo.create(sample_new("Published", true)).await.unwrap();
            repo.create(sample_new("Draft", false)).await.unwrap();

            let published = repo.list(&ArticleFilter::default()).await.unwrap();
            assert_eq!(published.len(), 1);
            assert_eq!(published[0].slug, "published");

            let all = repo
                .list(&ArticleFilter {
                    include_drafts: true,
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(all.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_list_filters_by_category_and_tag() {
        for repo in repos() {
            let mut other = sample_new("Other Category", true);
            other.category = "Market Trends".to_string();
            other.draft.tags = vec!["market".to_string()];

            repo.create(sample_new("In Neighborhoods", true))
                .await
                .unwrap();
            repo.create(other).await.unwrap();

            let by_category = repo
                .list(&ArticleFilter {
                    category: Some("Market Trends".to_string()),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(by_category.len(), 1);
            assert_eq!(by_category[0].slug, "other-category");

            let by_tag = repo
                .list(&ArticleFilter {
                    tag: Some("bend".to_string()),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(by_tag.len(), 1);
            assert_eq!(by_tag[0].slug, "in-neighborhoods");
        }
    }

    #[tokio::test]
    async fn test_list_respects_limit() {
        for repo in repos() {
            for i in 0..5 {
                repo.create(sample_new(&format!("Article {i}"), true))
                    .await
                    .unwrap();
            }

            let limited = repo
                .list(&ArticleFilter {
                    limit: Some(2),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(limited.len(), 2);
        }
    }

    #[tokio::test]
    async fn test_get_by_slug_increments_views() {
        for repo in repos() {
            repo.create(sample_new("Viewed", true)).await.unwrap();

            let first = repo.get_by_slug("viewed").await.unwrap().unwrap();
            assert_eq!(first.views, 1);

            let second = repo.get_by_slug("viewed").await.unwrap().unwrap();
            assert_eq!(second.views, 2);

            let missing = repo.get_by_slug("missing").await.unwrap();
            assert!(missing.is_none());
        }
    }

    #[tokio::test]
    async fn test_concurrent_views_increase_by_exactly_n() {
        for repo in repos() {
            repo.create(sample_new("Hot Article", true)).await.unwrap();

            let mut handles = Vec::new();
            for _ in 0..20 {
                let repo = repo.clone();
                handles.push(tokio::spawn(async move {
                    repo.get_by_slug("hot-article").await.unwrap();
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }

            let latest = repo.get_by_slug("hot-article").await.unwrap().unwrap();
            assert_eq!(latest.views, 21);
        }
    }

    #[tokio::test]
    async fn test_content_exists() {
        for repo in repos() {
            let article = repo.create(sample_new("Hashed", true)).await.unwrap();
            let hash = article.content_hash.unwrap();

            assert!(repo.content_exists(&hash).await.unwrap());
            assert!(!repo.content_exists("0000").await.unwrap());
        }
    }

    #[tokio::test]
    async fn test_persisted_roundtrip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("articles.db");

        {
            let repo = SqliteArticleRepository::new(&path).unwrap();
            repo.create(sample_new("Durable", true)).await.unwrap();
        }

        let reopened = SqliteArticleRepository::new(&path).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 1);
        let article = reopened.get_by_slug("durable").await.unwrap().unwrap();
        assert_eq!(article.tags, vec!["bend".to_string(), "homes".to_string()]);
    }

    #[tokio::test]
    async fn test_mock_failure_toggle() {
        let repo = MockArticleRepository::new();
        repo.set_fail_creates(true);
        assert!(repo.create(sample_new("Nope", true)).await.is_err());
        assert!(repo.is_empty());

        repo.set_fail_creates(false);
        assert!(repo.create(sample_new("Yep", true)).await.is_ok());
        assert_eq!(repo.len(), 1);
    }
}
