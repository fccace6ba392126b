//! Durable scheduler configuration
//!
//! A single `scheduler_config` row holds the runtime-editable settings:
//! enabled flag, publish cadence, topic list, and the last/next run
//! timestamps. The row is created with defaults on first boot and never
//! destroyed. A small `scheduler_state` key-value table carries
//! checkpoint data such as the previously used topic category.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::clock::Clock;
use super::error::{SchedulerError, SchedulerResult};
use crate::models::Topic;

/// Publish cadence bounds; writes outside the range are clamped, not
/// rejected
pub const ARTICLES_PER_DAY_MIN: u32 = 1;
pub const ARTICLES_PER_DAY_MAX: u32 = 10;

const SECONDS_PER_DAY: i64 = 86_400;

/// Clamp a requested cadence into the supported range
///
/// The silent clamp is the documented contract: 0 becomes 1, 15
/// becomes 10, in-range values pass through.
pub fn clamp_articles_per_day(requested: i64) -> u32 {
    requested.clamp(ARTICLES_PER_DAY_MIN as i64, ARTICLES_PER_DAY_MAX as i64) as u32
}

// ============================================================================
// Config Row
// ============================================================================

/// The scheduler's runtime configuration (singleton row)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub enabled: bool,

    /// Articles generated per day, always within [1, 10]
    pub articles_per_day: u32,

    /// Topic catalog; when empty the rotator falls back to the
    /// built-in catalog
    pub topics: Vec<Topic>,

    pub last_run_at: Option<DateTime<Utc>>,

    /// When the next run is due; unset means not yet scheduled
    pub next_run_at: Option<DateTime<Utc>>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            articles_per_day: ARTICLES_PER_DAY_MIN,
            topics: Vec::new(),
            last_run_at: None,
            next_run_at: None,
        }
    }
}

impl SchedulerConfig {
    /// Gap between runs implied by the cadence (24h / articles_per_day)
    pub fn interval(&self) -> Duration {
        Duration::seconds(SECONDS_PER_DAY / self.articles_per_day as i64)
    }
}

/// Sparse configuration update; absent fields are left unchanged
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    pub enabled: Option<bool>,

    /// Clamped to [1, 10] before storage
    pub articles_per_day: Option<i64>,

    /// Replaces the full topic list (no partial merge)
    pub topics: Option<Vec<Topic>>,
}

impl ConfigUpdate {
    /// Reject updates the store must never accept; the clamp handles
    /// out-of-range cadence, so only topic shape is checked here
    pub fn validate(&self) -> SchedulerResult<()> {
        if let Some(ref topics) = self.topics {
            for topic in topics {
                if topic.category.trim().is_empty() {
                    return Err(SchedulerError::invalid_config(
                        "topics",
                        "topic category cannot be empty",
                    ));
                }
            }
        }
        Ok(())
    }
}

// ============================================================================
// Store Trait
// ============================================================================

/// Durable storage for the scheduler configuration
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Read the current configuration (side-effect free)
    async fn get(&self) -> SchedulerResult<SchedulerConfig>;

    /// Apply a sparse update and return the post-write configuration.
    ///
    /// Atomic with respect to concurrent writers (last-writer-wins at
    /// the row level). Enabling the scheduler with no scheduled run
    /// makes it due immediately.
    async fn update(&self, update: ConfigUpdate) -> SchedulerResult<SchedulerConfig>;

    /// Record a completed (or failed) run's timestamps.
    /// Invariant: `next_run_at > last_run_at`.
    async fn record_run(
        &self,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> SchedulerResult<()>;

    /// Save a checkpoint value
    async fn save_state(&self, key: &str, value: &str) -> SchedulerResult<()>;

    /// Load a checkpoint value
    async fn load_state(&self, key: &str) -> SchedulerResult<Option<String>>;
}

/// Apply a validated update to a config snapshot
fn apply_update(
    mut config: SchedulerConfig,
    update: ConfigUpdate,
    now: DateTime<Utc>,
) -> SchedulerConfig {
    if let Some(enabled) = update.enabled {
        config.enabled = enabled;
    }
    if let Some(requested) = update.articles_per_day {
        config.articles_per_day = clamp_articles_per_day(requested);
    }
    if let Some(topics) = update.topics {
        config.topics = topics;
    }
    // An enabled scheduler with nothing scheduled is due immediately
    if config.enabled && config.next_run_at.is_none() {
        config.next_run_at = Some(now);
    }
    config
}

fn check_run_invariant(
    last_run_at: DateTime<Utc>,
    next_run_at: DateTime<Utc>,
) -> SchedulerResult<()> {
    if next_run_at <= last_run_at {
        return Err(SchedulerError::invalid_config(
            "next_run_at",
            "next run must be after the last run",
        ));
    }
    Ok(())
}

// ============================================================================
// SQLite Implementation
// ============================================================================

/// SQLite implementation of [`ConfigStore`]
pub struct SqliteConfigStore {
    conn: Mutex<Connection>,
    clock: Arc<dyn Clock>,
}

impl SqliteConfigStore {
    /// Open (and initialize on first boot) the config store
    pub fn new(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> SchedulerResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SchedulerError::store("create_dir", e.to_string()))?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Mutex::new(conn),
            clock,
        };
        store.create_schema()?;

        tracing::info!(path = %path.display(), "config store initialized");
        Ok(store)
    }

    /// Create in-memory store (for testing)
    pub fn in_memory(clock: Arc<dyn Clock>) -> SchedulerResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
            clock,
        };
        store.create_schema()?;
        Ok(store)
    }

    fn create_schema(&self) -> SchedulerResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scheduler_config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                enabled INTEGER NOT NULL,
                articles_per_day INTEGER NOT NULL,
                topics TEXT NOT NULL,
                last_run_at TEXT,
                next_run_at TEXT
            );

            CREATE TABLE IF NOT EXISTS scheduler_state (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )?;

        // Seed the singleton row on first boot
        let defaults = SchedulerConfig::default();
        conn.execute(
            "INSERT OR IGNORE INTO scheduler_config (id, enabled, articles_per_day, topics)
             VALUES (1, ?1, ?2, ?3)",
            params![
                defaults.enabled,
                defaults.articles_per_day,
                serde_json::to_string(&defaults.topics)?,
            ],
        )?;

        Ok(())
    }

    fn read_config(conn: &Connection) -> SchedulerResult<SchedulerConfig> {
        let config = conn.query_row(
            "SELECT enabled, articles_per_day, topics, last_run_at, next_run_at
             FROM scheduler_config WHERE id = 1",
            [],
            |row| {
                let topics_json: String = row.get(2)?;
                Ok((
                    row.get::<_, bool>(0)?,
                    row.get::<_, i64>(1)?,
                    topics_json,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                ))
            },
        )?;

        let (enabled, articles_per_day, topics_json, last_run_at, next_run_at) = config;
        Ok(SchedulerConfig {
            enabled,
            articles_per_day: clamp_articles_per_day(articles_per_day),
            topics: serde_json::from_str(&topics_json)?,
            last_run_at: parse_timestamp(last_run_at),
            next_run_at: parse_timestamp(next_run_at),
        })
    }

    fn write_config(conn: &Connection, config: &SchedulerConfig) -> SchedulerResult<()> {
        conn.execute(
            "UPDATE scheduler_config
             SET enabled = ?1, articles_per_day = ?2, topics = ?3,
                 last_run_at = ?4, next_run_at = ?5
             WHERE id = 1",
            params![
                config.enabled,
                config.articles_per_day,
                serde_json::to_string(&config.topics)?,
                config.last_run_at.map(|t| t.to_rfc3339()),
                config.next_run_at.map(|t| t.to_rfc3339()),
            ],
        )?;
        Ok(())
    }
}

fn parse_timestamp(value: Option<String>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl ConfigStore for SqliteConfigStore {
    async fn get(&self) -> SchedulerResult<SchedulerConfig> {
        let conn = self.conn.lock().unwrap();
        Self::read_config(&conn)
    }

    async fn update(&self, update: ConfigUpdate) -> SchedulerResult<SchedulerConfig> {
        update.validate()?;

        // One lock guard spans read-modify-write, so updates never interleave
        let conn = self.conn.lock().unwrap();
        let current = Self::read_config(&conn)?;
        let updated = apply_update(current, update, self.clock.now());
        Self::write_config(&conn, &updated)?;

        tracing::info!(
            enabled = updated.enabled,
            articles_per_day = updated.articles_per_day,
            topic_count = updated.topics.len(),
            "scheduler config updated"
        );
        Ok(updated)
    }

    async fn record_run(
        &self,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        check_run_invariant(last_run_at, next_run_at)?;

        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE scheduler_config SET last_run_at = ?1, next_run_at = ?2 WHERE id = 1",
            params![last_run_at.to_rfc3339(), next_run_at.to_rfc3339()],
        )?;
        Ok(())
    }

    async fn save_state(&self, key: &str, value: &str) -> SchedulerResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO scheduler_state (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                 value = excluded.value,
                 updated_at = excluded.updated_at",
            params![key, value, self.clock.now().to_rfc3339()],
        )?;
        Ok(())
    }

    async fn load_state(&self, key: &str) -> SchedulerResult<Option<String>> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row(
                "SELECT value FROM scheduler_state WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }
}

// ============================================================================
// Mock Implementation (for testing)
// ============================================================================

/// In-memory mock implementation of [`ConfigStore`]
pub struct MockConfigStore {
    config: RwLock<SchedulerConfig>,
    state: RwLock<HashMap<String, String>>,
    clock: Arc<dyn Clock>,
}

impl MockConfigStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            config: RwLock::new(SchedulerConfig::default()),
            state: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Replace the whole config (test setup shortcut)
    pub fn set_config(&self, config: SchedulerConfig) {
        *self.config.write().unwrap() = config;
    }
}

#[async_trait]
impl ConfigStore for MockConfigStore {
    async fn get(&self) -> SchedulerResult<SchedulerConfig> {
        Ok(self.config.read().unwrap().clone())
    }

    async fn update(&self, update: ConfigUpdate) -> SchedulerResult<SchedulerConfig> {
        update.validate()?;
        let mut config = self.config.write().unwrap();
        *config = apply_update(config.clone(), update, self.clock.now());
        Ok(config.clone())
    }

    async fn record_run(
        &self,
        last_run_at: DateTime<Utc>,
        next_run_at: DateTime<Utc>,
    ) -> SchedulerResult<()> {
        check_run_invariant(last_run_at, next_run_at)?;
        let mut config = self.config.write().unwrap();
        config.last_run_at = Some(last_run_at);
        config.next_run_at = Some(next_run_at);
        Ok(())
    }

    async fn save_state(&self, key: &str, value: &str) -> SchedulerResult<()> {
        self.state
            .write()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn load_state(&self, key: &str) -> SchedulerResult<Option<String>> {
        Ok(self.state.read().unwrap().get(key).cloned())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::clock::ManualClock;
    use proptest::prelude::*;

    fn test_clock() -> Arc<ManualClock> {
        let start = DateTime::parse_from_rfc3339("2025-06-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        Arc::new(ManualClock::new(start))
    }

    fn stores(clock: Arc<ManualClock>) -> Vec<Arc<dyn ConfigStore>> {
        vec![
            Arc::new(SqliteConfigStore::in_memory(clock.clone()).unwrap()),
            Arc::new(MockConfigStore::new(clock)),
        ]
    }

    #[test]
    fn test_clamp_bounds() {
        assert_eq!(clamp_articles_per_day(0), 1);
        assert_eq!(clamp_articles_per_day(15), 10);
        assert_eq!(clamp_articles_per_day(5), 5);
        assert_eq!(clamp_articles_per_day(-3), 1);
    }

    proptest! {
        #[test]
        fn prop_clamp_always_in_range(n in i64::MIN..i64::MAX) {
            let clamped = clamp_articles_per_day(n);
            prop_assert!((1..=10).contains(&clamped));
        }
    }

    #[test]
    fn test_interval_per_cadence() {
        let mut config = SchedulerConfig::default();

        config.articles_per_day = 1;
        assert_eq!(config.interval(), Duration::hours(24));

        config.articles_per_day = 2;
        assert_eq!(config.interval(), Duration::hours(12));

        config.articles_per_day = 3;
        assert_eq!(config.interval(), Duration::hours(8));

        // 24 / 5 = 4.8h
        config.articles_per_day = 5;
        assert_eq!(config.interval(), Duration::seconds(17_280));
    }

    #[tokio::test]
    async fn test_first_boot_defaults() {
        for store in stores(test_clock()) {
            let config = store.get().await.unwrap();
            assert!(!config.enabled);
            assert_eq!(config.articles_per_day, 1);
            assert!(config.topics.is_empty());
            assert!(config.last_run_at.is_none());
            assert!(config.next_run_at.is_none());
        }
    }

    #[tokio::test]
    async fn test_update_clamps_cadence() {
        for store in stores(test_clock()) {
            let updated = store
                .update(ConfigUpdate {
                    articles_per_day: Some(0),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(updated.articles_per_day, 1);

            let updated = store
                .update(ConfigUpdate {
                    articles_per_day: Some(15),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(updated.articles_per_day, 10);

            let updated = store
                .update(ConfigUpdate {
                    articles_per_day: Some(2),
                    ..Default::default()
                })
                .await
                .unwrap();
            assert_eq!(updated.articles_per_day, 2);
        }
    }

    #[tokio::test]
    async fn test_update_replaces_topic_list() {
        for store in stores(test_clock()) {
            store
                .update(ConfigUpdate {
                    topics: Some(vec![
                        Topic::new("Neighborhoods", vec!["Tetherow"]),
                        Topic::new("Market Trends", vec![]),
                    ]),
                    ..Default::default()
                })
                .await
                .unwrap();

            let replaced = store
                .update(ConfigUpdate {
                    topics: Some(vec![Topic::new("Home Design", vec!["modern"])]),
                    ..Default::default()
                })
                .await
                .unwrap();

            // Full replacement, no merge
            assert_eq!(replaced.topics.len(), 1);
            assert_eq!(replaced.topics[0].category, "Home Design");
        }
    }

    #[tokio::test]
    async fn test_update_rejects_empty_category() {
        for store in stores(test_clock()) {
            let err = store
                .update(ConfigUpdate {
                    topics: Some(vec![Topic::new("  ", vec![])]),
                    ..Default::default()
                })
                .await
                .unwrap_err();

            assert!(err.is_config_validation());
            // Nothing was written
            assert!(store.get().await.unwrap().topics.is_empty());
        }
    }

    #[tokio::test]
    async fn test_enabling_schedules_immediately() {
        let clock = test_clock();
        for store in stores(clock.clone()) {
            let updated = store
                .update(ConfigUpdate {
                    enabled: Some(true),
                    ..Default::default()
                })
                .await
                .unwrap();

            assert!(updated.enabled);
            assert_eq!(updated.next_run_at, Some(clock.now()));
        }
    }

    #[tokio::test]
    async fn test_enabling_keeps_existing_schedule() {
        let clock = test_clock();
        for store in stores(clock.clone()) {
            let later = clock.now() + Duration::hours(6);
            store.record_run(clock.now(), later).await.unwrap();

            let updated = store
                .update(ConfigUpdate {
                    enabled: Some(true),
                    ..Default::default()
                })
                .await
                .unwrap();

            assert_eq!(updated.next_run_at, Some(later));
        }
    }

    #[tokio::test]
    async fn test_record_run_enforces_ordering() {
        let clock = test_clock();
        for store in stores(clock.clone()) {
            let now = clock.now();

            store.record_run(now, now + Duration::hours(12)).await.unwrap();
            let config = store.get().await.unwrap();
            assert_eq!(config.last_run_at, Some(now));
            assert_eq!(config.next_run_at, Some(now + Duration::hours(12)));

            let err = store.record_run(now, now).await.unwrap_err();
            assert!(err.is_config_validation());
        }
    }

    #[tokio::test]
    async fn test_state_checkpoint_roundtrip() {
        for store in stores(test_clock()) {
            assert!(store.load_state("last_category").await.unwrap().is_none());

            store.save_state("last_category", "Neighborhoods").await.unwrap();
            assert_eq!(
                store.load_state("last_category").await.unwrap(),
                Some("Neighborhoods".to_string())
            );

            store.save_state("last_category", "Market Trends").await.unwrap();
            assert_eq!(
                store.load_state("last_category").await.unwrap(),
                Some("Market Trends".to_string())
            );
        }
    }

    #[tokio::test]
    async fn test_config_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.db");
        let clock = test_clock();

        {
            let store = SqliteConfigStore::new(&path, clock.clone()).unwrap();
            store
                .update(ConfigUpdate {
                    enabled: Some(true),
                    articles_per_day: Some(3),
                    topics: Some(vec![Topic::new("Neighborhoods", vec!["Tetherow"])]),
                })
                .await
                .unwrap();
        }

        let reopened = SqliteConfigStore::new(&path, clock).unwrap();
        let config = reopened.get().await.unwrap();
        assert!(config.enabled);
        assert_eq!(config.articles_per_day, 3);
        assert_eq!(config.topics.len(), 1);
        assert!(config.next_run_at.is_some());
    }
}
