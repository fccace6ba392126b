//! Scheduler control loop
//!
//! One long-lived loop per process evaluates due-ness on a fixed tick
//! and drives the generation pipeline when a run is due. The state
//! machine is `Idle -> Running -> (Idle | Failed)`; every tick ends
//! with the lock released and a consistent `(last_run_at, next_run_at)`
//! pair, and no error escapes to crash the host process.

use std::fmt;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::clock::Clock;
use super::config_store::{ConfigStore, SchedulerConfig};
use super::error::SchedulerResult;
use super::lock::RunLock;
use super::rotation::TopicRotator;
use crate::generator::{BrandConfig, GenerationError, Generator};
use crate::models::{AttemptOutcome, GenerationAttempt, Topic};
use crate::storage::{ArticleRepository, NewArticle};

/// Checkpoint key for the previously used topic category
const LAST_CATEGORY_KEY: &str = "last_category";

/// Default gap between due-ness checks
const DEFAULT_TICK_INTERVAL: StdDuration = StdDuration::from_secs(300);

// ============================================================================
// States and Outcomes
// ============================================================================

/// Scheduler run state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Failed,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Failed => "failed",
        };
        write!(f, "{label}")
    }
}

/// Result of one due-ness evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Scheduler is disabled; nothing happened
    Disabled,

    /// No run was due
    NotDue,

    /// Another run holds the lock; normal no-op, not an error
    LockBusy,

    /// A run completed and published an article
    Completed { slug: String },

    /// A run failed terminally; the cadence still advanced
    Failed { reason: String },
}

/// Snapshot of scheduler state for the status surfaces
#[derive(Debug, Clone)]
pub struct SchedulerStatus {
    pub enabled: bool,
    pub articles_per_day: u32,
    pub last_run_at: Option<DateTime<Utc>>,
    pub next_run_at: Option<DateTime<Utc>>,
    pub topics: Vec<Topic>,
    pub state: RunState,
    pub loop_running: bool,
}

impl SchedulerStatus {
    /// Format as display string
    pub fn display(&self) -> String {
        let mut output = String::from("Scheduler Status\n");
        output.push_str(&format!("{:-<40}\n", ""));
        output.push_str(&format!("Enabled: {}\n", self.enabled));
        output.push_str(&format!("Articles/Day: {}\n", self.articles_per_day));
        output.push_str(&format!("State: {}\n", self.state));
        output.push_str(&format!("Loop Running: {}\n", self.loop_running));

        match self.last_run_at {
            Some(at) => output.push_str(&format!("Last Run: {}\n", at.to_rfc3339())),
            None => output.push_str("Last Run: never\n"),
        }
        match self.next_run_at {
            Some(at) => output.push_str(&format!("Next Run: {}\n", at.to_rfc3339())),
            None => output.push_str("Next Run: unscheduled\n"),
        }

        output.push_str(&format!("Topics: {}\n", self.topics.len()));
        for topic in &self.topics {
            output.push_str(&format!("  - {topic}\n"));
        }
        output
    }
}

// ============================================================================
// Scheduler Loop
// ============================================================================

/// The autonomous content-generation loop
///
/// Owns its config handle, clock, and lock; constructed once by the
/// process entry point and stoppable/startable for testing.
pub struct SchedulerLoop {
    config_store: Arc<dyn ConfigStore>,
    articles: Arc<dyn ArticleRepository>,
    generator: Arc<dyn Generator>,
    lock: Arc<dyn RunLock>,
    clock: Arc<dyn Clock>,
    rotator: TopicRotator,
    brand: BrandConfig,
    tick_interval: StdDuration,
    state: RwLock<RunState>,
    is_running: RwLock<bool>,
    last_outcome: RwLock<Option<TickOutcome>>,
}

impl SchedulerLoop {
    pub fn new(
        config_store: Arc<dyn ConfigStore>,
        articles: Arc<dyn ArticleRepository>,
        generator: Arc<dyn Generator>,
        lock: Arc<dyn RunLock>,
        clock: Arc<dyn Clock>,
        brand: BrandConfig,
    ) -> Self {
        Self {
            config_store,
            articles,
            generator,
            lock,
            clock,
            rotator: TopicRotator::new(),
            brand,
            tick_interval: DEFAULT_TICK_INTERVAL,
            state: RwLock::new(RunState::Idle),
            is_running: RwLock::new(false),
            last_outcome: RwLock::new(None),
        }
    }

    /// Override the tick interval (tests use milliseconds)
    pub fn with_tick_interval(mut self, interval: StdDuration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Current run state
    pub async fn state(&self) -> RunState {
        *self.state.read().await
    }

    /// Outcome of the most recent run (Completed/Failed only)
    pub async fn last_outcome(&self) -> Option<TickOutcome> {
        self.last_outcome.read().await.clone()
    }

    /// Evaluate due-ness once and run the pipeline if a run is due
    ///
    /// All terminal errors are contained here; the caller never sees a
    /// panic or an Err from a tick.
    pub async fn tick(&self) -> TickOutcome {
        let config = match self.config_store.get().await {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(error = %e, "failed to read scheduler config");
                return TickOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };

        if !config.enabled {
            return TickOutcome::Disabled;
        }

        let now = self.clock.now();
        let due = match config.next_run_at {
            Some(at) => now >= at,
            None => false,
        };
        if !due {
            return TickOutcome::NotDue;
        }

        match self.lock.try_acquire().await {
            Ok(true) => {}
            Ok(false) => {
                tracing::debug!("another generation run holds the lock");
                return TickOutcome::LockBusy;
            }
            Err(e) => {
                tracing::error!(error = %e, "run lock acquisition failed");
                return TickOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        }

        self.execute_run(&config).await
    }

    /// Force a run immediately, bypassing the enabled flag and due-ness
    /// check but still honoring the lock
    pub async fn run_now(&self) -> TickOutcome {
        let config = match self.config_store.get().await {
            Ok(config) => config,
            Err(e) => {
                return TickOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };

        match self.lock.try_acquire().await {
            Ok(true) => self.execute_run(&config).await,
            Ok(false) => TickOutcome::LockBusy,
            Err(e) => TickOutcome::Failed {
                reason: e.to_string(),
            },
        }
    }

    /// Start the tick loop (runs until stopped)
    pub async fn start(&self) {
        *self.is_running.write().await = true;
        tracing::info!(
            tick_interval_secs = self.tick_interval.as_secs(),
            "scheduler loop started"
        );

        // Reconcile against the persisted schedule right away rather
        // than waiting out the first tick interval
        self.tick().await;

        while *self.is_running.read().await {
            tokio::select! {
                _ = tokio::time::sleep(self.tick_interval) => {
                    self.tick().await;
                }
                _ = self.wait_for_stop() => {
                    break;
                }
            }
        }

        tracing::info!("scheduler loop stopped");
    }

    /// Stop the tick loop
    pub async fn stop(&self) {
        *self.is_running.write().await = false;
    }

    /// Check if the tick loop is running
    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// Build a status snapshot from the persisted config and loop state
    pub async fn status(&self) -> SchedulerResult<SchedulerStatus> {
        let config = self.config_store.get().await?;
        Ok(SchedulerStatus {
            enabled: config.enabled,
            articles_per_day: config.articles_per_day,
            last_run_at: config.last_run_at,
            next_run_at: config.next_run_at,
            topics: config.topics,
            state: self.state().await,
            loop_running: self.is_running().await,
        })
    }

    // Internal: wait for the stop flag
    async fn wait_for_stop(&self) {
        loop {
            if !*self.is_running.read().await {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(100)).await;
        }
    }

    // Internal: run with the lock held; releases it unconditionally and
    // advances the cadence on success and failure alike
    async fn execute_run(&self, config: &SchedulerConfig) -> TickOutcome {
        *self.state.write().await = RunState::Running;

        let attempt = self.run_pipeline(config).await;

        // Advance the cadence even after a failed run so a permanently
        // failing topic cannot cause a retry storm every tick
        let now = self.clock.now();
        let next = now + config.interval();
        if let Err(e) = self.config_store.record_run(now, next).await {
            tracing::error!(error = %e, "failed to record run timestamps");
        }

        if let Err(e) = self.lock.release().await {
            tracing::error!(error = %e, "failed to release run lock");
        }

        let outcome = match &attempt.outcome {
            AttemptOutcome::Published { slug } => {
                tracing::info!(
                    topic = %attempt.topic,
                    attempts = attempt.attempts,
                    slug = %slug,
                    next_run_at = %next.to_rfc3339(),
                    "generation run completed"
                );
                *self.state.write().await = RunState::Idle;
                TickOutcome::Completed { slug: slug.clone() }
            }
            AttemptOutcome::Failed { reason } => {
                *self.state.write().await = RunState::Failed;
                tracing::error!(
                    topic = %attempt.topic,
                    attempts = attempt.attempts,
                    error = %reason,
                    next_run_at = %next.to_rfc3339(),
                    "generation run failed"
                );
                *self.state.write().await = RunState::Idle;
                TickOutcome::Failed {
                    reason: reason.clone(),
                }
            }
        };

        *self.last_outcome.write().await = Some(outcome.clone());
        outcome
    }

    // Internal: topic selection, generation, and persistence
    async fn run_pipeline(&self, config: &SchedulerConfig) -> GenerationAttempt {
        let last_category = match self.config_store.load_state(LAST_CATEGORY_KEY).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load rotation state");
                None
            }
        };

        let topic = self
            .rotator
            .next_topic(&config.topics, last_category.as_deref());
        tracing::info!(topic = %topic, "starting generation run");

        let report = match self.generator.generate(&topic).await {
            Ok(report) => report,
            Err(e) => {
                let attempts = match &e {
                    GenerationError::Exhausted { attempts, .. } => *attempts,
                    _ => 1,
                };
                return GenerationAttempt::failed(topic, attempts, e.to_string());
            }
        };

        match self.articles.content_exists(&report.draft.content_hash()).await {
            Ok(true) => {
                tracing::warn!(topic = %topic, "generated content duplicates an existing article")
            }
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "duplicate-content check failed"),
        }

        let new = NewArticle {
            draft: report.draft,
            category: topic.category.clone(),
            author_name: self.brand.author_name.clone(),
            featured_image: None,
            publish: true,
        };

        match self.articles.create(new).await {
            Ok(article) => {
                if let Err(e) = self
                    .config_store
                    .save_state(LAST_CATEGORY_KEY, &topic.category)
                    .await
                {
                    tracing::warn!(error = %e, "failed to save rotation state");
                }
                GenerationAttempt::published(topic, report.attempts, article.slug)
            }
            Err(e) => GenerationAttempt::failed(topic, report.attempts, e.to_string()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
