//! Autonomous content-generation scheduling
//!
//! The scheduler decides when to produce a new article, selects a
//! topic, drives the generator, and persists the result. It is built
//! from small, separately testable pieces:
//!
//! - [`config_store`] - durable runtime configuration (the singleton
//!   `scheduler_config` row) with the clamped publish cadence
//! - [`rotation`] - round-robin topic selection with a fallback catalog
//! - [`lock`] - at-most-one-run mutual exclusion, process-local or
//!   lease-based for multi-instance deployments
//! - [`clock`] - injectable time source for deterministic tests
//! - [`runner`] - the control loop and its `Idle -> Running ->
//!   (Idle | Failed)` state machine

pub mod clock;
pub mod config_store;
pub mod error;
pub mod lock;
pub mod rotation;
pub mod runner;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config_store::{
    clamp_articles_per_day, ConfigStore, ConfigUpdate, MockConfigStore, SchedulerConfig,
    SqliteConfigStore, ARTICLES_PER_DAY_MAX, ARTICLES_PER_DAY_MIN,
};
pub use error::{SchedulerError, SchedulerResult};
pub use lock::{LeaseLock, LocalRunLock, RunLock};
pub use rotation::TopicRotator;
pub use runner::{RunState, SchedulerLoop, SchedulerStatus, TickOutcome};
