//! Mutual exclusion for generation runs
//!
//! Exactly one generation run may be in flight at a time. The loop
//! acquires a [`RunLock`] before any side-effecting call and releases
//! it unconditionally on exit, success or failure. A held lock is a
//! normal no-op outcome for a tick, never an error.
//!
//! [`LocalRunLock`] suffices for single-instance deployments.
//! [`LeaseLock`] externalizes the lock as a leased row in the shared
//! SQLite store so horizontally-scaled instances exclude each other;
//! the lease expiry guarantees a crashed holder cannot deadlock future
//! runs.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Duration;
use rusqlite::{params, Connection};
use uuid::Uuid;

use super::clock::Clock;
use super::error::{SchedulerError, SchedulerResult};

/// Execution lock guarding generation runs
#[async_trait]
pub trait RunLock: Send + Sync {
    /// Try to acquire the lock; `false` means another run is in
    /// progress
    async fn try_acquire(&self) -> SchedulerResult<bool>;

    /// Release the lock. Safe to call when not held.
    async fn release(&self) -> SchedulerResult<()>;
}

// ============================================================================
// Process-local Lock
// ============================================================================

/// In-process flag lock for single-instance deployments
#[derive(Debug, Default)]
pub struct LocalRunLock {
    held: AtomicBool,
}

impl LocalRunLock {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RunLock for LocalRunLock {
    async fn try_acquire(&self) -> SchedulerResult<bool> {
        Ok(self
            .held
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok())
    }

    async fn release(&self) -> SchedulerResult<()> {
        self.held.store(false, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Leased Lock
// ============================================================================

/// Lease-based lock stored in the shared SQLite database
///
/// Acquisition inserts a single-row lease tagged with this process's
/// holder id; a conflicting insert only wins when the existing lease
/// has expired. Release deletes the row only if this process still
/// holds it.
pub struct LeaseLock {
    conn: Mutex<Connection>,
    holder: String,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl LeaseLock {
    /// Open the lease table in the shared database
    pub fn new(
        path: impl AsRef<Path>,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> SchedulerResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        Self::with_connection(conn, ttl, clock)
    }

    /// Create with an in-memory database (for testing)
    pub fn in_memory(ttl: Duration, clock: Arc<dyn Clock>) -> SchedulerResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, ttl, clock)
    }

    fn with_connection(
        conn: Connection,
        ttl: Duration,
        clock: Arc<dyn Clock>,
    ) -> SchedulerResult<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS scheduler_lease (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                holder TEXT NOT NULL,
                expires_at TEXT NOT NULL
            );
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            holder: Uuid::new_v4().to_string(),
            ttl,
            clock,
        })
    }

    /// This process's lease holder id
    pub fn holder(&self) -> &str {
        &self.holder
    }
}

#[async_trait]
impl RunLock for LeaseLock {
    async fn try_acquire(&self) -> SchedulerResult<bool> {
        let now = self.clock.now();
        let expires_at = now + self.ttl;

        let conn = self.conn.lock().unwrap();
        let changed = conn
            .execute(
                r#"
                INSERT INTO scheduler_lease (id, holder, expires_at)
                VALUES (1, ?1, ?2)
                ON CONFLICT(id) DO UPDATE SET
                    holder = excluded.holder,
                    expires_at = excluded.expires_at
                WHERE scheduler_lease.expires_at < ?3
                "#,
                params![self.holder, expires_at.to_rfc3339(), now.to_rfc3339()],
            )
            .map_err(|e| SchedulerError::Lock(e.to_string()))?;

        Ok(changed == 1)
    }

    async fn release(&self) -> SchedulerResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM scheduler_lease WHERE holder = ?1",
            params![self.holder],
        )
        .map_err(|e| SchedulerError::Lock(e.to_string()))?;
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
