//! SQLite storage layer
//!
//! This module handles persistent storage of:
//! - Repositories and their analysis status
//! - One analysis record per repository
//! - The background job queue
//! - Cached upstream responses

mod analyses;
mod cache;
mod jobs;
mod schema;

pub use schema::SCHEMA;

use crate::analysis::{AnalysisRecord, Repository, RepositoryStatus};
use crate::jobs::{AnalysisJob, JobState, RetentionPolicy};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Errors from the persistence layer
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid stored value: {0}")]
    Invalid(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Database lock poisoned")]
    Poisoned,

    #[error("Database task failed: {0}")]
    Task(String),
}

/// Repositories and their analysis records
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Register a repository if unknown; existing rows keep their identity
    async fn ensure_repository(
        &self,
        id: &str,
        owner: &str,
        name: &str,
        external_id: Option<u64>,
    ) -> Result<Repository, StoreError>;

    async fn get_repository(&self, id: &str) -> Result<Option<Repository>, StoreError>;

    /// Move a repository to `status`; `Completed` also stamps `last_analyzed_at`
    async fn set_repository_status(
        &self,
        id: &str,
        status: RepositoryStatus,
    ) -> Result<(), StoreError>;

    async fn find_analysis(&self, repository_id: &str) -> Result<Option<AnalysisRecord>, StoreError>;

    /// Create or overwrite the record for `record.repository_id`
    ///
    /// An existing record keeps its id and creation time.
    async fn upsert_analysis(&self, record: &AnalysisRecord) -> Result<AnalysisRecord, StoreError>;

    /// Upsert the record and mark the repository completed in one transaction
    async fn complete_analysis(&self, record: &AnalysisRecord)
        -> Result<AnalysisRecord, StoreError>;
}

/// Persistent job queue
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert `job` unless its repository already has an in-flight job
    ///
    /// Returns the stored job and whether it was newly created.
    async fn insert_or_get_in_flight(&self, job: &AnalysisJob)
        -> Result<(AnalysisJob, bool), StoreError>;

    async fn get_job(&self, id: &str) -> Result<Option<AnalysisJob>, StoreError>;

    async fn latest_job_for_repository(
        &self,
        repository_id: &str,
    ) -> Result<Option<AnalysisJob>, StoreError>;

    /// Atomically move the best ready job to active and count the attempt
    ///
    /// The job is leased to `worker_id` until `lease_until`.
    async fn claim_next_job(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<AnalysisJob>, StoreError>;

    async fn update_job_progress(&self, id: &str, progress: u8) -> Result<(), StoreError>;

    /// Extend the lease of an active job held by `worker_id`; false when the lease was lost
    async fn renew_job_lease(
        &self,
        id: &str,
        worker_id: &str,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn complete_job(&self, id: &str) -> Result<Option<AnalysisJob>, StoreError>;

    /// Record a failed attempt: delayed until `retry_at`, or failed for good when `None`
    async fn record_job_failure(
        &self,
        id: &str,
        reason: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<Option<AnalysisJob>, StoreError>;

    /// Delete a job that has not started; returns false when it was not removable
    async fn remove_pending_job(&self, id: &str) -> Result<bool, StoreError>;

    /// Return active jobs whose lease ran out before `now` to the waiting state
    async fn requeue_expired_jobs(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Apply the retention policy to terminal jobs
    async fn prune_jobs(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    async fn count_jobs(&self, state: JobState) -> Result<usize, StoreError>;
}

/// Database connection wrapper
///
/// Statements run on the blocking thread pool through [`Database::interact`].
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create a database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path.as_ref())?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize()?;

        tracing::debug!(path = %path.as_ref().display(), "Opened database");
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.initialize()?;

        Ok(db)
    }

    /// Initialize the database schema
    fn initialize(&self) -> Result<(), StoreError> {
        let conn = self.conn()?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Run `f` against the connection without blocking the async runtime
    pub(crate) async fn interact<F, T>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().map_err(|_| StoreError::Poisoned)?;
            f(&mut guard)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

/// Timestamp format used in every column: RFC 3339, UTC, millisecond precision
pub(crate) fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|e| StoreError::Invalid(format!("bad timestamp '{}': {}", value, e)))
}

pub(crate) fn parse_opt_ts(value: Option<String>) -> Result<Option<DateTime<Utc>>, StoreError> {
    value.as_deref().map(parse_ts).transpose()
}
