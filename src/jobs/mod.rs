//! Background analysis jobs
//!
//! The queue is persisted in the job store. At most one job per repository is
//! in flight (waiting, active or delayed) at any time; the store enforces this
//! with a uniqueness constraint so concurrent enqueues cannot race.

mod limiter;
mod queue;
mod worker;

pub use limiter::JobRateLimiter;
pub use queue::JobQueue;
pub use worker::{retry_delay, AnalysisWorker, JobOutcome, MaintenanceReport, WorkerOptions};

use crate::storage::StoreError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Scheduling priority, served highest first
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Urgent,
}

impl Priority {
    /// Numeric rank stored with the job; larger runs first
    pub fn rank(&self) -> i64 {
        match self {
            Priority::Low => 1,
            Priority::Normal => 2,
            Priority::High => 3,
            Priority::Urgent => 4,
        }
    }

    pub fn from_rank(rank: i64) -> Option<Self> {
        match rank {
            1 => Some(Priority::Low),
            2 => Some(Priority::Normal),
            3 => Some(Priority::High),
            4 => Some(Priority::Urgent),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    Delayed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Waiting => "waiting",
            JobState::Active => "active",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Delayed => "delayed",
        }
    }

    /// No further transitions without a new enqueue
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(JobState::Waiting),
            "active" => Ok(JobState::Active),
            "completed" => Ok(JobState::Completed),
            "failed" => Ok(JobState::Failed),
            "delayed" => Ok(JobState::Delayed),
            other => Err(format!("unknown job state: {}", other)),
        }
    }
}

/// What to analyze and on whose behalf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRequest {
    pub repository_id: String,
    pub owner: String,
    pub repo: String,
    pub user_id: String,
}

/// A persisted analysis job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisJob {
    pub id: String,
    pub repository_id: String,
    pub owner: String,
    pub repo: String,
    pub user_id: String,
    pub priority: Priority,
    pub state: JobState,
    /// Attempts started so far
    pub attempts_made: u32,
    pub progress: u8,
    pub failed_reason: Option<String>,
    /// Worker holding the job while it is active
    pub claimed_by: Option<String>,
    /// Active jobs whose lease passes this time may be taken over
    pub lease_until: Option<DateTime<Utc>>,
    /// Earliest time the job may be picked up
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl AnalysisJob {
    /// New waiting job, ready immediately
    pub fn new(request: JobRequest, priority: Priority) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            repository_id: request.repository_id,
            owner: request.owner,
            repo: request.repo,
            user_id: request.user_id,
            priority,
            state: JobState::Waiting,
            attempts_made: 0,
            progress: 0,
            failed_reason: None,
            claimed_by: None,
            lease_until: None,
            run_at: now,
            created_at: now,
            updated_at: now,
            finished_at: None,
        }
    }
}

/// Status view returned to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    pub job_id: String,
    pub repository_id: String,
    pub state: JobState,
    pub priority: Priority,
    pub progress: u8,
    pub attempts_made: u32,
    pub failed_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl From<&AnalysisJob> for JobStatus {
    fn from(job: &AnalysisJob) -> Self {
        Self {
            job_id: job.id.clone(),
            repository_id: job.repository_id.clone(),
            state: job.state,
            priority: job.priority,
            progress: job.progress,
            attempts_made: job.attempts_made,
            failed_reason: job.failed_reason.clone(),
            created_at: job.created_at,
            finished_at: job.finished_at,
        }
    }
}

/// How long terminal jobs are kept
#[derive(Debug, Clone, PartialEq)]
pub struct RetentionPolicy {
    pub completed_max_age: Duration,
    pub completed_max_count: usize,
    pub failed_max_age: Duration,
    pub failed_max_count: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            completed_max_age: Duration::days(7),
            completed_max_count: 5000,
            failed_max_age: Duration::days(30),
            failed_max_count: 10000,
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum QueueError {
    #[error("Job store error: {0}")]
    Store(#[from] StoreError),

    #[error("Job not found: {0}")]
    NotFound(String),

    #[error("Job {id} is {state} and can no longer be removed")]
    NotRemovable { id: String, state: JobState },

    #[error("Invalid job request: {0}")]
    Invalid(String),
}
