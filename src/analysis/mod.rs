//! Analysis pipeline and the records it persists

pub mod classify;
mod orchestrator;
mod timeline;

pub use classify::{classify_project, ProjectClass};
pub use orchestrator::{AnalysisOrchestrator, AnalysisOutcome, ProgressSink, MILESTONES};
pub use timeline::{derive_timeline, Timeline};

use crate::detect::DetectionResult;
use crate::insight::Insights;
use crate::score::CompletenessBreakdown;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle of a repository's analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepositoryStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RepositoryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryStatus::Pending => "pending",
            RepositoryStatus::Processing => "processing",
            RepositoryStatus::Completed => "completed",
            RepositoryStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RepositoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepositoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RepositoryStatus::Pending),
            "processing" => Ok(RepositoryStatus::Processing),
            "completed" => Ok(RepositoryStatus::Completed),
            "failed" => Ok(RepositoryStatus::Failed),
            other => Err(format!("unknown repository status: {}", other)),
        }
    }
}

/// A tracked repository
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub id: String,
    pub owner: String,
    pub name: String,
    pub external_id: Option<u64>,
    pub status: RepositoryStatus,
    pub last_analyzed_at: Option<DateTime<Utc>>,
}

/// The persisted result of analyzing one repository
///
/// There is at most one record per repository; re-analysis overwrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub repository_id: String,
    pub detection: DetectionResult,
    pub breakdown: CompletenessBreakdown,
    pub insights: Insights,
    pub project_type: String,
    pub framework: Option<String>,
    pub timeline: Timeline,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AnalysisRecord {
    pub fn completeness_score(&self) -> u32 {
        self.breakdown.total
    }
}
