//! reposcope - analysis of hosted code repositories
//!
//! This library fetches repository snapshots from a hosting API (cached,
//! retried and quota-aware), detects AI tool involvement, scores project
//! completeness and persists one analysis record per repository. Analyses can
//! run in the foreground or through a persisted, deduplicating job queue.

pub mod analysis;
pub mod cache;
pub mod cli;
pub mod config;
pub mod detect;
pub mod github;
pub mod insight;
pub mod jobs;
pub mod score;
pub mod storage;

#[cfg(test)]
mod testing;

/// Re-export commonly used types
pub use analysis::{AnalysisOrchestrator, AnalysisOutcome, AnalysisRecord};
pub use detect::{AiUsageDetector, DetectionResult, Provider};
pub use github::{ClientError, RepoClient};
pub use jobs::{AnalysisWorker, JobQueue, Priority};
pub use score::{CompletenessScorer, ScoreReport};
pub use storage::Database;

/// Application-wide error type
pub use anyhow::Result;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const APP_NAME: &str = "reposcope";
