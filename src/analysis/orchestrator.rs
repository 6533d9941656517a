//! Runs the full analysis pipeline for one repository

use super::{classify_project, derive_timeline, AnalysisRecord, RepositoryStatus, Timeline};
use crate::detect::AiUsageDetector;
use crate::github::{CommitQuery, RepoClient, RepoMetadata};
use crate::insight::{HeuristicInsights, InsightGenerator, InsightRequest, Insights};
use crate::score::{CompletenessBreakdown, CompletenessScorer};
use crate::storage::AnalysisStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Progress values reported while a run advances, in order
pub const MILESTONES: [u8; 7] = [10, 20, 40, 60, 70, 90, 100];

/// Receives progress updates (0-100) from a running analysis
#[async_trait]
pub trait ProgressSink: Send + Sync {
    async fn report(&self, progress: u8);
}

/// Result of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisOutcome {
    pub repository_id: String,
    pub analysis_id: Option<String>,
    pub success: bool,
    pub error: Option<String>,
}

/// Sequences detection, scoring, timeline, insights and classification
pub struct AnalysisOrchestrator {
    client: Arc<RepoClient>,
    detector: AiUsageDetector,
    scorer: CompletenessScorer,
    store: Arc<dyn AnalysisStore>,
    insights: Arc<dyn InsightGenerator>,
}

impl AnalysisOrchestrator {
    pub fn new(
        client: Arc<RepoClient>,
        store: Arc<dyn AnalysisStore>,
        insights: Arc<dyn InsightGenerator>,
    ) -> Self {
        Self {
            detector: AiUsageDetector::new(client.clone()),
            scorer: CompletenessScorer::new(client.clone()),
            client,
            store,
            insights,
        }
    }

    /// Analyze a repository and persist its record
    ///
    /// Never returns an error: failures flip the repository to `failed`,
    /// leave any earlier record untouched and come back as an unsuccessful
    /// outcome.
    pub async fn analyze_repository(
        &self,
        repository_id: &str,
        owner: &str,
        repo: &str,
        progress: Option<&dyn ProgressSink>,
    ) -> AnalysisOutcome {
        tracing::info!(repository_id, owner, repo, "Starting analysis");

        match self.run(repository_id, owner, repo, progress).await {
            Ok(record) => {
                tracing::info!(
                    repository_id,
                    analysis_id = %record.id,
                    score = record.completeness_score(),
                    ai_detected = record.detection.detected,
                    "Analysis completed"
                );
                AnalysisOutcome {
                    repository_id: repository_id.to_string(),
                    analysis_id: Some(record.id),
                    success: true,
                    error: None,
                }
            }
            Err(e) => {
                tracing::error!(repository_id, owner, repo, "Analysis failed: {:#}", e);
                if let Err(status_err) = self
                    .store
                    .set_repository_status(repository_id, RepositoryStatus::Failed)
                    .await
                {
                    tracing::warn!(repository_id, "Could not mark repository failed: {}", status_err);
                }

                AnalysisOutcome {
                    repository_id: repository_id.to_string(),
                    analysis_id: None,
                    success: false,
                    error: Some(format!("{:#}", e)),
                }
            }
        }
    }

    async fn run(
        &self,
        repository_id: &str,
        owner: &str,
        repo: &str,
        progress: Option<&dyn ProgressSink>,
    ) -> Result<AnalysisRecord> {
        let report = |value: u8| async move {
            if let Some(sink) = progress {
                sink.report(value).await;
            }
        };

        self.store
            .ensure_repository(repository_id, owner, repo, None)
            .await
            .context("Failed to register repository")?;
        self.store
            .set_repository_status(repository_id, RepositoryStatus::Processing)
            .await
            .context("Failed to mark repository processing")?;
        report(10).await;

        let metadata = self
            .client
            .get_repository(owner, repo)
            .await
            .with_context(|| format!("Failed to fetch {}/{}", owner, repo))?;
        self.store
            .ensure_repository(repository_id, owner, repo, Some(metadata.id))
            .await
            .context("Failed to record external id")?;
        report(20).await;

        let detection = self.detector.detect_ai_usage(owner, repo).await;
        report(40).await;

        let score = self.scorer.calculate_score(owner, repo).await;
        report(60).await;

        let timeline = self.timeline(owner, repo).await;
        report(70).await;

        let insights = self
            .generate_insights(owner, repo, &metadata, score.breakdown)
            .await;
        let class = classify_project(
            &insights.tech_stack,
            &metadata.topics,
            metadata.language.as_deref(),
        );
        report(90).await;

        let now = Utc::now();
        let record = AnalysisRecord {
            id: uuid::Uuid::new_v4().to_string(),
            repository_id: repository_id.to_string(),
            detection,
            breakdown: score.breakdown,
            insights,
            project_type: class.project_type,
            framework: class.framework,
            timeline,
            created_at: now,
            updated_at: now,
        };

        let stored = self
            .store
            .complete_analysis(&record)
            .await
            .context("Failed to persist analysis")?;
        report(100).await;

        Ok(stored)
    }

    async fn timeline(&self, owner: &str, repo: &str) -> Timeline {
        match self
            .client
            .get_commit_history(owner, repo, &CommitQuery::default())
            .await
        {
            Ok(commits) => derive_timeline(&commits),
            Err(e) => {
                tracing::warn!(owner, repo, "Commit history unavailable for timeline: {}", e);
                Timeline::default()
            }
        }
    }

    async fn generate_insights(
        &self,
        owner: &str,
        repo: &str,
        metadata: &RepoMetadata,
        breakdown: CompletenessBreakdown,
    ) -> Insights {
        let languages = match self.client.get_languages(owner, repo).await {
            Ok(breakdown) => {
                let mut by_size: Vec<(String, u64)> = breakdown.into_iter().collect();
                by_size.sort_by(|a, b| b.1.cmp(&a.1));
                by_size.into_iter().map(|(name, _)| name).collect()
            }
            Err(e) => {
                tracing::debug!(owner, repo, "Languages unavailable: {}", e);
                Vec::new()
            }
        };

        let topics = if metadata.topics.is_empty() {
            self.client.get_topics(owner, repo).await.unwrap_or_default()
        } else {
            metadata.topics.clone()
        };

        let request = InsightRequest {
            owner: owner.to_string(),
            repo: repo.to_string(),
            description: metadata.description.clone(),
            language: metadata.language.clone(),
            languages,
            topics,
            breakdown: Some(breakdown),
        };

        match self.insights.generate(&request).await {
            Ok(insights) => insights,
            Err(e) => {
                tracing::warn!(owner, repo, "Insight generation failed, using heuristics: {:#}", e);
                HeuristicInsights.derive(&request)
            }
        }
    }
}
