//! Command implementations

use super::OutputFormat;
use crate::analysis::{AnalysisOrchestrator, AnalysisOutcome, AnalysisRecord};
use crate::config::AppConfig;
use crate::detect::{leading_provider, AiUsageDetector, DetectionResult};
use crate::github::{HttpTransport, RateLimitStatus, RepoClient, RepositoryRef};
use crate::insight::{HeuristicInsights, InsightGenerator, LlmClient, LlmInsightGenerator};
use crate::jobs::{
    AnalysisWorker, JobOutcome, JobQueue, JobRequest, JobStatus, Priority,
};
use crate::score::{CompletenessScorer, ScoreReport};
use crate::storage::{AnalysisStore, Database};
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;

/// Shared services built from the configuration
pub struct AppContext {
    pub config: AppConfig,
    pub db: Arc<Database>,
    pub client: Arc<RepoClient>,
}

impl AppContext {
    /// Open the database and build the API client
    pub fn build(config: AppConfig) -> Result<Self> {
        let db_path = config.database_path()?;
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data directory: {:?}", parent))?;
        }
        let db = Arc::new(
            Database::open(&db_path)
                .with_context(|| format!("Failed to open database: {:?}", db_path))?,
        );

        let transport = HttpTransport::new(config.github.transport_config())
            .context("Failed to build API transport")?;
        let client = RepoClient::new(Arc::new(transport), db.clone())
            .with_ttls(config.cache.clone())
            .with_retry(config.github.retry_policy())
            .with_low_quota_threshold(config.github.low_quota_threshold);

        if config.github.token.is_none() {
            tracing::warn!("No API token configured; unauthenticated quota is very low");
        }

        Ok(Self {
            config,
            db,
            client: Arc::new(client),
        })
    }

    fn insight_generator(&self) -> Result<Arc<dyn InsightGenerator>> {
        match self.config.insights.llm_config() {
            Some(llm) => {
                tracing::debug!(endpoint = %llm.endpoint, model = %llm.model, "Using model-backed insights");
                let client = LlmClient::new(llm)?;
                Ok(Arc::new(LlmInsightGenerator::new(Arc::new(client))))
            }
            None => Ok(Arc::new(HeuristicInsights)),
        }
    }

    pub fn orchestrator(&self) -> Result<AnalysisOrchestrator> {
        Ok(AnalysisOrchestrator::new(
            self.client.clone(),
            self.db.clone(),
            self.insight_generator()?,
        ))
    }

    pub fn queue(&self) -> JobQueue {
        JobQueue::new(self.db.clone()).with_retention(self.config.queue.retention())
    }
}

/// Parse an `owner/repo` argument
pub fn parse_repository(slug: &str) -> Result<RepositoryRef> {
    RepositoryRef::parse(slug)
        .with_context(|| format!("Invalid repository '{}', expected owner/repo", slug))
}

/// Run the pipeline in the foreground
pub async fn analyze(
    ctx: &AppContext,
    slug: &str,
    repository_id: Option<&str>,
    format: OutputFormat,
) -> Result<()> {
    let repo = parse_repository(slug)?;
    let repository_id = repository_id
        .map(str::to_string)
        .unwrap_or_else(|| repo.full_name().to_lowercase());

    let outcome = ctx
        .orchestrator()?
        .analyze_repository(&repository_id, &repo.owner, &repo.name, None)
        .await;

    if !outcome.success {
        match format {
            OutputFormat::Json => print_json(&outcome)?,
            OutputFormat::Text => print_outcome_text(&outcome),
        }
        anyhow::bail!(
            "Analysis of {} failed: {}",
            slug,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }

    let record = ctx
        .db
        .find_analysis(&repository_id)
        .await?
        .context("Analysis reported success but no record was stored")?;

    match format {
        OutputFormat::Json => print_json(&record)?,
        OutputFormat::Text => print_record_text(slug, &record),
    }
    Ok(())
}

/// Detect AI usage only
pub async fn detect(ctx: &AppContext, slug: &str, format: OutputFormat) -> Result<()> {
    let repo = parse_repository(slug)?;
    let result = AiUsageDetector::new(ctx.client.clone())
        .detect_ai_usage(&repo.owner, &repo.name)
        .await;

    match format {
        OutputFormat::Json => print_json(&result)?,
        OutputFormat::Text => print_detection_text(&result),
    }
    Ok(())
}

/// Score completeness only
pub async fn score(ctx: &AppContext, slug: &str, format: OutputFormat) -> Result<()> {
    let repo = parse_repository(slug)?;
    let report = CompletenessScorer::new(ctx.client.clone())
        .calculate_score(&repo.owner, &repo.name)
        .await;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => print_score_text(&report),
    }
    Ok(())
}

/// Queue an analysis job
pub async fn enqueue(
    ctx: &AppContext,
    slug: &str,
    repository_id: &str,
    user_id: &str,
    priority: Priority,
    format: OutputFormat,
) -> Result<()> {
    let repo = parse_repository(slug)?;
    let job = ctx
        .queue()
        .add_analysis_job(
            JobRequest {
                repository_id: repository_id.to_string(),
                owner: repo.owner,
                repo: repo.name,
                user_id: user_id.to_string(),
            },
            priority,
        )
        .await?;

    let status = JobStatus::from(&job);
    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Text => print_job_text(&status),
    }
    Ok(())
}

/// Show one job
pub async fn job_status(ctx: &AppContext, job_id: &str, format: OutputFormat) -> Result<()> {
    let status = ctx.queue().get_job_status(job_id).await?;
    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Text => print_job_text(&status),
    }
    Ok(())
}

/// Show the newest job for a repository
pub async fn latest_job(ctx: &AppContext, repository_id: &str, format: OutputFormat) -> Result<()> {
    let status = ctx.queue().get_latest_repository_job(repository_id).await?;
    match (format, status) {
        (OutputFormat::Json, status) => print_json(&status)?,
        (OutputFormat::Text, Some(status)) => print_job_text(&status),
        (OutputFormat::Text, None) => println!("No jobs for repository {}", repository_id),
    }
    Ok(())
}

/// Remove a waiting job
pub async fn cancel(ctx: &AppContext, job_id: &str) -> Result<()> {
    ctx.queue().remove_waiting_job(job_id).await?;
    println!("✓ Removed job {}", job_id);
    Ok(())
}

/// Run the worker pool
pub async fn worker(ctx: &AppContext, concurrency: Option<usize>, once: bool) -> Result<()> {
    let mut options = ctx.config.queue.worker_options();
    if let Some(concurrency) = concurrency {
        options.concurrency = concurrency;
    }

    let worker = Arc::new(
        AnalysisWorker::new(ctx.db.clone(), Arc::new(ctx.orchestrator()?), options)
            .with_cache(ctx.db.clone()),
    );

    if once {
        worker.run_maintenance().await?;
        let (mut completed, mut retrying, mut failed) = (0, 0, 0);
        while let Some(outcome) = worker.process_next().await? {
            match outcome {
                JobOutcome::Completed { .. } => completed += 1,
                JobOutcome::Retrying { .. } => retrying += 1,
                JobOutcome::Failed { .. } => failed += 1,
            }
        }
        println!(
            "Processed {} job(s): {} completed, {} retrying, {} failed",
            completed + retrying + failed,
            completed,
            retrying,
            failed
        );
        return Ok(());
    }

    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(worker.run(rx));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    println!("\nShutting down, waiting for running jobs...");
    let _ = tx.send(true);

    handle.await.context("Worker task panicked")??;
    Ok(())
}

/// Show the API quota
pub async fn rate_limit(ctx: &AppContext, format: OutputFormat) -> Result<()> {
    let status = ctx.client.get_rate_limit_status().await?;
    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Text => print_rate_limit_text(&status),
    }
    Ok(())
}

/// Drop cached data for a repository
pub async fn invalidate(ctx: &AppContext, slug: &str) -> Result<()> {
    let repo = parse_repository(slug)?;
    let removed = ctx.client.invalidate(&repo.owner, &repo.name).await;
    println!("✓ Removed {} cached entries for {}", removed, repo.full_name());
    Ok(())
}

/// Show or reset the configuration file
pub fn config(path: &Path, show: bool, reset: bool, format: OutputFormat) -> Result<()> {
    if reset {
        AppConfig::default().save(path)?;
        println!("✓ Configuration reset to defaults at {:?}", path);
        if !show {
            return Ok(());
        }
    }

    let mut config = AppConfig::load_or_default(path)?;
    if config.github.token.is_some() {
        config.github.token = Some("<redacted>".to_string());
    }
    if config.insights.api_key.is_some() {
        config.insights.api_key = Some("<redacted>".to_string());
    }

    match format {
        OutputFormat::Json => print_json(&config)?,
        OutputFormat::Text => {
            println!("# {:?}", path);
            print!(
                "{}",
                toml::to_string_pretty(&config).context("Failed to render configuration")?
            );
        }
    }
    Ok(())
}

/// Print any value as pretty JSON
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    println!("{}", json);
    Ok(())
}

pub fn print_detection_text(result: &DetectionResult) {
    if result.detected {
        let provider = result
            .provider
            .map(|p| p.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        println!("AI usage detected: {}", provider);
    } else {
        println!("No AI usage detected");
        if let Some(provider) = leading_provider(&result.evidence) {
            println!("  Strongest signal: {}", provider);
        }
    }
    println!("  Confidence: {:.0}%", result.confidence * 100.0);

    let sections = [
        ("Files", &result.evidence.files),
        ("Commits", &result.evidence.commits),
        ("README", &result.evidence.readme_mentions),
    ];
    for (label, items) in sections {
        if items.is_empty() {
            continue;
        }
        println!("  {}:", label);
        for item in items.iter().take(10) {
            println!("    - {}", item.lines().next().unwrap_or(""));
        }
        if items.len() > 10 {
            println!("    ... and {} more", items.len() - 10);
        }
    }
}

pub fn print_score_text(report: &ScoreReport) {
    println!("Completeness: {}/100", report.score);
    for (name, points, max) in report.breakdown.rows() {
        println!("  {:<16} {:>3}/{}", name, points, max);
    }
}

pub fn print_record_text(slug: &str, record: &AnalysisRecord) {
    println!("Analysis of {}", slug);
    println!("{}\n", "=".repeat(12 + slug.len()));

    print_detection_text(&record.detection);
    println!();
    print_score_text(&ScoreReport::from_breakdown(record.breakdown));
    println!();

    println!("Type: {}", record.project_type);
    if let Some(ref framework) = record.framework {
        println!("Framework: {}", framework);
    }

    let timeline = &record.timeline;
    println!(
        "Commits: {} by {} contributor(s)",
        timeline.commit_count, timeline.contributor_count
    );
    if let (Some(first), Some(last)) = (timeline.first_commit_at, timeline.last_commit_at) {
        println!("Active: {} to {}", first.format("%Y-%m-%d"), last.format("%Y-%m-%d"));
    }

    let insights = &record.insights;
    println!("\nPurpose: {}", insights.purpose);
    if !insights.tech_stack.is_empty() {
        println!("Tech stack: {}", insights.tech_stack.join(", "));
    }
    for (label, items) in [
        ("Features", &insights.features),
        ("Improvements", &insights.improvements),
        ("Mistakes", &insights.mistakes),
    ] {
        if !items.is_empty() {
            println!("{}:", label);
            for item in items {
                println!("  - {}", item);
            }
        }
    }
}

pub fn print_outcome_text(outcome: &AnalysisOutcome) {
    if outcome.success {
        println!("✓ Analysis stored for {}", outcome.repository_id);
    } else {
        println!(
            "✗ Analysis failed for {}: {}",
            outcome.repository_id,
            outcome.error.as_deref().unwrap_or("unknown error")
        );
    }
}

pub fn print_job_text(status: &JobStatus) {
    println!("Job {}", status.job_id);
    println!("  Repository: {}", status.repository_id);
    println!("  State: {} ({}%)", status.state, status.progress);
    println!("  Priority: {}", status.priority);
    println!("  Attempts: {}", status.attempts_made);
    if let Some(ref reason) = status.failed_reason {
        println!("  Last error: {}", reason);
    }
    println!("  Created: {}", status.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(finished) = status.finished_at {
        println!("  Finished: {}", finished.format("%Y-%m-%d %H:%M:%S"));
    }
}

pub fn print_rate_limit_text(status: &RateLimitStatus) {
    println!(
        "API quota: {}/{} remaining ({} used)",
        status.remaining, status.limit, status.used
    );
    println!("  Resets at: {}", status.reset_at.format("%Y-%m-%d %H:%M:%S UTC"));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_repository() {
        let repo = parse_repository("octo/demo").unwrap();
        assert_eq!(repo.owner, "octo");
        assert_eq!(repo.name, "demo");
        assert!(parse_repository("octo").is_err());
        assert!(parse_repository("a/b/c").is_err());
    }

    #[test]
    fn test_config_reset_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        config(&path, false, true, OutputFormat::Text).unwrap();
        let loaded = AppConfig::load_or_default(&path).unwrap();
        assert_eq!(loaded.queue, AppConfig::default().queue);
    }
}
