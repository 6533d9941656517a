//! Worker pool that drains the job queue

use super::{AnalysisJob, JobRateLimiter, QueueError, RetentionPolicy};
use crate::analysis::{AnalysisOrchestrator, ProgressSink};
use crate::cache::CacheStore;
use crate::storage::JobStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Semaphore};
use tokio::time::MissedTickBehavior;

/// Backoff before retry number `attempts`: `base * 2^(attempts-1)`, capped at `max`
pub fn retry_delay(base: Duration, attempts: u32, max: Duration) -> Duration {
    let exponent = attempts.saturating_sub(1).min(31);
    base.checked_mul(1u32 << exponent)
        .unwrap_or(max)
        .min(max)
}

/// Worker tuning
#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub concurrency: usize,
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub rate_limit_jobs: u32,
    pub rate_limit_window: Duration,
    pub poll_interval: Duration,
    /// How long a claimed job stays owned without a progress report
    pub lease: Duration,
    /// Period of the requeue, prune and cache purge pass
    pub maintenance_interval: Duration,
    pub retention: RetentionPolicy,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_attempts: 5,
            backoff_base: Duration::from_secs(2),
            backoff_max: Duration::from_secs(300),
            rate_limit_jobs: 10,
            rate_limit_window: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
            lease: Duration::from_secs(600),
            maintenance_interval: Duration::from_secs(300),
            retention: RetentionPolicy::default(),
        }
    }
}

/// What happened to a processed job
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed {
        job_id: String,
        analysis_id: Option<String>,
    },
    /// Attempt failed; the job is delayed until `retry_at`
    Retrying {
        job_id: String,
        attempts: u32,
        retry_at: chrono::DateTime<Utc>,
        reason: String,
    },
    /// Attempts exhausted
    Failed { job_id: String, reason: String },
}

/// Counts from one maintenance pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Active jobs whose lease had run out
    pub requeued: usize,
    pub pruned: usize,
    /// Expired cache entries removed
    pub purged: usize,
}

/// Pulls jobs from the store and runs the orchestrator on them
pub struct AnalysisWorker {
    id: String,
    store: Arc<dyn JobStore>,
    orchestrator: Arc<AnalysisOrchestrator>,
    cache: Option<Arc<dyn CacheStore>>,
    limiter: JobRateLimiter,
    semaphore: Arc<Semaphore>,
    options: WorkerOptions,
}

impl AnalysisWorker {
    pub fn new(
        store: Arc<dyn JobStore>,
        orchestrator: Arc<AnalysisOrchestrator>,
        options: WorkerOptions,
    ) -> Self {
        let concurrency = options.concurrency.max(1);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            store,
            orchestrator,
            cache: None,
            limiter: JobRateLimiter::new(options.rate_limit_jobs, options.rate_limit_window),
            semaphore: Arc::new(Semaphore::new(concurrency)),
            options: WorkerOptions {
                concurrency,
                ..options
            },
        }
    }

    /// Purge expired entries from `cache` during maintenance
    pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Identity recorded on the jobs this worker claims
    pub fn id(&self) -> &str {
        &self.id
    }

    fn lease_until(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + chrono::Duration::from_std(self.options.lease)
            .unwrap_or_else(|_| chrono::Duration::minutes(10))
    }

    async fn claim(&self) -> Result<Option<AnalysisJob>, QueueError> {
        let now = Utc::now();
        Ok(self
            .store
            .claim_next_job(&self.id, now, self.lease_until(now))
            .await?)
    }

    /// Claim and process one ready job, if any
    pub async fn process_next(&self) -> Result<Option<JobOutcome>, QueueError> {
        match self.claim().await? {
            Some(job) => {
                self.limiter.acquire().await;
                self.execute(job).await.map(Some)
            }
            None => Ok(None),
        }
    }

    /// Requeue jobs with lapsed leases, prune finished jobs and purge the cache
    pub async fn run_maintenance(&self) -> Result<MaintenanceReport, QueueError> {
        let now = Utc::now();
        let requeued = self.store.requeue_expired_jobs(now).await?;
        let pruned = self.store.prune_jobs(&self.options.retention, now).await?;
        let purged = match &self.cache {
            Some(cache) => cache.purge_expired().await?,
            None => 0,
        };

        let report = MaintenanceReport {
            requeued,
            pruned,
            purged,
        };
        if report != MaintenanceReport::default() {
            tracing::info!(requeued, pruned, purged, "Queue maintenance");
        }
        Ok(report)
    }

    async fn maintain(&self) {
        if let Err(e) = self.run_maintenance().await {
            tracing::error!("Queue maintenance failed: {}", e);
        }
    }

    /// Process jobs until `shutdown` turns true, then wait for running jobs
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> Result<(), QueueError> {
        self.run_maintenance().await?;

        let period = self.options.maintenance_interval.max(Duration::from_millis(1));
        let mut maintenance = tokio::time::interval(period);
        maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the startup pass covered it
        maintenance.tick().await;

        tracing::info!(
            worker_id = %self.id,
            concurrency = self.options.concurrency,
            "Worker pool started"
        );

        loop {
            if *shutdown.borrow() {
                break;
            }

            let permit = tokio::select! {
                permit = self.semaphore.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(e) => {
                        tracing::error!("Failed to acquire worker permit: {}", e);
                        break;
                    }
                },
                _ = maintenance.tick() => {
                    self.maintain().await;
                    continue;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let claimed = match self.claim().await {
                Ok(claimed) => claimed,
                Err(e) => {
                    tracing::error!("Failed to poll job queue: {}", e);
                    None
                }
            };

            match claimed {
                Some(job) => {
                    self.limiter.acquire().await;
                    let worker = self.clone();
                    tokio::spawn(async move {
                        let job_id = job.id.clone();
                        if let Err(e) = worker.execute(job).await {
                            tracing::error!(job_id = %job_id, "Job bookkeeping failed: {}", e);
                        }
                        drop(permit);
                    });
                }
                None => {
                    drop(permit);
                    tokio::select! {
                        _ = tokio::time::sleep(self.options.poll_interval) => {}
                        _ = maintenance.tick() => self.maintain().await,
                        changed = shutdown.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
            }
        }

        tracing::info!("Worker pool stopping, waiting for running jobs");
        let _all = self
            .semaphore
            .acquire_many(self.options.concurrency as u32)
            .await;
        tracing::info!("Worker pool stopped");
        Ok(())
    }

    async fn execute(&self, job: AnalysisJob) -> Result<JobOutcome, QueueError> {
        tracing::info!(
            job_id = %job.id,
            repository_id = %job.repository_id,
            attempt = job.attempts_made,
            "Processing analysis job"
        );

        let progress = JobProgress {
            worker: self,
            job_id: &job.id,
        };
        let outcome = self
            .orchestrator
            .analyze_repository(&job.repository_id, &job.owner, &job.repo, Some(&progress))
            .await;

        if outcome.success {
            self.store.complete_job(&job.id).await?;
            tracing::info!(job_id = %job.id, "Analysis job completed");
            return Ok(JobOutcome::Completed {
                job_id: job.id,
                analysis_id: outcome.analysis_id,
            });
        }

        let reason = outcome
            .error
            .unwrap_or_else(|| "analysis failed".to_string());

        if job.attempts_made >= self.options.max_attempts {
            self.store.record_job_failure(&job.id, &reason, None).await?;
            tracing::error!(
                job_id = %job.id,
                attempt = job.attempts_made,
                "Analysis job failed permanently: {}",
                reason
            );
            return Ok(JobOutcome::Failed {
                job_id: job.id,
                reason,
            });
        }

        let delay = retry_delay(
            self.options.backoff_base,
            job.attempts_made,
            self.options.backoff_max,
        );
        let retry_at = Utc::now()
            + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(0));
        self.store
            .record_job_failure(&job.id, &reason, Some(retry_at))
            .await?;

        tracing::warn!(
            job_id = %job.id,
            attempt = job.attempts_made,
            delay_ms = delay.as_millis() as u64,
            "Analysis job failed, will retry: {}",
            reason
        );
        Ok(JobOutcome::Retrying {
            job_id: job.id,
            attempts: job.attempts_made,
            retry_at,
            reason,
        })
    }
}

/// Writes orchestrator progress onto the job row and extends the lease
struct JobProgress<'a> {
    worker: &'a AnalysisWorker,
    job_id: &'a str,
}

#[async_trait]
impl ProgressSink for JobProgress<'_> {
    async fn report(&self, progress: u8) {
        let store = &self.worker.store;
        if let Err(e) = store.update_job_progress(self.job_id, progress).await {
            tracing::warn!(job_id = %self.job_id, "Failed to record progress: {}", e);
        }

        let lease_until = self.worker.lease_until(Utc::now());
        match store
            .renew_job_lease(self.job_id, &self.worker.id, lease_until)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(job_id = %self.job_id, "Job lease lost to another worker")
            }
            Err(e) => tracing::warn!(job_id = %self.job_id, "Failed to renew lease: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::github::{RepoClient, RetryPolicy};
    use crate::insight::HeuristicInsights;
    use crate::jobs::{JobQueue, JobRequest, JobState, Priority};
    use crate::storage::Database;
    use crate::testing::FakeTransport;
    use serde_json::json;

    fn options() -> WorkerOptions {
        WorkerOptions {
            concurrency: 2,
            max_attempts: 2,
            backoff_base: Duration::ZERO,
            backoff_max: Duration::ZERO,
            rate_limit_jobs: 100,
            rate_limit_window: Duration::from_secs(60),
            poll_interval: Duration::from_millis(10),
            lease: Duration::from_secs(60),
            maintenance_interval: Duration::from_secs(60),
            retention: RetentionPolicy::default(),
        }
    }

    fn setup(transport: Arc<FakeTransport>) -> (Arc<AnalysisWorker>, JobQueue, Arc<Database>) {
        setup_with(transport, options())
    }

    fn setup_with(
        transport: Arc<FakeTransport>,
        options: WorkerOptions,
    ) -> (Arc<AnalysisWorker>, JobQueue, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let client = RepoClient::new(transport, Arc::new(MemoryCache::new())).with_retry(
            RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
            },
        );
        let orchestrator = Arc::new(AnalysisOrchestrator::new(
            Arc::new(client),
            db.clone(),
            Arc::new(HeuristicInsights),
        ));
        let worker = Arc::new(
            AnalysisWorker::new(db.clone(), orchestrator, options).with_cache(db.clone()),
        );
        (worker, JobQueue::new(db.clone()), db)
    }

    fn known_repo(transport: &FakeTransport, name: &str) {
        transport.respond(
            &format!("repos/octo/{}", name),
            json!({ "id": 5, "name": name, "owner": { "login": "octo" }, "default_branch": "main" }),
        );
    }

    fn request(repository_id: &str, repo: &str) -> JobRequest {
        JobRequest {
            repository_id: repository_id.to_string(),
            owner: "octo".to_string(),
            repo: repo.to_string(),
            user_id: "user-1".to_string(),
        }
    }

    #[test]
    fn test_retry_delay_doubles_and_caps() {
        let base = Duration::from_secs(2);
        let max = Duration::from_secs(300);
        assert_eq!(retry_delay(base, 1, max), Duration::from_secs(2));
        assert_eq!(retry_delay(base, 2, max), Duration::from_secs(4));
        assert_eq!(retry_delay(base, 4, max), Duration::from_secs(16));
        assert_eq!(retry_delay(base, 9, max), max);
        assert_eq!(retry_delay(base, 200, max), max);
    }

    #[tokio::test]
    async fn test_successful_job_completes() {
        let transport = Arc::new(FakeTransport::new());
        known_repo(&transport, "demo");
        let (worker, queue, db) = setup(transport);

        let job = queue
            .add_analysis_job(request("repo-1", "demo"), Priority::Normal)
            .await
            .unwrap();

        let outcome = worker.process_next().await.unwrap().unwrap();
        assert!(matches!(outcome, JobOutcome::Completed { ref job_id, .. } if *job_id == job.id));

        let status = queue.get_job_status(&job.id).await.unwrap();
        assert_eq!(status.state, JobState::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(status.attempts_made, 1);

        let stored = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(stored.claimed_by.as_deref(), Some(worker.id()));
        assert!(stored.lease_until.is_none());

        assert!(worker.process_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failing_job_retries_then_fails() {
        let (worker, queue, db) = setup(Arc::new(FakeTransport::new()));
        let job = queue
            .add_analysis_job(request("repo-1", "missing"), Priority::Normal)
            .await
            .unwrap();

        let first = worker.process_next().await.unwrap().unwrap();
        assert!(matches!(first, JobOutcome::Retrying { attempts: 1, .. }));
        assert_eq!(
            queue.get_job_status(&job.id).await.unwrap().state,
            JobState::Delayed
        );

        // A delayed job still blocks duplicates
        let again = queue
            .add_analysis_job(request("repo-1", "missing"), Priority::Normal)
            .await
            .unwrap();
        assert_eq!(again.id, job.id);

        let second = worker.process_next().await.unwrap().unwrap();
        assert!(matches!(second, JobOutcome::Failed { .. }));

        let status = queue.get_job_status(&job.id).await.unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.attempts_made, 2);
        assert!(status.failed_reason.is_some());
        assert_eq!(db.count_jobs(JobState::Failed).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_run_drains_queue_until_shutdown() {
        let transport = Arc::new(FakeTransport::new());
        known_repo(&transport, "one");
        known_repo(&transport, "two");
        let (worker, queue, db) = setup(transport);

        queue
            .add_analysis_job(request("repo-1", "one"), Priority::Normal)
            .await
            .unwrap();
        queue
            .add_analysis_job(request("repo-2", "two"), Priority::High)
            .await
            .unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(worker.clone().run(rx));

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while db.count_jobs(JobState::Completed).await.unwrap() < 2 {
            assert!(tokio::time::Instant::now() < deadline, "jobs did not finish");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_job_starts_are_throttled() {
        let transport = Arc::new(FakeTransport::new());
        known_repo(&transport, "one");
        known_repo(&transport, "two");
        let (worker, queue, _) = setup_with(
            transport,
            WorkerOptions {
                rate_limit_jobs: 1,
                rate_limit_window: Duration::from_millis(300),
                ..options()
            },
        );

        queue
            .add_analysis_job(request("repo-1", "one"), Priority::Normal)
            .await
            .unwrap();
        queue
            .add_analysis_job(request("repo-2", "two"), Priority::Normal)
            .await
            .unwrap();

        let started = std::time::Instant::now();
        worker.process_next().await.unwrap().unwrap();
        worker.process_next().await.unwrap().unwrap();
        assert!(started.elapsed() >= Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_active_jobs_never_exceed_concurrency() {
        let transport = Arc::new(FakeTransport::new());
        transport.set_latency(Duration::from_millis(15));
        let (worker, queue, db) = setup(transport.clone());

        for i in 0..5 {
            let name = format!("repo{}", i);
            known_repo(&transport, &name);
            queue
                .add_analysis_job(request(&format!("id-{}", i), &name), Priority::Normal)
                .await
                .unwrap();
        }

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(worker.clone().run(rx));

        let mut peak = 0;
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while db.count_jobs(JobState::Completed).await.unwrap() < 5 {
            assert!(tokio::time::Instant::now() < deadline, "jobs did not finish");
            peak = peak.max(db.count_jobs(JobState::Active).await.unwrap());
            tokio::time::sleep(Duration::from_millis(2)).await;
        }

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        assert!(peak >= 1);
        assert!(peak <= 2, "saw {} active jobs with concurrency 2", peak);
    }

    #[tokio::test]
    async fn test_maintenance_prunes_jobs_and_purges_cache() {
        let transport = Arc::new(FakeTransport::new());
        known_repo(&transport, "demo");
        let (worker, queue, db) = setup_with(
            transport,
            WorkerOptions {
                retention: RetentionPolicy {
                    completed_max_count: 0,
                    ..Default::default()
                },
                ..options()
            },
        );

        let job = queue
            .add_analysis_job(request("repo-1", "demo"), Priority::Normal)
            .await
            .unwrap();
        worker.process_next().await.unwrap().unwrap();
        db.set("stale", "x".into(), Duration::ZERO).await.unwrap();

        let report = worker.run_maintenance().await.unwrap();
        assert_eq!(report.requeued, 0);
        assert_eq!(report.pruned, 1);
        assert_eq!(report.purged, 1);

        assert!(db.get_job(&job.id).await.unwrap().is_none());
        assert_eq!(db.purge_expired().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_maintenance_requeues_lapsed_lease() {
        let (worker, queue, db) = setup(Arc::new(FakeTransport::new()));
        let job = queue
            .add_analysis_job(request("repo-1", "demo"), Priority::Normal)
            .await
            .unwrap();

        // A worker that died holding the job
        let now = Utc::now();
        db.claim_next_job("gone", now, now - chrono::Duration::seconds(1))
            .await
            .unwrap()
            .unwrap();

        let report = worker.run_maintenance().await.unwrap();
        assert_eq!(report.requeued, 1);
        let requeued = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(requeued.state, JobState::Waiting);
        assert!(requeued.claimed_by.is_none());
    }

    #[tokio::test]
    async fn test_run_does_not_take_live_jobs_from_other_workers() {
        let transport = Arc::new(FakeTransport::new());
        known_repo(&transport, "demo");
        let (worker, queue, db) = setup(transport);

        let job = queue
            .add_analysis_job(request("repo-1", "demo"), Priority::Normal)
            .await
            .unwrap();
        let now = Utc::now();
        db.claim_next_job("worker-a", now, now + chrono::Duration::minutes(10))
            .await
            .unwrap()
            .unwrap();

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(worker.clone().run(rx));
        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        let held = db.get_job(&job.id).await.unwrap().unwrap();
        assert_eq!(held.state, JobState::Active);
        assert_eq!(held.claimed_by.as_deref(), Some("worker-a"));
        assert_eq!(held.attempts_made, 1);
    }

    #[tokio::test]
    async fn test_run_maintains_on_interval() {
        let transport = Arc::new(FakeTransport::new());
        known_repo(&transport, "demo");
        let (worker, queue, db) = setup_with(
            transport,
            WorkerOptions {
                maintenance_interval: Duration::from_millis(50),
                retention: RetentionPolicy {
                    completed_max_count: 0,
                    ..Default::default()
                },
                ..options()
            },
        );

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(worker.clone().run(rx));

        // Queued after the startup pass, so only a later tick can prune it
        tokio::time::sleep(Duration::from_millis(20)).await;
        let job = queue
            .add_analysis_job(request("repo-1", "demo"), Priority::Normal)
            .await
            .unwrap();

        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        while db.get_job(&job.id).await.unwrap().is_some() {
            assert!(tokio::time::Instant::now() < deadline, "finished job was not pruned");
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }
}
