//! Enqueue and query analysis jobs

use super::{AnalysisJob, JobRequest, JobStatus, Priority, QueueError, RetentionPolicy};
use crate::storage::JobStore;
use chrono::Utc;
use std::sync::Arc;

/// Front door to the persisted job queue
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    retention: RetentionPolicy,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            retention: RetentionPolicy::default(),
        }
    }

    pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
        self.retention = retention;
        self
    }

    /// Queue an analysis, or return the job already in flight for the repository
    pub async fn add_analysis_job(
        &self,
        request: JobRequest,
        priority: Priority,
    ) -> Result<AnalysisJob, QueueError> {
        for (field, value) in [
            ("repositoryId", &request.repository_id),
            ("owner", &request.owner),
            ("repo", &request.repo),
            ("userId", &request.user_id),
        ] {
            if value.trim().is_empty() {
                return Err(QueueError::Invalid(format!("{} must not be empty", field)));
            }
        }

        let job = AnalysisJob::new(request, priority);
        let (stored, created) = self.store.insert_or_get_in_flight(&job).await?;

        if created {
            tracing::info!(
                job_id = %stored.id,
                repository_id = %stored.repository_id,
                priority = %stored.priority,
                "Analysis job queued"
            );
        } else {
            tracing::info!(
                job_id = %stored.id,
                repository_id = %stored.repository_id,
                state = %stored.state,
                "Analysis already in flight, returning existing job"
            );
        }
        Ok(stored)
    }

    pub async fn get_job_status(&self, job_id: &str) -> Result<JobStatus, QueueError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| QueueError::NotFound(job_id.to_string()))?;
        Ok(JobStatus::from(&job))
    }

    /// Most recently created job for a repository, in any state
    pub async fn get_latest_repository_job(
        &self,
        repository_id: &str,
    ) -> Result<Option<JobStatus>, QueueError> {
        let job = self.store.latest_job_for_repository(repository_id).await?;
        Ok(job.as_ref().map(JobStatus::from))
    }

    /// Remove a job that has not started yet
    pub async fn remove_waiting_job(&self, job_id: &str) -> Result<(), QueueError> {
        let job = self
            .store
            .get_job(job_id)
            .await?
            .ok_or_else(|| QueueError::NotFound(job_id.to_string()))?;

        if !self.store.remove_pending_job(job_id).await? {
            return Err(QueueError::NotRemovable {
                id: job.id,
                state: job.state,
            });
        }

        tracing::info!(job_id, repository_id = %job.repository_id, "Removed waiting job");
        Ok(())
    }

    /// Apply the retention policy to finished jobs
    pub async fn prune(&self) -> Result<usize, QueueError> {
        Ok(self.store.prune_jobs(&self.retention, Utc::now()).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::JobState;
    use crate::storage::Database;

    fn request(repository_id: &str) -> JobRequest {
        JobRequest {
            repository_id: repository_id.to_string(),
            owner: "octo".to_string(),
            repo: "demo".to_string(),
            user_id: "user-1".to_string(),
        }
    }

    fn queue() -> (JobQueue, Arc<Database>) {
        let db = Arc::new(Database::open_in_memory().unwrap());
        (JobQueue::new(db.clone()), db)
    }

    #[tokio::test]
    async fn test_duplicate_requests_share_one_job() {
        let (queue, db) = queue();

        let first = queue
            .add_analysis_job(request("repo-1"), Priority::Normal)
            .await
            .unwrap();
        let second = queue
            .add_analysis_job(request("repo-1"), Priority::High)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(db.count_jobs(JobState::Waiting).await.unwrap(), 1);

        let status = queue.get_job_status(&first.id).await.unwrap();
        assert_eq!(status.state, JobState::Waiting);
        assert_eq!(status.progress, 0);
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_one_job() {
        let (queue, db) = queue();

        let (a, b) = tokio::join!(
            queue.add_analysis_job(request("repo-1"), Priority::Normal),
            queue.add_analysis_job(request("repo-1"), Priority::Normal),
        );

        assert_eq!(a.unwrap().id, b.unwrap().id);
        assert_eq!(db.count_jobs(JobState::Waiting).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_rejects_incomplete_request() {
        let (queue, _) = queue();
        let mut bad = request("repo-1");
        bad.owner = " ".to_string();

        let err = queue
            .add_analysis_job(bad, Priority::Normal)
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::Invalid(_)));
    }

    #[tokio::test]
    async fn test_latest_job_and_unknown_job() {
        let (queue, _) = queue();
        assert!(queue
            .get_latest_repository_job("repo-1")
            .await
            .unwrap()
            .is_none());

        let job = queue
            .add_analysis_job(request("repo-1"), Priority::Low)
            .await
            .unwrap();
        let latest = queue
            .get_latest_repository_job("repo-1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.job_id, job.id);
        assert_eq!(latest.priority, Priority::Low);

        assert!(matches!(
            queue.get_job_status("missing").await,
            Err(QueueError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_only_waiting_jobs_can_be_removed() {
        let (queue, db) = queue();
        let job = queue
            .add_analysis_job(request("repo-1"), Priority::Normal)
            .await
            .unwrap();
        let other = queue
            .add_analysis_job(request("repo-2"), Priority::Low)
            .await
            .unwrap();

        let now = Utc::now();
        db.claim_next_job("worker-a", now, now + chrono::Duration::minutes(10))
            .await
            .unwrap()
            .unwrap();

        let err = queue.remove_waiting_job(&job.id).await.unwrap_err();
        assert!(matches!(
            err,
            QueueError::NotRemovable {
                state: JobState::Active,
                ..
            }
        ));

        queue.remove_waiting_job(&other.id).await.unwrap();
        assert!(matches!(
            queue.get_job_status(&other.id).await,
            Err(QueueError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_prune_applies_configured_retention() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let queue = JobQueue::new(db.clone()).with_retention(RetentionPolicy {
            completed_max_count: 1,
            ..Default::default()
        });

        for repository_id in ["repo-1", "repo-2"] {
            let job = queue
                .add_analysis_job(request(repository_id), Priority::Normal)
                .await
                .unwrap();
            let now = Utc::now();
            db.claim_next_job("worker-a", now, now + chrono::Duration::minutes(10))
                .await
                .unwrap()
                .unwrap();
            db.complete_job(&job.id).await.unwrap();
        }

        assert_eq!(queue.prune().await.unwrap(), 1);
        assert_eq!(db.count_jobs(JobState::Completed).await.unwrap(), 1);
    }
}
