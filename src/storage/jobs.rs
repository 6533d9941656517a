//! Persistent job queue

use super::{format_ts, parse_opt_ts, parse_ts, Database, JobStore, StoreError};
use crate::jobs::{AnalysisJob, JobState, Priority, RetentionPolicy};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const JOB_COLUMNS: &str = r#"
    id, repository_id, owner, repo, user_id, priority, state, attempts_made,
    progress, failed_reason, claimed_by, lease_until, run_at, created_at,
    updated_at, finished_at
"#;

#[async_trait]
impl JobStore for Database {
    async fn insert_or_get_in_flight(
        &self,
        job: &AnalysisJob,
    ) -> Result<(AnalysisJob, bool), StoreError> {
        let job = job.clone();
        self.interact(move |conn| {
            let inserted = conn.execute(
                &format!(
                    r#"
                    INSERT OR IGNORE INTO analysis_jobs ({})
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                    "#,
                    JOB_COLUMNS
                ),
                params![
                    job.id,
                    job.repository_id,
                    job.owner,
                    job.repo,
                    job.user_id,
                    job.priority.rank(),
                    job.state.as_str(),
                    job.attempts_made,
                    job.progress,
                    job.failed_reason,
                    job.claimed_by,
                    job.lease_until.as_ref().map(format_ts),
                    format_ts(&job.run_at),
                    format_ts(&job.created_at),
                    format_ts(&job.updated_at),
                    job.finished_at.as_ref().map(format_ts),
                ],
            )?;

            if inserted == 1 {
                let stored = find_job(conn, &job.id)?
                    .ok_or_else(|| StoreError::NotFound(format!("job {}", job.id)))?;
                return Ok((stored, true));
            }

            let existing = conn
                .query_row(
                    &format!(
                        r#"
                        SELECT {} FROM analysis_jobs
                        WHERE repository_id = ?1 AND state IN ('waiting', 'active', 'delayed')
                        "#,
                        JOB_COLUMNS
                    ),
                    params![job.repository_id],
                    JobRow::from_row,
                )
                .optional()?;

            match existing {
                Some(row) => Ok((row.into_job()?, false)),
                // Ignored for another reason, e.g. a duplicate id
                None => Err(StoreError::Invalid(format!(
                    "job {} was not inserted",
                    job.id
                ))),
            }
        })
        .await
    }

    async fn get_job(&self, id: &str) -> Result<Option<AnalysisJob>, StoreError> {
        let id = id.to_string();
        self.interact(move |conn| find_job(conn, &id)).await
    }

    async fn latest_job_for_repository(
        &self,
        repository_id: &str,
    ) -> Result<Option<AnalysisJob>, StoreError> {
        let repository_id = repository_id.to_string();
        self.interact(move |conn| {
            let row = conn
                .query_row(
                    &format!(
                        r#"
                        SELECT {} FROM analysis_jobs
                        WHERE repository_id = ?1
                        ORDER BY created_at DESC, rowid DESC
                        LIMIT 1
                        "#,
                        JOB_COLUMNS
                    ),
                    params![repository_id],
                    JobRow::from_row,
                )
                .optional()?;

            row.map(JobRow::into_job).transpose()
        })
        .await
    }

    async fn claim_next_job(
        &self,
        worker_id: &str,
        now: DateTime<Utc>,
        lease_until: DateTime<Utc>,
    ) -> Result<Option<AnalysisJob>, StoreError> {
        let worker_id = worker_id.to_string();
        self.interact(move |conn| {
            let tx = conn.transaction()?;
            let now = format_ts(&now);

            let next: Option<String> = tx
                .query_row(
                    r#"
                    SELECT id FROM analysis_jobs
                    WHERE state IN ('waiting', 'delayed') AND run_at <= ?1
                    ORDER BY priority DESC, created_at ASC, rowid ASC
                    LIMIT 1
                    "#,
                    params![now],
                    |row| row.get(0),
                )
                .optional()?;

            let Some(id) = next else {
                return Ok(None);
            };

            tx.execute(
                r#"
                UPDATE analysis_jobs
                SET state = 'active', attempts_made = attempts_made + 1,
                    claimed_by = ?2, lease_until = ?3, updated_at = ?4
                WHERE id = ?1
                "#,
                params![id, worker_id, format_ts(&lease_until), now],
            )?;

            let job = find_job(&tx, &id)?;
            tx.commit()?;
            Ok(job)
        })
        .await
    }

    async fn update_job_progress(&self, id: &str, progress: u8) -> Result<(), StoreError> {
        let id = id.to_string();
        self.interact(move |conn| {
            let changed = conn.execute(
                "UPDATE analysis_jobs SET progress = ?2, updated_at = ?3 WHERE id = ?1",
                params![id, progress.min(100), format_ts(&Utc::now())],
            )?;

            if changed == 0 {
                return Err(StoreError::NotFound(format!("job {}", id)));
            }
            Ok(())
        })
        .await
    }

    async fn renew_job_lease(
        &self,
        id: &str,
        worker_id: &str,
        lease_until: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let id = id.to_string();
        let worker_id = worker_id.to_string();
        self.interact(move |conn| {
            let renewed = conn.execute(
                r#"
                UPDATE analysis_jobs
                SET lease_until = ?3, updated_at = ?4
                WHERE id = ?1 AND state = 'active' AND claimed_by = ?2
                "#,
                params![id, worker_id, format_ts(&lease_until), format_ts(&Utc::now())],
            )?;
            Ok(renewed > 0)
        })
        .await
    }

    async fn complete_job(&self, id: &str) -> Result<Option<AnalysisJob>, StoreError> {
        let id = id.to_string();
        self.interact(move |conn| {
            let now = format_ts(&Utc::now());
            conn.execute(
                r#"
                UPDATE analysis_jobs
                SET state = 'completed', progress = 100, failed_reason = NULL,
                    lease_until = NULL, updated_at = ?2, finished_at = ?2
                WHERE id = ?1
                "#,
                params![id, now],
            )?;
            find_job(conn, &id)
        })
        .await
    }

    async fn record_job_failure(
        &self,
        id: &str,
        reason: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> Result<Option<AnalysisJob>, StoreError> {
        let id = id.to_string();
        let reason = reason.to_string();
        self.interact(move |conn| {
            let now = format_ts(&Utc::now());

            match retry_at {
                Some(at) => conn.execute(
                    r#"
                    UPDATE analysis_jobs
                    SET state = 'delayed', failed_reason = ?2, run_at = ?3,
                        lease_until = NULL, updated_at = ?4
                    WHERE id = ?1
                    "#,
                    params![id, reason, format_ts(&at), now],
                )?,
                None => conn.execute(
                    r#"
                    UPDATE analysis_jobs
                    SET state = 'failed', failed_reason = ?2, lease_until = NULL,
                        updated_at = ?3, finished_at = ?3
                    WHERE id = ?1
                    "#,
                    params![id, reason, now],
                )?,
            };

            find_job(conn, &id)
        })
        .await
    }

    async fn remove_pending_job(&self, id: &str) -> Result<bool, StoreError> {
        let id = id.to_string();
        self.interact(move |conn| {
            let removed = conn.execute(
                "DELETE FROM analysis_jobs WHERE id = ?1 AND state IN ('waiting', 'delayed')",
                params![id],
            )?;
            Ok(removed > 0)
        })
        .await
    }

    async fn requeue_expired_jobs(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.interact(move |conn| {
            let now = format_ts(&now);
            let requeued = conn.execute(
                r#"
                UPDATE analysis_jobs
                SET state = 'waiting', claimed_by = NULL, lease_until = NULL, updated_at = ?1
                WHERE state = 'active' AND (lease_until IS NULL OR lease_until <= ?1)
                "#,
                params![now],
            )?;
            if requeued > 0 {
                tracing::warn!(requeued, "Requeued jobs with expired leases");
            }
            Ok(requeued)
        })
        .await
    }

    async fn prune_jobs(
        &self,
        policy: &RetentionPolicy,
        now: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let policy = policy.clone();
        self.interact(move |conn| {
            let tx = conn.transaction()?;

            let mut removed = 0;
            for (state, max_age, max_count) in [
                (
                    JobState::Completed,
                    policy.completed_max_age,
                    policy.completed_max_count,
                ),
                (
                    JobState::Failed,
                    policy.failed_max_age,
                    policy.failed_max_count,
                ),
            ] {
                let cutoff = format_ts(&(now - max_age));
                removed += tx.execute(
                    "DELETE FROM analysis_jobs WHERE state = ?1 AND finished_at < ?2",
                    params![state.as_str(), cutoff],
                )?;

                removed += tx.execute(
                    r#"
                    DELETE FROM analysis_jobs
                    WHERE state = ?1 AND id NOT IN (
                        SELECT id FROM analysis_jobs
                        WHERE state = ?1
                        ORDER BY finished_at DESC, rowid DESC
                        LIMIT ?2
                    )
                    "#,
                    params![state.as_str(), max_count as i64],
                )?;
            }

            tx.commit()?;
            if removed > 0 {
                tracing::debug!(removed, "Pruned finished jobs");
            }
            Ok(removed)
        })
        .await
    }

    async fn count_jobs(&self, state: JobState) -> Result<usize, StoreError> {
        self.interact(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM analysis_jobs WHERE state = ?1",
                params![state.as_str()],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }
}

fn find_job(conn: &Connection, id: &str) -> Result<Option<AnalysisJob>, StoreError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM analysis_jobs WHERE id = ?1", JOB_COLUMNS),
            params![id],
            JobRow::from_row,
        )
        .optional()?;

    row.map(JobRow::into_job).transpose()
}

// Internal row type for database mapping
struct JobRow {
    id: String,
    repository_id: String,
    owner: String,
    repo: String,
    user_id: String,
    priority: i64,
    state: String,
    attempts_made: u32,
    progress: u8,
    failed_reason: Option<String>,
    claimed_by: Option<String>,
    lease_until: Option<String>,
    run_at: String,
    created_at: String,
    updated_at: String,
    finished_at: Option<String>,
}

impl JobRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            repository_id: row.get(1)?,
            owner: row.get(2)?,
            repo: row.get(3)?,
            user_id: row.get(4)?,
            priority: row.get(5)?,
            state: row.get(6)?,
            attempts_made: row.get(7)?,
            progress: row.get(8)?,
            failed_reason: row.get(9)?,
            claimed_by: row.get(10)?,
            lease_until: row.get(11)?,
            run_at: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
            finished_at: row.get(15)?,
        })
    }

    fn into_job(self) -> Result<AnalysisJob, StoreError> {
        let priority = Priority::from_rank(self.priority)
            .ok_or_else(|| StoreError::Invalid(format!("unknown priority rank {}", self.priority)))?;

        Ok(AnalysisJob {
            id: self.id,
            repository_id: self.repository_id,
            owner: self.owner,
            repo: self.repo,
            user_id: self.user_id,
            priority,
            state: self.state.parse().map_err(StoreError::Invalid)?,
            attempts_made: self.attempts_made,
            progress: self.progress,
            failed_reason: self.failed_reason,
            claimed_by: self.claimed_by,
            lease_until: parse_opt_ts(self.lease_until)?,
            run_at: parse_ts(&self.run_at)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            finished_at: parse_opt_ts(self.finished_at)?,
        })
    }
}
