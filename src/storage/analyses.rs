//! Repositories and analysis records

use super::{format_ts, parse_opt_ts, parse_ts, AnalysisStore, Database, StoreError};
use crate::analysis::{AnalysisRecord, Repository, RepositoryStatus, Timeline};
use crate::detect::{DetectionResult, Evidence, Provider};
use crate::insight::Insights;
use crate::score::CompletenessBreakdown;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};

const REPOSITORY_COLUMNS: &str =
    "id, owner, name, external_id, status, last_analyzed_at";

const ANALYSIS_COLUMNS: &str = r#"
    id, repository_id, ai_detected, ai_provider, ai_confidence, evidence,
    readme_score, package_manager_score, tests_score, config_score,
    documentation_score, license_score, git_maturity_score, contributors_score,
    cicd_score, completeness_score, purpose, tech_stack, features, improvements,
    mistakes, project_type, framework, first_commit_at, last_commit_at,
    commit_count, contributor_count, created_at, updated_at
"#;

#[async_trait]
impl AnalysisStore for Database {
    async fn ensure_repository(
        &self,
        id: &str,
        owner: &str,
        name: &str,
        external_id: Option<u64>,
    ) -> Result<Repository, StoreError> {
        let (id, owner, name) = (id.to_string(), owner.to_string(), name.to_string());
        self.interact(move |conn| {
            let now = format_ts(&Utc::now());

            conn.execute(
                r#"
                INSERT INTO repositories (id, owner, name, external_id, status, created_at, updated_at)
                VALUES (?1, ?2, ?3, ?4, 'pending', ?5, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    external_id = COALESCE(repositories.external_id, excluded.external_id)
                "#,
                params![id, owner, name, external_id.map(|v| v as i64), now],
            )?;

            find_repository(conn, &id)?
                .ok_or_else(|| StoreError::NotFound(format!("repository {}", id)))
        })
        .await
    }

    async fn get_repository(&self, id: &str) -> Result<Option<Repository>, StoreError> {
        let id = id.to_string();
        self.interact(move |conn| find_repository(conn, &id)).await
    }

    async fn set_repository_status(
        &self,
        id: &str,
        status: RepositoryStatus,
    ) -> Result<(), StoreError> {
        let id = id.to_string();
        self.interact(move |conn| update_status(conn, &id, status))
            .await
    }

    async fn find_analysis(&self, repository_id: &str) -> Result<Option<AnalysisRecord>, StoreError> {
        let repository_id = repository_id.to_string();
        self.interact(move |conn| find_analysis(conn, &repository_id))
            .await
    }

    async fn upsert_analysis(&self, record: &AnalysisRecord) -> Result<AnalysisRecord, StoreError> {
        let record = record.clone();
        self.interact(move |conn| {
            upsert_analysis(conn, &record)?;
            find_analysis(conn, &record.repository_id)?.ok_or_else(|| {
                StoreError::NotFound(format!("analysis for {}", record.repository_id))
            })
        })
        .await
    }

    async fn complete_analysis(
        &self,
        record: &AnalysisRecord,
    ) -> Result<AnalysisRecord, StoreError> {
        let record = record.clone();
        self.interact(move |conn| {
            let tx = conn.transaction()?;

            upsert_analysis(&tx, &record)?;
            update_status(&tx, &record.repository_id, RepositoryStatus::Completed)?;
            let stored = find_analysis(&tx, &record.repository_id)?.ok_or_else(|| {
                StoreError::NotFound(format!("analysis for {}", record.repository_id))
            })?;

            tx.commit()?;
            Ok(stored)
        })
        .await
    }
}

fn find_repository(conn: &Connection, id: &str) -> Result<Option<Repository>, StoreError> {
    let row = conn
        .query_row(
            &format!("SELECT {} FROM repositories WHERE id = ?1", REPOSITORY_COLUMNS),
            params![id],
            |row| {
                Ok(RepositoryRow {
                    id: row.get(0)?,
                    owner: row.get(1)?,
                    name: row.get(2)?,
                    external_id: row.get(3)?,
                    status: row.get(4)?,
                    last_analyzed_at: row.get(5)?,
                })
            },
        )
        .optional()?;

    row.map(RepositoryRow::into_repository).transpose()
}

fn update_status(conn: &Connection, id: &str, status: RepositoryStatus) -> Result<(), StoreError> {
    let now = format_ts(&Utc::now());
    let changed = if status == RepositoryStatus::Completed {
        conn.execute(
            "UPDATE repositories SET status = ?2, last_analyzed_at = ?3, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), now],
        )?
    } else {
        conn.execute(
            "UPDATE repositories SET status = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, status.as_str(), now],
        )?
    };

    if changed == 0 {
        return Err(StoreError::NotFound(format!("repository {}", id)));
    }
    Ok(())
}

fn upsert_analysis(conn: &Connection, record: &AnalysisRecord) -> Result<(), StoreError> {
    let b = &record.breakdown;
    let insights = &record.insights;
    let timeline = &record.timeline;

    conn.execute(
        &format!(
            r#"
            INSERT INTO repository_analyses ({})
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                    ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29)
            ON CONFLICT(repository_id) DO UPDATE SET
                ai_detected = excluded.ai_detected,
                ai_provider = excluded.ai_provider,
                ai_confidence = excluded.ai_confidence,
                evidence = excluded.evidence,
                readme_score = excluded.readme_score,
                package_manager_score = excluded.package_manager_score,
                tests_score = excluded.tests_score,
                config_score = excluded.config_score,
                documentation_score = excluded.documentation_score,
                license_score = excluded.license_score,
                git_maturity_score = excluded.git_maturity_score,
                contributors_score = excluded.contributors_score,
                cicd_score = excluded.cicd_score,
                completeness_score = excluded.completeness_score,
                purpose = excluded.purpose,
                tech_stack = excluded.tech_stack,
                features = excluded.features,
                improvements = excluded.improvements,
                mistakes = excluded.mistakes,
                project_type = excluded.project_type,
                framework = excluded.framework,
                first_commit_at = excluded.first_commit_at,
                last_commit_at = excluded.last_commit_at,
                commit_count = excluded.commit_count,
                contributor_count = excluded.contributor_count,
                updated_at = excluded.updated_at
            "#,
            ANALYSIS_COLUMNS
        ),
        params![
            record.id,
            record.repository_id,
            record.detection.detected,
            record.detection.provider.map(|p| p.as_str()),
            record.detection.confidence,
            serde_json::to_string(&record.detection.evidence)?,
            b.readme,
            b.package_manager,
            b.tests,
            b.config,
            b.documentation,
            b.license,
            b.git_maturity,
            b.contributors,
            b.cicd,
            b.total,
            insights.purpose,
            serde_json::to_string(&insights.tech_stack)?,
            serde_json::to_string(&insights.features)?,
            serde_json::to_string(&insights.improvements)?,
            serde_json::to_string(&insights.mistakes)?,
            record.project_type,
            record.framework,
            timeline.first_commit_at.as_ref().map(format_ts),
            timeline.last_commit_at.as_ref().map(format_ts),
            timeline.commit_count,
            timeline.contributor_count,
            format_ts(&record.created_at),
            format_ts(&record.updated_at),
        ],
    )?;

    Ok(())
}

fn find_analysis(conn: &Connection, repository_id: &str) -> Result<Option<AnalysisRecord>, StoreError> {
    let row = conn
        .query_row(
            &format!(
                "SELECT {} FROM repository_analyses WHERE repository_id = ?1",
                ANALYSIS_COLUMNS
            ),
            params![repository_id],
            AnalysisRow::from_row,
        )
        .optional()?;

    row.map(AnalysisRow::into_record).transpose()
}

// Internal row types for database mapping

struct RepositoryRow {
    id: String,
    owner: String,
    name: String,
    external_id: Option<i64>,
    status: String,
    last_analyzed_at: Option<String>,
}

impl RepositoryRow {
    fn into_repository(self) -> Result<Repository, StoreError> {
        Ok(Repository {
            status: self.status.parse().map_err(StoreError::Invalid)?,
            last_analyzed_at: parse_opt_ts(self.last_analyzed_at)?,
            external_id: self.external_id.map(|v| v as u64),
            id: self.id,
            owner: self.owner,
            name: self.name,
        })
    }
}

struct AnalysisRow {
    id: String,
    repository_id: String,
    ai_detected: bool,
    ai_provider: Option<String>,
    ai_confidence: f64,
    evidence: String,
    scores: [u32; 10],
    purpose: String,
    tech_stack: String,
    features: String,
    improvements: String,
    mistakes: String,
    project_type: String,
    framework: Option<String>,
    first_commit_at: Option<String>,
    last_commit_at: Option<String>,
    commit_count: u32,
    contributor_count: u32,
    created_at: String,
    updated_at: String,
}

impl AnalysisRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        let mut scores = [0u32; 10];
        for (i, score) in scores.iter_mut().enumerate() {
            *score = row.get(6 + i)?;
        }

        Ok(Self {
            id: row.get(0)?,
            repository_id: row.get(1)?,
            ai_detected: row.get(2)?,
            ai_provider: row.get(3)?,
            ai_confidence: row.get(4)?,
            evidence: row.get(5)?,
            scores,
            purpose: row.get(16)?,
            tech_stack: row.get(17)?,
            features: row.get(18)?,
            improvements: row.get(19)?,
            mistakes: row.get(20)?,
            project_type: row.get(21)?,
            framework: row.get(22)?,
            first_commit_at: row.get(23)?,
            last_commit_at: row.get(24)?,
            commit_count: row.get(25)?,
            contributor_count: row.get(26)?,
            created_at: row.get(27)?,
            updated_at: row.get(28)?,
        })
    }

    fn into_record(self) -> Result<AnalysisRecord, StoreError> {
        let provider = self
            .ai_provider
            .as_deref()
            .map(str::parse::<Provider>)
            .transpose()
            .map_err(StoreError::Invalid)?;
        let evidence: Evidence = serde_json::from_str(&self.evidence)?;

        let [readme, package_manager, tests, config, documentation, license, git_maturity, contributors, cicd, total] =
            self.scores;
        let breakdown = CompletenessBreakdown {
            readme,
            package_manager,
            tests,
            config,
            documentation,
            license,
            git_maturity,
            contributors,
            cicd,
            total,
        };

        Ok(AnalysisRecord {
            id: self.id,
            repository_id: self.repository_id,
            detection: DetectionResult {
                detected: self.ai_detected,
                provider,
                confidence: self.ai_confidence,
                evidence,
            },
            breakdown,
            insights: Insights {
                purpose: self.purpose,
                tech_stack: serde_json::from_str(&self.tech_stack)?,
                features: serde_json::from_str(&self.features)?,
                improvements: serde_json::from_str(&self.improvements)?,
                mistakes: serde_json::from_str(&self.mistakes)?,
            },
            project_type: self.project_type,
            framework: self.framework,
            timeline: Timeline {
                first_commit_at: parse_opt_ts(self.first_commit_at)?,
                last_commit_at: parse_opt_ts(self.last_commit_at)?,
                commit_count: self.commit_count,
                contributor_count: self.contributor_count,
            },
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn record(repository_id: &str, score: u32) -> AnalysisRecord {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut breakdown = CompletenessBreakdown::default();
        breakdown.set(crate::score::ScoreCategory::Tests, score);

        AnalysisRecord {
            id: uuid::Uuid::new_v4().to_string(),
            repository_id: repository_id.to_string(),
            detection: DetectionResult {
                detected: true,
                provider: Some(Provider::Claude),
                confidence: 0.5,
                evidence: Evidence {
                    files: vec!["CLAUDE.md".into()],
                    commits: vec![],
                    readme_mentions: vec!["claude".into()],
                },
            },
            breakdown,
            insights: Insights {
                purpose: "Demo".into(),
                tech_stack: vec!["Rust".into()],
                ..Default::default()
            },
            project_type: "cli".into(),
            framework: None,
            timeline: Timeline {
                first_commit_at: Some(now - Duration::days(30)),
                last_commit_at: Some(now),
                commit_count: 12,
                contributor_count: 2,
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_ensure_repository_is_idempotent() {
        let db = Database::open_in_memory().unwrap();

        let first = db.ensure_repository("r1", "octo", "demo", None).await.unwrap();
        assert_eq!(first.status, RepositoryStatus::Pending);
        assert_eq!(first.external_id, None);

        let second = db
            .ensure_repository("r1", "octo", "demo", Some(42))
            .await
            .unwrap();
        assert_eq!(second.external_id, Some(42));

        let third = db
            .ensure_repository("r1", "octo", "demo", Some(7))
            .await
            .unwrap();
        assert_eq!(third.external_id, Some(42));
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let db = Database::open_in_memory().unwrap();
        db.ensure_repository("r1", "octo", "demo", None).await.unwrap();

        db.set_repository_status("r1", RepositoryStatus::Processing)
            .await
            .unwrap();
        let repo = db.get_repository("r1").await.unwrap().unwrap();
        assert_eq!(repo.status, RepositoryStatus::Processing);
        assert!(repo.last_analyzed_at.is_none());

        let err = db
            .set_repository_status("missing", RepositoryStatus::Failed)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_upsert_keeps_one_record_per_repository() {
        let db = Database::open_in_memory().unwrap();
        db.ensure_repository("r1", "octo", "demo", None).await.unwrap();

        let first = db.complete_analysis(&record("r1", 7)).await.unwrap();
        assert_eq!(first.breakdown.tests, 7);
        assert_eq!(first.detection.provider, Some(Provider::Claude));

        let mut second = record("r1", 15);
        second.updated_at = second.updated_at + Duration::hours(1);
        let stored = db.complete_analysis(&second).await.unwrap();

        assert_eq!(stored.id, first.id);
        assert_eq!(stored.created_at, first.created_at);
        assert_eq!(stored.breakdown.tests, 15);
        assert_eq!(stored.updated_at, second.updated_at);

        let conn = db.conn().unwrap();
        let rows: i64 = conn
            .query_row("SELECT COUNT(*) FROM repository_analyses", [], |row| row.get(0))
            .unwrap();
        assert_eq!(rows, 1);
        drop(conn);

        let repo = db.get_repository("r1").await.unwrap().unwrap();
        assert_eq!(repo.status, RepositoryStatus::Completed);
        assert!(repo.last_analyzed_at.is_some());
    }

    #[tokio::test]
    async fn test_record_round_trips_through_columns() {
        let db = Database::open_in_memory().unwrap();
        db.ensure_repository("r1", "octo", "demo", None).await.unwrap();

        let original = record("r1", 10);
        let stored = db.upsert_analysis(&original).await.unwrap();
        assert_eq!(stored, original);
        assert_eq!(db.find_analysis("r1").await.unwrap(), Some(original));
        assert_eq!(db.find_analysis("r2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_analysis_requires_known_repository() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.complete_analysis(&record("ghost", 1)).await.is_err());
        assert_eq!(db.find_analysis("ghost").await.unwrap(), None);
    }
}
