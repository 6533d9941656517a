//! Database schema definition

/// SQL schema for the reposcope database
pub const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

-- Tracked repositories and their analysis status
CREATE TABLE IF NOT EXISTS repositories (
    id TEXT PRIMARY KEY,
    owner TEXT NOT NULL,
    name TEXT NOT NULL,
    external_id INTEGER,
    status TEXT NOT NULL DEFAULT 'pending',
    last_analyzed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_repositories_slug ON repositories(owner, name);
CREATE INDEX IF NOT EXISTS idx_repositories_status ON repositories(status);

-- One analysis record per repository
CREATE TABLE IF NOT EXISTS repository_analyses (
    id TEXT PRIMARY KEY,
    repository_id TEXT NOT NULL UNIQUE,
    ai_detected INTEGER NOT NULL,
    ai_provider TEXT,
    ai_confidence REAL NOT NULL,
    evidence TEXT NOT NULL,
    completeness_score INTEGER NOT NULL,
    readme_score INTEGER NOT NULL,
    package_manager_score INTEGER NOT NULL,
    tests_score INTEGER NOT NULL,
    config_score INTEGER NOT NULL,
    documentation_score INTEGER NOT NULL,
    license_score INTEGER NOT NULL,
    git_maturity_score INTEGER NOT NULL,
    contributors_score INTEGER NOT NULL,
    cicd_score INTEGER NOT NULL,
    purpose TEXT NOT NULL,
    tech_stack TEXT NOT NULL,
    features TEXT NOT NULL,
    improvements TEXT NOT NULL,
    mistakes TEXT NOT NULL,
    project_type TEXT NOT NULL,
    framework TEXT,
    first_commit_at TEXT,
    last_commit_at TEXT,
    commit_count INTEGER NOT NULL,
    contributor_count INTEGER NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    FOREIGN KEY (repository_id) REFERENCES repositories(id) ON DELETE CASCADE
);

-- Background analysis jobs
CREATE TABLE IF NOT EXISTS analysis_jobs (
    id TEXT PRIMARY KEY,
    repository_id TEXT NOT NULL,
    owner TEXT NOT NULL,
    repo TEXT NOT NULL,
    user_id TEXT NOT NULL,
    priority INTEGER NOT NULL,
    state TEXT NOT NULL,
    attempts_made INTEGER NOT NULL DEFAULT 0,
    progress INTEGER NOT NULL DEFAULT 0,
    failed_reason TEXT,
    claimed_by TEXT,
    lease_until TEXT,
    run_at TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    finished_at TEXT
);

-- At most one in-flight job per repository
CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_in_flight
    ON analysis_jobs(repository_id)
    WHERE state IN ('waiting', 'active', 'delayed');
CREATE INDEX IF NOT EXISTS idx_jobs_ready ON analysis_jobs(state, priority, run_at);
CREATE INDEX IF NOT EXISTS idx_jobs_repository ON analysis_jobs(repository_id, created_at);
CREATE INDEX IF NOT EXISTS idx_jobs_finished ON analysis_jobs(state, finished_at);
CREATE INDEX IF NOT EXISTS idx_jobs_lease ON analysis_jobs(state, lease_until);

-- Cached upstream responses
CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_cache_expires ON cache_entries(expires_at);
"#;
