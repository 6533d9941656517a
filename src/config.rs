//! Application configuration for reposcope

use crate::cache::CacheTtls;
use crate::github::{HttpTransportConfig, RetryPolicy};
use crate::insight::LlmConfig;
use crate::jobs::{RetentionPolicy, WorkerOptions};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable that overrides `github.token`
pub const TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Top-level configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub github: GithubConfig,

    /// Cache TTLs in seconds
    #[serde(default)]
    pub cache: CacheTtls,

    #[serde(default)]
    pub queue: QueueConfig,

    #[serde(default)]
    pub insights: InsightsConfig,

    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Hosting API access
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GithubConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Personal access token
    pub token: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Warn once when the remaining quota drops to this value
    #[serde(default = "default_low_quota_threshold")]
    pub low_quota_threshold: u32,
}

/// Background queue and worker pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,

    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,

    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Job starts allowed per rate window
    #[serde(default = "default_rate_limit_jobs")]
    pub rate_limit_jobs: u32,

    #[serde(default = "default_rate_limit_window_secs")]
    pub rate_limit_window_secs: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// How long a claimed job stays owned by its worker without progress
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,

    /// Period of retention pruning, cache purging and lease recovery
    #[serde(default = "default_maintenance_interval_secs")]
    pub maintenance_interval_secs: u64,

    #[serde(default = "default_completed_max_age_days")]
    pub completed_max_age_days: i64,

    #[serde(default = "default_completed_max_count")]
    pub completed_max_count: usize,

    #[serde(default = "default_failed_max_age_days")]
    pub failed_max_age_days: i64,

    #[serde(default = "default_failed_max_count")]
    pub failed_max_count: usize,
}

/// Completion model used for insights; heuristics are used when unset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightsConfig {
    /// API endpoint URL (e.g., http://localhost:11434 for Ollama)
    pub endpoint: Option<String>,

    pub model: Option<String>,

    pub api_key: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite file; defaults to the platform data directory
    pub path: Option<PathBuf>,
}

fn default_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    10_000
}

fn default_low_quota_threshold() -> u32 {
    10
}

fn default_max_attempts() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    2_000
}

fn default_backoff_max_ms() -> u64 {
    300_000
}

fn default_concurrency() -> usize {
    5
}

fn default_rate_limit_jobs() -> u32 {
    10
}

fn default_rate_limit_window_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_lease_secs() -> u64 {
    10 * 60
}

fn default_maintenance_interval_secs() -> u64 {
    5 * 60
}

fn default_completed_max_age_days() -> i64 {
    7
}

fn default_completed_max_count() -> usize {
    5_000
}

fn default_failed_max_age_days() -> i64 {
    30
}

fn default_failed_max_count() -> usize {
    10_000
}

fn default_max_tokens() -> usize {
    1024
}

fn default_temperature() -> f32 {
    0.2
}

fn default_llm_timeout_secs() -> u64 {
    60
}

impl Default for GithubConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            token: None,
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            low_quota_threshold: default_low_quota_threshold(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            concurrency: default_concurrency(),
            rate_limit_jobs: default_rate_limit_jobs(),
            rate_limit_window_secs: default_rate_limit_window_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            lease_secs: default_lease_secs(),
            maintenance_interval_secs: default_maintenance_interval_secs(),
            completed_max_age_days: default_completed_max_age_days(),
            completed_max_count: default_completed_max_count(),
            failed_max_age_days: default_failed_max_age_days(),
            failed_max_count: default_failed_max_count(),
        }
    }
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: None,
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl AppConfig {
    /// Default location of the configuration file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(crate::APP_NAME).join("config.toml"))
    }

    /// Load configuration from `path` or return defaults, then apply the environment
    pub fn load_or_default(path: &Path) -> Result<Self> {
        let config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        Ok(config.with_token_override(std::env::var(TOKEN_ENV).ok()))
    }

    /// Save configuration to `path`, creating parent directories
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;

        Ok(())
    }

    /// A non-empty token from the environment wins over the file
    pub fn with_token_override(mut self, token: Option<String>) -> Self {
        if let Some(token) = token.filter(|t| !t.trim().is_empty()) {
            self.github.token = Some(token);
        }
        self
    }

    /// Database file, falling back to the platform data directory
    pub fn database_path(&self) -> Result<PathBuf> {
        match self.database.path {
            Some(ref path) => Ok(path.clone()),
            None => dirs::data_dir()
                .map(|dir| dir.join(crate::APP_NAME).join(format!("{}.db", crate::APP_NAME)))
                .context("Could not determine a data directory; set database.path"),
        }
    }
}

impl GithubConfig {
    pub fn transport_config(&self) -> HttpTransportConfig {
        HttpTransportConfig {
            api_url: self.api_url.clone(),
            token: self.token.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            ..Default::default()
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

impl QueueConfig {
    pub fn worker_options(&self) -> WorkerOptions {
        WorkerOptions {
            concurrency: self.concurrency,
            max_attempts: self.max_attempts.max(1),
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_max: Duration::from_millis(self.backoff_max_ms),
            rate_limit_jobs: self.rate_limit_jobs,
            rate_limit_window: Duration::from_secs(self.rate_limit_window_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            lease: Duration::from_secs(self.lease_secs.max(1)),
            maintenance_interval: Duration::from_secs(self.maintenance_interval_secs.max(1)),
            retention: self.retention(),
        }
    }

    pub fn retention(&self) -> RetentionPolicy {
        RetentionPolicy {
            completed_max_age: chrono::Duration::days(self.completed_max_age_days),
            completed_max_count: self.completed_max_count,
            failed_max_age: chrono::Duration::days(self.failed_max_age_days),
            failed_max_count: self.failed_max_count,
        }
    }
}

impl InsightsConfig {
    /// Completion settings, when an endpoint is configured
    pub fn llm_config(&self) -> Option<LlmConfig> {
        let endpoint = self.endpoint.as_ref().filter(|e| !e.trim().is_empty())?;
        let defaults = LlmConfig::default();

        Some(LlmConfig {
            endpoint: endpoint.clone(),
            model: self.model.clone().unwrap_or(defaults.model),
            api_key: self.api_key.clone(),
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            timeout: Duration::from_secs(self.timeout_secs),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.retry_policy().max_retries, 3);
        let options = config.queue.worker_options();
        assert_eq!(options.concurrency, 5);
        assert_eq!(options.lease, Duration::from_secs(600));
        assert_eq!(options.maintenance_interval, Duration::from_secs(300));
        assert_eq!(options.retention, RetentionPolicy::default());
        assert_eq!(config.queue.retention(), RetentionPolicy::default());
        assert!(config.insights.llm_config().is_none());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [github]
            timeout_secs = 3

            [queue]
            concurrency = 2
            "#,
        )
        .unwrap();

        assert_eq!(config.github.timeout_secs, 3);
        assert_eq!(config.github.max_retries, 3);
        assert_eq!(config.queue.concurrency, 2);
        assert_eq!(config.queue.max_attempts, 5);
        assert_eq!(config.cache, CacheTtls::default());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.insights.endpoint = Some("http://localhost:11434".to_string());
        config.cache.tree = 120;
        config.save(&path).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let loaded: AppConfig = toml::from_str(&content).unwrap();
        assert_eq!(loaded, config);

        let llm = loaded.insights.llm_config().unwrap();
        assert_eq!(llm.model, "llama3");
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::load_or_default(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.queue, QueueConfig::default());
    }

    #[test]
    fn test_token_override() {
        let config = AppConfig::default().with_token_override(Some("ghp_env".to_string()));
        assert_eq!(config.github.token.as_deref(), Some("ghp_env"));

        let config = config.with_token_override(Some("  ".to_string()));
        assert_eq!(config.github.token.as_deref(), Some("ghp_env"));
    }
}
