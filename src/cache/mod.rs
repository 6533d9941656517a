//! Best-effort key/value cache with per-entry TTL
//!
//! Readers must tolerate misses and stale data. Entries are grouped under
//! deterministic key prefixes so all data for one repository (or one user)
//! can be dropped at once.

mod memory;

pub use memory::MemoryCache;

use crate::storage::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A cached value and its expiry
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Storage backend for cached upstream responses
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Get a live entry; expired entries read as misses
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store a value for `ttl`
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError>;

    /// Remove every entry whose key starts with `prefix`, returning how many were removed
    async fn invalidate_prefix(&self, prefix: &str) -> Result<usize, StoreError>;

    /// Drop expired entries
    async fn purge_expired(&self) -> Result<usize, StoreError>;
}

/// Categories of cached upstream data, each with its own TTL
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheCategory {
    Metadata,
    Commits,
    Tree,
    Topics,
    Languages,
    Content,
    UserRepos,
}

impl CacheCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::Metadata => "meta",
            CacheCategory::Commits => "commits",
            CacheCategory::Tree => "tree",
            CacheCategory::Topics => "topics",
            CacheCategory::Languages => "languages",
            CacheCategory::Content => "content",
            CacheCategory::UserRepos => "repos",
        }
    }
}

/// TTLs in seconds per category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheTtls {
    #[serde(default = "default_hour")]
    pub metadata: u64,
    #[serde(default = "default_hour")]
    pub commits: u64,
    #[serde(default = "default_hour")]
    pub tree: u64,
    #[serde(default = "default_day")]
    pub topics: u64,
    #[serde(default = "default_day")]
    pub languages: u64,
    #[serde(default = "default_hour")]
    pub content: u64,
    #[serde(default = "default_user_repos")]
    pub user_repos: u64,
}

fn default_hour() -> u64 {
    60 * 60
}

fn default_day() -> u64 {
    24 * 60 * 60
}

fn default_user_repos() -> u64 {
    5 * 60
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            metadata: default_hour(),
            commits: default_hour(),
            tree: default_hour(),
            topics: default_day(),
            languages: default_day(),
            content: default_hour(),
            user_repos: default_user_repos(),
        }
    }
}

impl CacheTtls {
    pub fn ttl(&self, category: CacheCategory) -> Duration {
        let secs = match category {
            CacheCategory::Metadata => self.metadata,
            CacheCategory::Commits => self.commits,
            CacheCategory::Tree => self.tree,
            CacheCategory::Topics => self.topics,
            CacheCategory::Languages => self.languages,
            CacheCategory::Content => self.content,
            CacheCategory::UserRepos => self.user_repos,
        };
        Duration::from_secs(secs)
    }
}

/// Prefix shared by every key for one repository
pub fn repo_prefix(owner: &str, repo: &str) -> String {
    format!("gh:{}/{}:", owner.to_lowercase(), repo.to_lowercase())
}

/// Prefix shared by every key for one user
pub fn user_prefix(login: &str) -> String {
    format!("gh:user:{}:", login.to_lowercase())
}

/// Key for repository-scoped data
pub fn repo_key(owner: &str, repo: &str, category: CacheCategory, args: Option<&str>) -> String {
    match args {
        Some(args) => format!("{}{}:{}", repo_prefix(owner, repo), category.as_str(), args),
        None => format!("{}{}", repo_prefix(owner, repo), category.as_str()),
    }
}

/// Key for user-scoped data
pub fn user_key(login: &str, category: CacheCategory, args: Option<&str>) -> String {
    match args {
        Some(args) => format!("{}{}:{}", user_prefix(login), category.as_str(), args),
        None => format!("{}{}", user_prefix(login), category.as_str()),
    }
}
