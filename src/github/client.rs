//! Cached, quota-aware, retrying client for the hosting API

use super::error::{ClientError, ClientResult};
use super::retry::{retry_with_backoff, RetryPolicy};
use super::transport::Transport;
use super::types::{
    CommitInfo, CommitQuery, LanguageBreakdown, RateLimitStatus, RepoMetadata, RepoTree,
    WireCommit, WireRepository, WireTopics, WireTree,
};
use crate::cache::{self, CacheCategory, CacheStore, CacheTtls};
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Branch tried first when none is given
pub const DEFAULT_BRANCH: &str = "main";
/// Branch tried once when the first branch does not exist
pub const FALLBACK_BRANCH: &str = "master";

/// Warn when remaining quota drops below this many calls
pub const DEFAULT_LOW_QUOTA_THRESHOLD: u32 = 10;

/// Client for repository data
///
/// Every read is cache-aside: the cache is consulted first and populated on a
/// miss. Before each network attempt the current quota is checked; an exhausted
/// quota fails with [`ClientError::RateLimited`] without touching the network.
/// Retryable failures are retried with exponential backoff.
pub struct RepoClient {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn CacheStore>,
    ttls: CacheTtls,
    retry: RetryPolicy,
    low_quota_threshold: u32,
    low_quota_warned: AtomicBool,
}

impl RepoClient {
    pub fn new(transport: Arc<dyn Transport>, cache: Arc<dyn CacheStore>) -> Self {
        Self {
            transport,
            cache,
            ttls: CacheTtls::default(),
            retry: RetryPolicy::default(),
            low_quota_threshold: DEFAULT_LOW_QUOTA_THRESHOLD,
            low_quota_warned: AtomicBool::new(false),
        }
    }

    pub fn with_ttls(mut self, ttls: CacheTtls) -> Self {
        self.ttls = ttls;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_low_quota_threshold(mut self, threshold: u32) -> Self {
        self.low_quota_threshold = threshold;
        self
    }

    // ==================== Repository data ====================

    /// Repository metadata
    pub async fn get_repository(&self, owner: &str, repo: &str) -> ClientResult<RepoMetadata> {
        let key = cache::repo_key(owner, repo, CacheCategory::Metadata, None);
        self.cached(&key, CacheCategory::Metadata, move || async move {
            let body = self
                .call("get_repository", &format!("repos/{}/{}", owner, repo), &[])
                .await?;
            let wire: WireRepository = serde_json::from_value(body)?;
            Ok(RepoMetadata::from(wire))
        })
        .await
    }

    /// Recursive file tree of `branch` (default `main`)
    ///
    /// A missing branch is retried exactly once against `master`.
    pub async fn get_tree(
        &self,
        owner: &str,
        repo: &str,
        branch: Option<&str>,
    ) -> ClientResult<RepoTree> {
        let requested = branch.unwrap_or(DEFAULT_BRANCH);
        let mut candidates = vec![requested];
        if requested != FALLBACK_BRANCH {
            candidates.push(FALLBACK_BRANCH);
        }

        let mut attempt = 0;
        loop {
            let candidate = candidates[attempt];
            match self.fetch_tree(owner, repo, candidate).await {
                Ok(tree) => return Ok(tree),
                Err(err) if err.is_not_found() && attempt + 1 < candidates.len() => {
                    tracing::debug!(
                        owner,
                        repo,
                        branch = candidate,
                        "Branch not found, falling back to {}",
                        candidates[attempt + 1]
                    );
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn fetch_tree(&self, owner: &str, repo: &str, branch: &str) -> ClientResult<RepoTree> {
        let key = cache::repo_key(owner, repo, CacheCategory::Tree, Some(branch));
        self.cached(&key, CacheCategory::Tree, move || async move {
            let body = self
                .call(
                    "get_tree",
                    &format!("repos/{}/{}/git/trees/{}", owner, repo, branch),
                    &[("recursive".to_string(), "1".to_string())],
                )
                .await?;
            let wire: WireTree = serde_json::from_value(body)?;
            Ok(wire.into_tree(branch))
        })
        .await
    }

    /// One page of commit history, newest first
    ///
    /// An empty repository yields an empty history.
    pub async fn get_commit_history(
        &self,
        owner: &str,
        repo: &str,
        query: &CommitQuery,
    ) -> ClientResult<Vec<CommitInfo>> {
        let key = cache::repo_key(owner, repo, CacheCategory::Commits, Some(&query.fingerprint()));
        self.cached(&key, CacheCategory::Commits, move || async move {
            let result = self
                .call(
                    "get_commit_history",
                    &format!("repos/{}/{}/commits", owner, repo),
                    &query.to_query(),
                )
                .await;

            let body = match result {
                Ok(body) => body,
                Err(ClientError::Conflict(_)) => return Ok(Vec::new()),
                Err(e) => return Err(e),
            };
            let wire: Vec<WireCommit> = serde_json::from_value(body)?;
            Ok(wire.into_iter().map(CommitInfo::from).collect())
        })
        .await
    }

    /// Decoded content of a single file
    ///
    /// Paths that resolve to a directory are rejected.
    pub async fn get_file_content(&self, owner: &str, repo: &str, path: &str) -> ClientResult<String> {
        let path = path.trim_start_matches('/');
        if path.is_empty() {
            return Err(ClientError::Validation("file path must not be empty".to_string()));
        }

        let key = cache::repo_key(owner, repo, CacheCategory::Content, Some(path));
        self.cached(&key, CacheCategory::Content, move || async move {
            let body = self
                .call(
                    "get_file_content",
                    &format!("repos/{}/{}/contents/{}", owner, repo, path),
                    &[],
                )
                .await?;
            decode_file_content(path, body)
        })
        .await
    }

    /// Repository topics
    pub async fn get_topics(&self, owner: &str, repo: &str) -> ClientResult<Vec<String>> {
        let key = cache::repo_key(owner, repo, CacheCategory::Topics, None);
        self.cached(&key, CacheCategory::Topics, move || async move {
            let body = self
                .call("get_topics", &format!("repos/{}/{}/topics", owner, repo), &[])
                .await?;
            let wire: WireTopics = serde_json::from_value(body)?;
            Ok(wire.into_names())
        })
        .await
    }

    /// Bytes of code per language
    pub async fn get_languages(&self, owner: &str, repo: &str) -> ClientResult<LanguageBreakdown> {
        let key = cache::repo_key(owner, repo, CacheCategory::Languages, None);
        self.cached(&key, CacheCategory::Languages, move || async move {
            let body = self
                .call("get_languages", &format!("repos/{}/{}/languages", owner, repo), &[])
                .await?;
            Ok(serde_json::from_value(body)?)
        })
        .await
    }

    /// Public repositories owned by `login`, one page at a time
    pub async fn list_user_repositories(
        &self,
        login: &str,
        page: u32,
    ) -> ClientResult<Vec<RepoMetadata>> {
        let page = page.max(1).to_string();
        let key = cache::user_key(login, CacheCategory::UserRepos, Some(&page));
        self.cached(&key, CacheCategory::UserRepos, move || async move {
            let body = self
                .call(
                    "list_user_repositories",
                    &format!("users/{}/repos", login),
                    &[
                        ("per_page".to_string(), "100".to_string()),
                        ("page".to_string(), page.clone()),
                        ("sort".to_string(), "updated".to_string()),
                    ],
                )
                .await?;
            let wire: Vec<WireRepository> = serde_json::from_value(body)?;
            Ok(wire.into_iter().map(RepoMetadata::from).collect())
        })
        .await
    }

    /// Current quota, straight from the API
    pub async fn get_rate_limit_status(&self) -> ClientResult<RateLimitStatus> {
        let status = self.transport.rate_limit().await?;
        self.note_quota(&status);
        Ok(status)
    }

    // ==================== Invalidation ====================

    /// Drop every cached entry for a repository
    pub async fn invalidate(&self, owner: &str, repo: &str) -> usize {
        self.invalidate_prefix(&cache::repo_prefix(owner, repo)).await
    }

    /// Drop every cached entry for a user
    pub async fn invalidate_user(&self, login: &str) -> usize {
        self.invalidate_prefix(&cache::user_prefix(login)).await
    }

    async fn invalidate_prefix(&self, prefix: &str) -> usize {
        match self.cache.invalidate_prefix(prefix).await {
            Ok(removed) => {
                tracing::debug!(prefix, removed, "Invalidated cache entries");
                removed
            }
            Err(e) => {
                tracing::warn!(prefix, error = %e, "Cache invalidation failed");
                0
            }
        }
    }

    // ==================== Internals ====================

    /// Cache-aside read: return the cached value or compute, store and return it
    async fn cached<T, F, Fut>(&self, key: &str, category: CacheCategory, fetch: F) -> ClientResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => {
                    tracing::debug!(key, "Cache hit");
                    return Ok(value);
                }
                Err(e) => tracing::debug!(key, error = %e, "Discarding undecodable cache entry"),
            },
            Ok(None) => tracing::debug!(key, "Cache miss"),
            Err(e) => tracing::warn!(key, error = %e, "Cache read failed"),
        }

        let value = fetch().await?;

        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(e) = self.cache.set(key, raw, self.ttls.ttl(category)).await {
                    tracing::warn!(key, error = %e, "Cache write failed");
                }
            }
            Err(e) => tracing::warn!(key, error = %e, "Failed to serialize value for cache"),
        }

        Ok(value)
    }

    /// Quota-checked, retried network call
    async fn call(
        &self,
        label: &str,
        path: &str,
        query: &[(String, String)],
    ) -> ClientResult<serde_json::Value> {
        let this = self;
        retry_with_backoff(&self.retry, label, move || async move {
            this.check_quota().await?;
            this.transport.get(path, query).await
        })
        .await
    }

    /// Fail fast when no quota is left
    async fn check_quota(&self) -> ClientResult<()> {
        match self.transport.rate_limit().await {
            Ok(status) => {
                self.note_quota(&status);
                if status.is_exhausted() {
                    tracing::warn!(reset_at = %status.reset_at, "Rate limit exhausted, skipping request");
                    return Err(ClientError::RateLimited {
                        reset_at: status.reset_at,
                    });
                }
                Ok(())
            }
            Err(err @ ClientError::RateLimited { .. }) => Err(err),
            Err(err) => {
                tracing::warn!(error = %err, "Quota check failed, proceeding with request");
                Ok(())
            }
        }
    }

    /// Warn once when quota falls below the low-water mark
    ///
    /// Re-arms after the quota recovers. Returns whether a warning was emitted.
    fn note_quota(&self, status: &RateLimitStatus) -> bool {
        if status.remaining >= self.low_quota_threshold {
            self.low_quota_warned.store(false, Ordering::Relaxed);
            return false;
        }
        if self.low_quota_warned.swap(true, Ordering::Relaxed) {
            return false;
        }

        tracing::warn!(
            remaining = status.remaining,
            limit = status.limit,
            reset_at = %status.reset_at,
            "API quota running low"
        );
        true
    }
}

#[derive(Debug, Deserialize)]
struct WireContent {
    #[serde(rename = "type")]
    kind: String,
    encoding: Option<String>,
    content: Option<String>,
}

fn decode_file_content(path: &str, body: serde_json::Value) -> ClientResult<String> {
    if body.is_array() {
        return Err(ClientError::Validation(format!(
            "'{}' is a directory, not a file",
            path
        )));
    }

    let wire: WireContent = serde_json::from_value(body)?;
    if wire.kind != "file" {
        return Err(ClientError::Validation(format!(
            "'{}' is a {}, not a file",
            path, wire.kind
        )));
    }

    let content = wire.content.unwrap_or_default();
    match wire.encoding.as_deref() {
        Some("base64") => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(compact.as_bytes())
                .map_err(|e| ClientError::Decode(format!("invalid base64 in '{}': {}", path, e)))?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        _ => Ok(content),
    }
}
