//! In-process cache backend using moka

use super::{CacheEntry, CacheStore};
use crate::storage::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use moka::future::Cache;
use moka::notification::RemovalCause;
use moka::Expiry;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default upper bound on stored entries
pub const DEFAULT_MAX_ENTRIES: u64 = 10_000;

/// Per-entry lifetime read from the entry's own expiry time
struct EntryExpiry;

impl EntryExpiry {
    fn remaining(entry: &CacheEntry) -> Duration {
        (entry.expires_at - Utc::now())
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

impl Expiry<String, CacheEntry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &CacheEntry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(Self::remaining(value))
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &CacheEntry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        Some(Self::remaining(value))
    }
}

/// Cache held in memory for the lifetime of the process
pub struct MemoryCache {
    cache: Cache<String, CacheEntry>,
    expired: Arc<AtomicUsize>,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cache holding at most `max_entries`; least recently used entries are evicted first
    pub fn with_capacity(max_entries: u64) -> Self {
        let expired = Arc::new(AtomicUsize::new(0));
        let counter = expired.clone();

        let cache = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryExpiry)
            .eviction_listener(move |_key, _value, cause| {
                if cause == RemovalCause::Expired {
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            })
            .build();

        Self { cache, expired }
    }

    /// Number of live entries
    pub async fn len(&self) -> usize {
        self.cache.run_pending_tasks().await;
        let now = Utc::now();
        self.cache
            .iter()
            .filter(|(_, entry)| !entry.is_expired(now))
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.cache.get(key).await.map(|entry| entry.value))
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Invalid(format!("ttl out of range: {}", e)))?;
        let entry = CacheEntry {
            key: key.to_string(),
            value,
            expires_at: Utc::now() + ttl,
        };
        self.cache.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn invalidate_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let keys: Vec<Arc<String>> = self
            .cache
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key)
            .collect();

        for key in &keys {
            self.cache.invalidate(key.as_str()).await;
        }
        Ok(keys.len())
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let before = self.expired.load(Ordering::Relaxed);
        self.cache.run_pending_tasks().await;
        Ok(self.expired.load(Ordering::Relaxed).saturating_sub(before))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_and_expiry() {
        let cache = MemoryCache::new();
        cache
            .set("gh:a/b:meta", "{}".into(), Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(cache.get("gh:a/b:meta").await.unwrap().as_deref(), Some("{}"));

        cache
            .set("gh:a/b:tree:main", "[]".into(), Duration::ZERO)
            .await
            .unwrap();
        assert!(cache.get("gh:a/b:tree:main").await.unwrap().is_none());
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_entries_keep_their_own_ttl() {
        let cache = MemoryCache::new();
        cache
            .set("short", "1".into(), Duration::from_millis(50))
            .await
            .unwrap();
        cache
            .set("long", "2".into(), Duration::from_secs(60))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(cache.get("short").await.unwrap().is_none());
        assert_eq!(cache.get("long").await.unwrap().as_deref(), Some("2"));

        // Overwriting restarts the clock with the new ttl
        cache
            .set("long", "3".into(), Duration::ZERO)
            .await
            .unwrap();
        assert!(cache.get("long").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_prefix_invalidation() {
        let cache = MemoryCache::new();
        let ttl = Duration::from_secs(60);
        cache.set("gh:a/b:meta", "1".into(), ttl).await.unwrap();
        cache.set("gh:a/b:tree:main", "2".into(), ttl).await.unwrap();
        cache.set("gh:a/bc:meta", "3".into(), ttl).await.unwrap();

        let removed = cache.invalidate_prefix("gh:a/b:").await.unwrap();
        assert_eq!(removed, 2);
        assert!(cache.get("gh:a/b:meta").await.unwrap().is_none());
        assert_eq!(cache.get("gh:a/bc:meta").await.unwrap().as_deref(), Some("3"));
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let cache = MemoryCache::new();
        cache
            .set("old", "x".into(), Duration::from_millis(10))
            .await
            .unwrap();
        cache
            .set("new", "y".into(), Duration::from_secs(60))
            .await
            .unwrap();

        // Expired entries are reclaimed on timer ticks, roughly once a second
        tokio::time::sleep(Duration::from_millis(1300)).await;
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert!(cache.get("old").await.unwrap().is_none());
        assert_eq!(cache.len().await, 1);
        assert!(!cache.is_empty().await);
    }
}
