//! Cache entries persisted alongside the analyses

use super::{format_ts, Database, StoreError};
use crate::cache::CacheStore;
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, OptionalExtension};
use std::time::Duration;

#[async_trait]
impl CacheStore for Database {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let key = key.to_string();
        self.interact(move |conn| {
            let value = conn
                .query_row(
                    "SELECT value FROM cache_entries WHERE key = ?1 AND expires_at > ?2",
                    params![key, format_ts(&Utc::now())],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), StoreError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Invalid(format!("ttl out of range: {}", e)))?;
        let key = key.to_string();
        self.interact(move |conn| {
            conn.execute(
                r#"
                INSERT INTO cache_entries (key, value, expires_at)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(key) DO UPDATE SET
                    value = excluded.value,
                    expires_at = excluded.expires_at
                "#,
                params![key, value, format_ts(&(Utc::now() + ttl))],
            )?;
            Ok(())
        })
        .await
    }

    async fn invalidate_prefix(&self, prefix: &str) -> Result<usize, StoreError> {
        let prefix = prefix.to_string();
        self.interact(move |conn| {
            // substr avoids LIKE wildcards in owner/repo names
            let removed = conn.execute(
                "DELETE FROM cache_entries WHERE substr(key, 1, length(?1)) = ?1",
                params![prefix],
            )?;
            Ok(removed)
        })
        .await
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        self.interact(|conn| {
            let removed = conn.execute(
                "DELETE FROM cache_entries WHERE expires_at <= ?1",
                params![format_ts(&Utc::now())],
            )?;
            Ok(removed)
        })
        .await
    }
}
