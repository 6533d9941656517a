//! Client for the repository hosting API
//!
//! Layers, from the wire up:
//! - [`Transport`]: one authenticated GET, status codes mapped onto [`ClientError`]
//! - [`retry_with_backoff`]: exponential backoff for transient failures
//! - [`RepoClient`]: cache-aside reads, quota pre-checks and branch fallback

mod client;
mod error;
mod retry;
mod transport;
mod types;

pub use client::{RepoClient, DEFAULT_BRANCH, DEFAULT_LOW_QUOTA_THRESHOLD, FALLBACK_BRANCH};
pub use error::{ClientError, ClientResult};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use transport::{HttpTransport, HttpTransportConfig, Transport};
pub use types::{
    CommitInfo, CommitQuery, EntryKind, LanguageBreakdown, RateLimitStatus, RepoMetadata,
    RepoTree, RepositoryRef, TreeEntry,
};

use std::sync::Arc;
use tokio::sync::OnceCell;

static SHARED_CLIENT: OnceCell<Arc<RepoClient>> = OnceCell::const_new();

/// Process-wide client, built on first use
///
/// `init` only runs for the first caller; later callers get the same instance
/// regardless of the factory they pass.
pub async fn shared_client<F>(init: F) -> ClientResult<Arc<RepoClient>>
where
    F: FnOnce() -> ClientResult<RepoClient>,
{
    SHARED_CLIENT
        .get_or_try_init(|| async move { init().map(Arc::new) })
        .await
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::testing::FakeTransport;

    #[tokio::test]
    async fn test_shared_client_is_built_once() {
        let build = || {
            Ok(RepoClient::new(
                Arc::new(FakeTransport::new()),
                Arc::new(MemoryCache::new()),
            ))
        };

        let first = shared_client(build).await.unwrap();
        let second = shared_client(|| Err(ClientError::Validation("not called".into())))
            .await
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }
}
