//! Exponential backoff for retryable client errors

use super::error::ClientResult;
use std::future::Future;
use std::time::Duration;

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `attempt` (0-based): `base * 2^attempt`, capped
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `operation` until it succeeds, fails with a non-retryable error, or retries run out
pub async fn retry_with_backoff<F, Fut, T>(
    policy: &RetryPolicy,
    label: &str,
    mut operation: F,
) -> ClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<T>>,
{
    let mut attempt = 0;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !error.is_retryable() || attempt >= policy.max_retries {
                    return Err(error);
                }

                let delay = policy.delay_for(attempt);
                tracing::warn!(
                    operation = label,
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying upstream call"
                );

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
