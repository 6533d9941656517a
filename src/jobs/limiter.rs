//! Rate limit on job starts
//!
//! Allows a burst of `max_jobs` starts, then one start per `window / max_jobs`,
//! so no window of length `window` sees more than `max_jobs` starts.

use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Jitter, Quota, RateLimiter as GovRateLimiter};
use std::num::NonZeroU32;
use std::time::Duration;

/// Allows at most `max_jobs` job starts per `window`
///
/// A zero window disables the limit.
pub struct JobRateLimiter {
    limiter: Option<GovRateLimiter<NotKeyed, InMemoryState, DefaultClock>>,
    jitter: Jitter,
}

impl JobRateLimiter {
    pub fn new(max_jobs: u32, window: Duration) -> Self {
        let burst = NonZeroU32::new(max_jobs).unwrap_or(NonZeroU32::MIN);
        let limiter = Quota::with_period(window / burst.get())
            .map(|quota| GovRateLimiter::direct(quota.allow_burst(burst)));

        Self {
            limiter,
            jitter: Jitter::up_to(Duration::from_millis(10)),
        }
    }

    /// Record a start if one is allowed now
    pub fn try_acquire(&self) -> bool {
        match &self.limiter {
            Some(limiter) => limiter.check().is_ok(),
            None => true,
        }
    }

    /// Wait until a start is allowed and record it
    pub async fn acquire(&self) {
        let Some(limiter) = &self.limiter else {
            return;
        };
        if limiter.check().is_ok() {
            return;
        }
        tracing::debug!("Job rate limit reached, waiting");
        limiter.until_ready_with_jitter(self.jitter).await;
    }
}
