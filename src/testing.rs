//! Test doubles shared by unit tests

use crate::github::{ClientError, ClientResult, RateLimitStatus, Transport};
use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

/// In-memory [`Transport`] with canned responses and call counting
///
/// Unknown paths answer `NotFound`. Queued failures for a path are served
/// before its canned response.
pub struct FakeTransport {
    responses: Mutex<HashMap<String, serde_json::Value>>,
    failures: Mutex<HashMap<String, (u32, ClientError)>>,
    calls: Mutex<HashMap<String, u32>>,
    remaining: Mutex<u32>,
    latency: Mutex<Duration>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(HashMap::new()),
            failures: Mutex::new(HashMap::new()),
            calls: Mutex::new(HashMap::new()),
            remaining: Mutex::new(5000),
            latency: Mutex::new(Duration::ZERO),
        }
    }

    pub fn respond(&self, path: &str, body: serde_json::Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(path.to_string(), body);
    }

    pub fn fail_times(&self, path: &str, times: u32, error: ClientError) {
        self.failures
            .lock()
            .unwrap()
            .insert(path.to_string(), (times, error));
    }

    pub fn set_remaining(&self, remaining: u32) {
        *self.remaining.lock().unwrap() = remaining;
    }

    /// Delay every `get` by `latency`
    pub fn set_latency(&self, latency: Duration) {
        *self.latency.lock().unwrap() = latency;
    }

    pub fn reset_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(1_893_456_000, 0).unwrap()
    }

    pub fn calls(&self, path: &str) -> u32 {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> u32 {
        self.calls.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn get(&self, path: &str, _query: &[(String, String)]) -> ClientResult<serde_json::Value> {
        *self.calls.lock().unwrap().entry(path.to_string()).or_insert(0) += 1;

        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some((remaining, error)) = failures.get_mut(path) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(error.clone());
                }
            }
        }

        self.responses
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(path.to_string()))
    }

    async fn rate_limit(&self) -> ClientResult<RateLimitStatus> {
        let remaining = *self.remaining.lock().unwrap();
        Ok(RateLimitStatus {
            limit: 5000,
            remaining,
            used: 5000 - remaining.min(5000),
            reset_at: self.reset_at(),
        })
    }
}
