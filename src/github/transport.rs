//! Network transport for the hosting API

use super::error::{ClientError, ClientResult};
use super::types::{RateLimitStatus, WireRateLimit};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION};
use reqwest::StatusCode;
use std::time::Duration;

/// A single authenticated GET against the hosting API
#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `path` (relative to the API root) and return the decoded JSON body
    async fn get(&self, path: &str, query: &[(String, String)]) -> ClientResult<serde_json::Value>;

    /// Current quota for the authenticated identity
    async fn rate_limit(&self) -> ClientResult<RateLimitStatus>;
}

/// Transport configuration
#[derive(Debug, Clone)]
pub struct HttpTransportConfig {
    pub api_url: String,
    pub token: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com".to_string(),
            token: None,
            timeout: Duration::from_secs(10),
            user_agent: format!("{}/{}", crate::APP_NAME, crate::VERSION),
        }
    }
}

/// `reqwest`-backed transport
pub struct HttpTransport {
    config: HttpTransportConfig,
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: HttpTransportConfig) -> ClientResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| ClientError::Network(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.api_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn send(&self, path: &str, query: &[(String, String)]) -> ClientResult<serde_json::Value> {
        let mut request = self
            .client
            .get(self.url(path))
            .query(query)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");

        if let Some(ref token) = self.config.token {
            request = request.header(AUTHORIZATION, format!("Bearer {}", token));
        }

        let response = request.send().await.map_err(|e| self.map_send_error(e))?;
        let status = response.status();

        if !status.is_success() {
            let headers = response.headers().clone();
            let body = response.text().await.unwrap_or_default();
            return Err(map_status(status, &headers, path, &body));
        }

        response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    fn map_send_error(&self, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout {
                seconds: self.config.timeout.as_secs(),
            }
        } else {
            ClientError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, path: &str, query: &[(String, String)]) -> ClientResult<serde_json::Value> {
        self.send(path, query).await
    }

    async fn rate_limit(&self) -> ClientResult<RateLimitStatus> {
        let body = self.send("rate_limit", &[]).await?;
        let wire: WireRateLimit = serde_json::from_value(body)?;
        RateLimitStatus::try_from(wire)
    }
}

/// Map a non-success HTTP status onto the error taxonomy
fn map_status(status: StatusCode, headers: &HeaderMap, path: &str, body: &str) -> ClientError {
    let remaining = header_u64(headers, "x-ratelimit-remaining");

    match status {
        StatusCode::NOT_FOUND => ClientError::NotFound(path.to_string()),
        StatusCode::UNAUTHORIZED => ClientError::Unauthorized(truncate(body)),
        StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited {
            reset_at: reset_from_headers(headers),
        },
        StatusCode::FORBIDDEN if remaining == Some(0) => ClientError::RateLimited {
            reset_at: reset_from_headers(headers),
        },
        StatusCode::FORBIDDEN => ClientError::Unauthorized(truncate(body)),
        StatusCode::CONFLICT => ClientError::Conflict(format!("{}: {}", path, truncate(body))),
        s if s.is_server_error() => ClientError::Server {
            status: s.as_u16(),
            message: truncate(body),
        },
        s => ClientError::Validation(format!("unexpected status {} for {}", s, path)),
    }
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

fn reset_from_headers(headers: &HeaderMap) -> chrono::DateTime<Utc> {
    if let Some(reset) = header_u64(headers, "x-ratelimit-reset") {
        if let Some(at) = Utc.timestamp_opt(reset as i64, 0).single() {
            return at;
        }
    }
    let retry_after = header_u64(headers, "retry-after").unwrap_or(60);
    Utc::now() + ChronoDuration::seconds(retry_after as i64)
}

fn truncate(body: &str) -> String {
    body.chars().take(200).collect()
}
