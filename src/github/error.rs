//! Error taxonomy for the hosting API client

use chrono::{DateTime, Utc};

/// Errors surfaced by [`RepoClient`](super::RepoClient) and its transports
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// The request or its response was not acceptable (bad path, directory instead of file, ...)
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The resource exists but is in a state that cannot serve the request (e.g. an empty repository)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Quota exhausted; the caller should defer until `reset_at`
    #[error("Rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: DateTime<Utc> },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {seconds}s")]
    Timeout { seconds: u64 },

    #[error("Server error {status}: {message}")]
    Server { status: u16, message: String },

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ClientError {
    /// Whether the failed call may succeed if attempted again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::Network(_) | ClientError::Timeout { .. } | ClientError::Server { .. }
        )
    }

    /// Whether the error means the requested resource does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::NotFound(_))
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Decode(err.to_string())
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
