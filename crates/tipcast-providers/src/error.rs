//! HTTP-level error types.

use thiserror::Error;

use tipcast_core::error::EngineError;

/// Errors that can occur while talking to a provider over HTTP.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Connection refused, DNS failure, reset, etc.
    #[error("HTTP transport error: {0}")]
    Transport(String),

    /// Request timed out after the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Non-success status code.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Response body did not match the expected shape.
    #[error("Deserialization error: {0}")]
    Decode(String),

    /// The API answered but reported an error in its payload.
    #[error("API error: {0}")]
    Api(String),
}

impl HttpError {
    /// Returns `true` for transient failures worth retrying:
    /// transport errors, timeouts, 429 and 5xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) | Self::Timeout { .. } => true,
            Self::Status { status, .. } => *status == 429 || *status >= 500,
            Self::Decode(_) | Self::Api(_) => false,
        }
    }

    /// Attach the provider name.
    pub fn into_engine(self, provider: &str) -> EngineError {
        EngineError::provider(provider, self)
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(e: serde_json::Error) -> Self {
        Self::Decode(e.to_string())
    }
}
