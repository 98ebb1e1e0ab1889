//! Source error types
//!
//! Errors raised while talking to the backend, either on the bulk query
//! path or while establishing the change subscription.

use thiserror::Error;

/// Transport-level failures of a [`ReadingSource`](super::ReadingSource)
#[derive(Error, Debug)]
pub enum SourceError {
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,

    /// Backend could not be reached
    #[error("Backend unavailable")]
    Unavailable,

    /// Any other HTTP client failure
    #[error("HTTP request failed: {0}")]
    Request(reqwest::Error),

    /// Backend answered with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body was not the expected shape
    #[error("Malformed response: {0}")]
    Malformed(String),

    /// Change subscription could not be established or broke down
    #[error("Subscription failed: {0}")]
    Subscribe(String),
}

impl SourceError {
    /// Classify a reqwest failure the same way for every call site
    pub(crate) fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else if err.is_connect() {
            SourceError::Unavailable
        } else if err.is_decode() {
            SourceError::Malformed(err.to_string())
        } else {
            SourceError::Request(err)
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SourceError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        SourceError::Subscribe(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Malformed(err.to_string())
    }
}

/// Result type alias for source operations
pub type SourceResult<T> = Result<T, SourceError>;
