//! Error types for doubleplay-scanner
//!
//! Scan errors follow the failure taxonomy of the scan queue:
//! malformed jobs are programming errors, upstream failures feed the
//! retry/backoff policy, persistence failures are critical but non-fatal.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Upstream playlist API errors
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),
}

impl UpstreamError {
    /// Worth another attempt after backing off
    pub fn is_retriable(&self) -> bool {
        match self {
            UpstreamError::Network(_) | UpstreamError::Timeout | UpstreamError::RateLimited => true,
            UpstreamError::Api(status, _) => *status >= 500,
            UpstreamError::Parse(_) => false,
        }
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            UpstreamError::Timeout
        } else if err.is_decode() {
            UpstreamError::Parse(err.to_string())
        } else {
            UpstreamError::Network(err.to_string())
        }
    }
}

/// Errors raised while processing one scan chunk
#[derive(Debug, Error)]
pub enum ScanError {
    /// Job bounds missing or inverted; never retried
    #[error("Malformed scan job: {0}")]
    MalformedJob(String),

    /// Upstream fetch failed; handled by retry/backoff
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Dataset could not be validated or written
    #[error("Persistence error: {0}")]
    Persistence(doubleplay_common::Error),
}

/// Result type for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

/// API error type for the health surface
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
