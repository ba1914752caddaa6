//! Error types for sttag-cover
//!
//! [`TaggerError`] is the batch engine's taxonomy. Only `Precondition`, `Busy`
//! and `Cancelled` ever escape a run; every other variant describes a single
//! item's failure and ends up in the run's failure records.
//!
//! [`ApiError`] maps those errors onto HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::models::RunOutcome;
use crate::services::asset_fetch::FetchError;
use crate::services::jikan_client::LookupError;
use crate::services::media_file::MediaError;

/// Batch engine and façade errors
#[derive(Debug, Error)]
pub enum TaggerError {
    /// Required input location missing; raised before any task starts
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// Another run is active on this processor
    #[error("A run is already in progress")]
    Busy,

    /// Run stopped early; carries the counters and failures gathered so far
    #[error("Run cancelled after {}/{} items", .0.counters.completed, .0.counters.total)]
    Cancelled(Box<RunOutcome>),

    /// No candidate title matched the album exactly or by prefix
    #[error("No match found for '{0}'")]
    NoMatchFound(String),

    /// Metadata search failure
    #[error("Lookup failed: {0}")]
    Lookup(#[from] LookupError),

    /// Cover image download failure
    #[error("Download failed: {0}")]
    Fetch(#[from] FetchError),

    /// Audio tag read/write failure
    #[error("Media error: {0}")]
    Media(#[from] MediaError),

    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for the batch engine
pub type TaggerResult<T> = Result<T, TaggerError>;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409) - a run is already active
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<TaggerError> for ApiError {
    fn from(err: TaggerError) -> Self {
        match err {
            TaggerError::Precondition(msg) => ApiError::BadRequest(msg),
            TaggerError::Busy => ApiError::Conflict(err.to_string()),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                msg,
            ),
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
