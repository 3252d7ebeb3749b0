//! Common error types for Stemshed

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use thiserror::Error;

/// Common result type for Stemshed operations
pub type Result<T> = std::result::Result<T, Error>;

/// Caller-facing error taxonomy.
///
/// Worker-side failures (separation crashes, degenerate stems) never surface
/// through this enum; they terminate the affected job and are reported in
/// its `error` field instead.
#[derive(Error, Debug)]
pub enum Error {
    /// Requested job or stem does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Operation attempted from a state that forbids it
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Malformed or missing upload
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Result requested before the job completed
    #[error("not ready: {0}")]
    NotReady(String),

    /// Internal server error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::InvalidState(_) | Error::NotReady(_) => StatusCode::CONFLICT,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        (
            self.status_code(),
            Json(serde_json::json!({ "error": self.to_string() })),
        )
            .into_response()
    }
}
