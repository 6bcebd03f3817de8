//! Error types for postgate-rv

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Main error type for the review service
#[derive(Error, Debug)]
pub enum Error {
    /// Database connection or query errors
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Errors bubbled up from the shared library
    #[error(transparent)]
    Common(#[from] postgate_common::Error),

    /// Invalid content rejected at submission, before any row is written
    #[error("Submission rejected: {0}")]
    Submission(String),

    /// Transient failure delivering to the reviewer surface; retried on the
    /// next poll tick, never recorded on the draft's status
    #[error("Surface delivery failed: {0}")]
    SurfaceDelivery(String),

    /// A decision arrived for a draft that is no longer pending
    #[error("Draft {draft_id} is no longer pending{}", decided_by.as_deref().map(|a| format!(" (decided by {})", a)).unwrap_or_default())]
    StaleDecision {
        draft_id: Uuid,
        decided_by: Option<String>,
    },

    /// Operation invoked against the wrong draft state
    #[error("Draft {draft_id} is {actual}, expected {expected}")]
    InvalidState {
        draft_id: Uuid,
        expected: &'static str,
        actual: String,
    },

    /// Retry refused: the configured attempt ceiling has been reached
    #[error("Draft {draft_id} has exhausted its {retry_count} publish attempts")]
    RetryExhausted { draft_id: Uuid, retry_count: i64 },

    /// Retry refused: the last failure was permanent and needs human
    /// remediation before a fresh publish attempt
    #[error("Draft {draft_id} failed permanently and is not retry-eligible")]
    RetryNotEligible { draft_id: Uuid },

    /// Requested resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience Result type using the postgate-rv Error
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Submission(_) => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::StaleDecision { .. }
            | Error::InvalidState { .. }
            | Error::RetryExhausted { .. }
            | Error::RetryNotEligible { .. } => StatusCode::CONFLICT,
            Error::Database(_)
            | Error::Common(_)
            | Error::SurfaceDelivery(_)
            | Error::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
