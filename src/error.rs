use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::dao::storage::StorageError;

/// Errors that can occur in service layer operations.
///
/// The display text of every variant is safe to forward to clients as an `error` event.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Profile store backend is unavailable.
    #[error("profile service unavailable")]
    Unavailable(#[source] StorageError),
    /// No profile store is installed.
    #[error("profile service unavailable (degraded mode)")]
    Degraded,
    /// Skill group lookup failed; the matchmaking request is dropped.
    #[error("could not resolve your skill group for `{category}`")]
    GroupLookup {
        category: String,
        #[source]
        source: StorageError,
    },
    /// A settlement step could not be persisted.
    #[error("failed to {step}")]
    Persistence {
        step: &'static str,
        #[source]
        source: StorageError,
    },
    /// Invalid input provided by the client.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("{0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("{0}")]
    NotFound(String),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest(format!("validation failed: {}", err))
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
        };

        let payload = Json(ErrorBody {
            message: self.to_string(),
        });

        (status, payload).into_response()
    }
}
