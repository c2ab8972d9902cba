//! Error types for tirta-hi
//!
//! Every handler failure maps to a JSON body of the form
//! `{"error": {"code": ..., "message": ...}}` with a status code that
//! distinguishes caller mistakes (4xx) from upstream and local failures
//! (5xx). Training timeouts and remote training errors get their own
//! gateway statuses so clients can offer a retry.

use crate::services::RetrainError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Conflict (409), e.g. duplicate upload or retrain already running
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upload exceeds the size cap (413)
    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    /// Training call exceeded its budget (504)
    #[error("Training timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Training service failed or returned garbage (502)
    #[error("Training service error: {0}")]
    BadGateway(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error(transparent)]
    Other(#[from] anyhow::Error),

    /// tirta-common error
    #[error("Common error: {0}")]
    Common(#[from] tirta_common::Error),
}

impl From<RetrainError> for ApiError {
    fn from(e: RetrainError) -> Self {
        match e {
            RetrainError::NotFound(id) => ApiError::NotFound(format!("Upload {}", id)),
            RetrainError::AlreadyRunning(id) => {
                ApiError::Conflict(format!("Retrain already in progress for upload {}", id))
            }
            RetrainError::MissingArtifact(name) => {
                ApiError::Internal(format!("Stored upload file missing: {}", name))
            }
            RetrainError::InvalidStoredData(detail) => {
                ApiError::Internal(format!("Stored upload failed re-validation: {}", detail))
            }
            RetrainError::Timeout { seconds } => ApiError::Timeout { seconds },
            RetrainError::RemoteTrainingFailed { status, detail } => match status {
                Some(code) => ApiError::BadGateway(format!("status {}: {}", code, detail)),
                None => ApiError::BadGateway(detail),
            },
            RetrainError::Database(e) => ApiError::Internal(format!("Database error: {}", e)),
            RetrainError::Internal(detail) => ApiError::Internal(detail),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::PayloadTooLarge(msg) => {
                (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", msg)
            }
            ApiError::Timeout { seconds } => (
                StatusCode::GATEWAY_TIMEOUT,
                "TRAINING_TIMEOUT",
                format!("Training timed out after {}s", seconds),
            ),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "TRAINING_FAILED", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Io(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "IO_ERROR",
                err.to_string(),
            ),
            ApiError::Other(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                err.to_string(),
            ),
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
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
