//! HTTP error mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::ingestion::IngestionError;
use crate::parser::ParserError;

#[derive(Debug, Error)]
/// Errors surfaced by the HTTP gateway.
pub enum ApiError {
    /// Credentials rejected.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Malformed request.
    #[error("{0}")]
    Validation(String),

    /// Missing resource.
    #[error("{0}")]
    NotFound(String),

    /// Upload over the size cap.
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Everything else. The message is already user-safe; internals stay
    /// in the logs.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(_) => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Error body: the message only, never a stack trace.
#[derive(serde::Serialize)]
pub struct ErrorResponse {
    /// Human-readable message.
    pub error: String,
    /// HTTP status code, mirrored in the body.
    pub code: u16,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(ErrorResponse {
            error: self.to_string(),
            code: status.as_u16(),
        });
        (status, body).into_response()
    }
}

impl From<IngestionError> for ApiError {
    fn from(e: IngestionError) -> Self {
        match &e {
            IngestionError::Validation { .. }
            | IngestionError::CollectionModelMismatch { .. } => ApiError::Validation(e.to_string()),
            IngestionError::Parser(ParserError::FileTooLarge { .. }) => {
                ApiError::PayloadTooLarge(e.to_string())
            }
            IngestionError::Parser(_) => ApiError::Validation(e.to_string()),
            IngestionError::TaskNotFound { .. } | IngestionError::DocumentNotFound { .. } => {
                ApiError::NotFound(e.to_string())
            }
            _ => ApiError::Internal(e.to_string()),
        }
    }
}
