//! Error types for exintel-server
//!
//! Every handler returns `ApiResult<T>`; the body is
//! `{"error": {"code", "message"}}` except for validation failures, which
//! carry the full list as `{"errors": [...]}`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::services::ai_client::AiError;
use crate::services::matrix_importer::ImportError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Structural validation failure with every problem found (400)
    #[error("Validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// Missing or wrong bearer secret (401)
    #[error("Unauthorized")]
    Unauthorized,

    /// Natural-key collision (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Upstream model call failed on a single-item request (502)
    #[error("External service error: {0}")]
    ExternalService(String),

    /// Feature needs configuration that is absent (503)
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// exintel-common error
    #[error("Common error: {0}")]
    Common(#[from] exintel_common::Error),
}

impl From<AiError> for ApiError {
    fn from(err: AiError) -> Self {
        ApiError::ExternalService(err.to_string())
    }
}

impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::Spreadsheet(e) => ApiError::Validation(vec![e.to_string()]),
            ImportError::NoRows(errors) => ApiError::Validation(errors),
            ImportError::Store(e) => ApiError::Common(e),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Validation(errors) => {
                return (StatusCode::BAD_REQUEST, Json(json!({ "errors": errors }))).into_response();
            }
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Unauthorized".to_string(),
            ),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::ExternalService(msg) => {
                (StatusCode::BAD_GATEWAY, "EXTERNAL_SERVICE_ERROR", msg)
            }
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
            ApiError::Database(ref err) => {
                if matches!(err, sqlx::Error::Database(db) if db.is_unique_violation()) {
                    (StatusCode::CONFLICT, "CONFLICT", err.to_string())
                } else {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "DATABASE_ERROR",
                        err.to_string(),
                    )
                }
            }
            ApiError::Common(err) => common_error_parts(err),
        };

        if status.is_server_error() {
            tracing::error!(code = error_code, "{}", message);
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

fn common_error_parts(err: exintel_common::Error) -> (StatusCode, &'static str, String) {
    use exintel_common::Error;

    if err.is_unique_violation() {
        return (StatusCode::CONFLICT, "CONFLICT", err.to_string());
    }

    match err {
        Error::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
        Error::InvalidInput(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
        Error::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
        other => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "COMMON_ERROR",
            other.to_string(),
        ),
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
