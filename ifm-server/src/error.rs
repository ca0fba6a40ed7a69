//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are automatically converted
//! to a JSON-body HTTP response with an appropriate status code.
//!
//! Internal errors are logged with full detail but only a generic message
//! is returned, so file paths and SQL never reach clients.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ifm_core::WorkflowError;
use ifm_types::SchemaError;
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// All errors that can occur in the ifm-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the inference runtime.
    #[error("workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    /// Propagated from the analysis store.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The request body failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] validator::ValidationErrors),

    /// An entry document was rejected by the schema layer.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),

    /// The caller referenced a resource that does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An unclassified internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Validation(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.to_string()),
            ServerError::Schema(e @ SchemaError::UnsafeFileName { .. }) => {
                (StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
            }
            ServerError::Schema(e) => (StatusCode::NOT_FOUND, e.to_string()),

            ServerError::Workflow(e) => match e {
                WorkflowError::RunNotFound { .. } | WorkflowError::UploadNotFound { .. } => {
                    (StatusCode::NOT_FOUND, e.to_string())
                }
                WorkflowError::AccessDenied { .. } => (StatusCode::FORBIDDEN, e.to_string()),
                WorkflowError::WorkflowDispatch { .. } => {
                    error!(error = %e, "workflow dispatch error");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "inference runtime unavailable".to_owned(),
                    )
                }
                _ => {
                    error!(error = %e, "workflow error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "inference workflow error".to_owned(),
                    )
                }
            },
            ServerError::Database(e) => {
                error!(error = %e, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

impl From<anyhow::Error> for ServerError {
    fn from(e: anyhow::Error) -> Self {
        error!(error = ?e, "converting anyhow error to ServerError::Internal");
        ServerError::Internal(e.to_string())
    }
}

impl From<serde_json::Error> for ServerError {
    fn from(e: serde_json::Error) -> Self {
        ServerError::Internal(e.to_string())
    }
}
