use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::services::jobs::JobError;
use crate::services::storage::StorageError;

/// Error returned by API handlers, rendered as `{"error": "..."}`.
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    NotFound(String),
    Unavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Validation(m) => (StatusCode::UNPROCESSABLE_ENTITY, m),
            ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<JobError> for ApiError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::NotFound(id) => ApiError::NotFound(format!("Task {} not found", id)),
            JobError::NoArtifact => ApiError::NotFound("Video not found".to_string()),
            JobError::Store(e) => {
                tracing::error!(error = %e, "Job store unavailable");
                ApiError::Unavailable("Job store unavailable".to_string())
            }
            JobError::Queue(e) => {
                tracing::error!(error = %e, "Job queue unavailable");
                ApiError::Unavailable("Job queue unavailable".to_string())
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        tracing::error!(error = %err, "Artifact storage unavailable");
        ApiError::Unavailable("Artifact storage unavailable".to_string())
    }
}
