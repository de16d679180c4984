use axum::body::Body;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Json;
use garde::Validate;
use tokio_util::io::ReaderStream;
use uuid::Uuid;

use crate::app_state::AppState;
use crate::models::api::{DownloadQuery, ProcessVideoRequest, ProcessVideoResponse, TaskStatusResponse};
use crate::routes::error::ApiError;
use crate::services::storage::Artifact;

const DOWNLOAD_FILENAME: &str = "viral_clip.mp4";

/// POST /api/process-video: queue a video for processing.
pub async fn process_video(
    State(state): State<AppState>,
    payload: Result<Json<ProcessVideoRequest>, JsonRejection>,
) -> Result<Json<ProcessVideoResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::Validation(e.body_text()))?;
    request
        .validate()
        .map_err(|report| ApiError::Validation(report.to_string()))?;

    let task_id = state.jobs.submit(&request.url).await?;
    Ok(Json(ProcessVideoResponse { task_id }))
}

/// GET /api/task-status/{task_id}
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    // an unparseable ID can't name a job, so it is just another unknown task
    let id = parse_task_id(&task_id)?;
    let job = state.jobs.status(id).await?;
    Ok(Json(TaskStatusResponse::from(&job)))
}

/// GET /api/download-video?task_id=...: stream a finished clip. Without a
/// task ID the most recently finished clip is served.
pub async fn download_video(
    State(state): State<AppState>,
    Query(query): Query<DownloadQuery>,
) -> Result<Response, ApiError> {
    let id = query.task_id.as_deref().map(parse_task_id).transpose()?;
    let job = state.jobs.artifact_job(id).await?;

    let body = match state.artifacts.open(job.id).await? {
        Some(Artifact::File(file)) => Body::from_stream(ReaderStream::new(file)),
        Some(Artifact::Bytes(bytes)) => Body::from(bytes),
        None => {
            tracing::warn!(job_id = %job.id, "Succeeded job has no stored clip");
            return Err(ApiError::NotFound("Video not found".to_string()));
        }
    };

    Ok((
        [
            (header::CONTENT_TYPE, "video/mp4".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", DOWNLOAD_FILENAME),
            ),
        ],
        body,
    )
        .into_response())
}

fn parse_task_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::NotFound(format!("Task {} not found", raw)))
}
