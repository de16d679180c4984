use garde::Validate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::job::{JobResult, JobStatus, VideoJob};

/// Request body for `POST /api/process-video`.
#[derive(Debug, Deserialize, Validate)]
pub struct ProcessVideoRequest {
    #[garde(length(min = 1, max = 2048), url, custom(http_scheme))]
    pub url: String,
}

fn http_scheme(value: &str, _ctx: &()) -> garde::Result {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(garde::Error::new("url must use http or https"))
    }
}

/// Response after submitting a video.
#[derive(Debug, Serialize, Deserialize)]
pub struct ProcessVideoResponse {
    pub task_id: Uuid,
}

/// Response for `GET /api/task-status/{task_id}`.
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct TaskStatusResponse {
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&VideoJob> for TaskStatusResponse {
    fn from(job: &VideoJob) -> Self {
        match job.status {
            JobStatus::Queued | JobStatus::Running => Self {
                status: "processing".to_string(),
                result: None,
                error: None,
            },
            JobStatus::Succeeded => Self {
                status: "completed".to_string(),
                result: job.result.clone(),
                error: None,
            },
            JobStatus::Failed => Self {
                status: "failed".to_string(),
                result: None,
                error: Some(
                    job.error
                        .clone()
                        .unwrap_or_else(|| "job failed".to_string()),
                ),
            },
        }
    }
}

/// Query string for `GET /api/download-video`.
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    pub task_id: Option<String>,
}
