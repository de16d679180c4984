//! The three pipeline stages as swappable collaborators.
//!
//! Each stage is a single call into an external tool or service. Stages take
//! and return job-scoped paths chosen by the executor; none of them writes to
//! a fixed filename.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::models::job::Stage;
use crate::services::storage::StorageError;

/// Downloads the video at `url` into `target`.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &str, target: &Path) -> Result<PathBuf, FetchError>;
}

/// Reformats `source` for vertical viewing, writing `target`.
#[async_trait]
pub trait Transformer: Send + Sync {
    async fn transform(&self, source: &Path, target: &Path) -> Result<PathBuf, TransformError>;
}

/// Produces a social caption for the media at `media`.
#[async_trait]
pub trait Captioner: Send + Sync {
    async fn caption(&self, media: &Path) -> Result<String, CaptionError>;
}

/// One implementation of each stage.
#[derive(Clone)]
pub struct Stages {
    pub fetcher: Arc<dyn Fetcher>,
    pub transformer: Arc<dyn Transformer>,
    pub captioner: Arc<dyn Captioner>,
}

impl Stages {
    pub fn new(
        fetcher: impl Fetcher + 'static,
        transformer: impl Transformer + 'static,
        captioner: impl Captioner + 'static,
    ) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            transformer: Arc::new(transformer),
            captioner: Arc::new(captioner),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("yt-dlp not found in PATH")]
    ToolMissing,

    #[error("Failed to download video from {url}: {message}. Ensure the link is public.")]
    Download { url: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("ffmpeg not found in PATH")]
    ToolMissing,

    #[error("ffmpeg failed: {0}")]
    Ffmpeg(String),

    #[error("Source video not found: {0}")]
    MissingSource(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum CaptionError {
    #[error("Caption service is not configured: GROQ_API_KEY is not set")]
    MissingApiKey,

    #[error("Audio extraction failed: {0}")]
    Audio(String),

    #[error("Inference request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Inference service returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Inference service returned an empty caption")]
    Empty,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure of one job, attributed to the stage that produced it.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("transform failed: {0}")]
    Transform(#[from] TransformError),

    #[error("caption failed: {0}")]
    Caption(#[from] CaptionError),

    #[error("publishing the clip failed: {0}")]
    Publish(#[from] StorageError),

    #[error("{stage} timed out after {after:?}")]
    Timeout { stage: Stage, after: Duration },

    #[error("{stage} crashed: {message}")]
    Crashed { stage: Stage, message: String },

    #[error("could not prepare scratch space: {0}")]
    Workspace(std::io::Error),
}

impl StageError {
    /// The stage this failure is attributed to, if any.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            StageError::Fetch(_) => Some(Stage::Fetch),
            StageError::Transform(_) => Some(Stage::Transform),
            StageError::Caption(_) => Some(Stage::Caption),
            StageError::Publish(_) => Some(Stage::Publish),
            StageError::Timeout { stage, .. } | StageError::Crashed { stage, .. } => Some(*stage),
            StageError::Workspace(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_stage() {
        let err = StageError::from(FetchError::Download {
            url: "https://youtu.be/x".to_string(),
            message: "HTTP Error 404".to_string(),
        });
        assert_eq!(err.stage(), Some(Stage::Fetch));
        assert!(err.to_string().starts_with("fetch failed:"));
        assert!(err.to_string().contains("HTTP Error 404"));

        let err = StageError::from(CaptionError::MissingApiKey);
        assert_eq!(err.stage(), Some(Stage::Caption));
        assert!(err.to_string().contains("GROQ_API_KEY"));

        let err = StageError::Timeout {
            stage: Stage::Transform,
            after: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "transform timed out after 5s");
    }
}
