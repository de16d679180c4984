//! Shared setup for API tests: an in-process app with stub pipeline stages.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

use viral_clip_engine::app_state::AppState;
use viral_clip_engine::routes;
use viral_clip_engine::services::executor::JobExecutor;
use viral_clip_engine::services::queue::MemoryJobQueue;
use viral_clip_engine::services::stages::{
    CaptionError, Captioner, FetchError, Fetcher, Stages, TransformError, Transformer,
};
use viral_clip_engine::services::storage::LocalArtifactStore;
use viral_clip_engine::services::store::MemoryJobStore;
use viral_clip_engine::services::worker::WorkerPool;

pub const CLIP_BYTES: &[u8] = b"\x00\x00\x00\x18ftypmp42 vertical clip";

/// Writes a placeholder download, or fails for URLs containing "broken".
pub struct StubFetcher;

#[async_trait]
impl Fetcher for StubFetcher {
    async fn fetch(&self, url: &str, target: &Path) -> Result<PathBuf, FetchError> {
        if url.contains("broken") {
            return Err(FetchError::Download {
                url: url.to_string(),
                message: "Video unavailable".to_string(),
            });
        }
        tokio::fs::write(target, b"source").await?;
        Ok(target.to_path_buf())
    }
}

pub struct StubTransformer;

#[async_trait]
impl Transformer for StubTransformer {
    async fn transform(&self, _source: &Path, target: &Path) -> Result<PathBuf, TransformError> {
        tokio::fs::write(target, CLIP_BYTES).await?;
        Ok(target.to_path_buf())
    }
}

pub struct StubCaptioner;

#[async_trait]
impl Captioner for StubCaptioner {
    async fn caption(&self, _media: &Path) -> Result<String, CaptionError> {
        Ok("POV: you found the best clip #fyp #viral #shorts #trending #reels".to_string())
    }
}

/// An app wired to in-memory backends. The workers only run once
/// [`TestApp::start_workers`] is called.
pub struct TestApp {
    pub state: AppState,
    pub router: axum::Router,
    pub store: Arc<MemoryJobStore>,
    pub queue: Arc<MemoryJobQueue>,
    artifacts_dir: TempDir,
    scratch_dir: TempDir,
}

impl TestApp {
    pub fn new() -> Self {
        let artifacts_dir = tempfile::tempdir().unwrap();
        let scratch_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(MemoryJobQueue::new());
        let state = AppState::new(
            store.clone(),
            queue.clone(),
            Arc::new(LocalArtifactStore::new(artifacts_dir.path())),
        );
        let router = routes::router(state.clone());

        Self {
            state,
            router,
            store,
            queue,
            artifacts_dir,
            scratch_dir,
        }
    }

    pub fn start_workers(&self, concurrency: usize) -> WorkerPool {
        let executor = JobExecutor::new(
            self.store.clone(),
            Stages::new(StubFetcher, StubTransformer, StubCaptioner),
            self.scratch_dir.path(),
        )
        .with_artifacts(self.state.artifacts.clone());

        WorkerPool::spawn(
            "test",
            concurrency,
            self.queue.clone(),
            Arc::new(executor),
            Duration::from_millis(10),
        )
    }

    pub fn scratch_is_empty(&self) -> bool {
        std::fs::read_dir(self.scratch_dir.path()).unwrap().next().is_none()
    }

    pub async fn get(&self, uri: &str) -> (StatusCode, axum::http::HeaderMap, Vec<u8>) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let headers = res.headers().clone();
        let body = res.into_body().collect().await.unwrap().to_bytes();
        (status, headers, body.to_vec())
    }

    pub async fn get_json(&self, uri: &str) -> (StatusCode, serde_json::Value) {
        let (status, _, body) = self.get(uri).await;
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    pub async fn post_raw(&self, uri: &str, body: String) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body))
            .unwrap();
        let res = self.router.clone().oneshot(req).await.unwrap();
        let status = res.status();
        let body = res.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null))
    }

    /// Submit `url` and return the task ID.
    pub async fn submit(&self, url: &str) -> String {
        let (status, body) = self
            .post_raw("/api/process-video", serde_json::json!({ "url": url }).to_string())
            .await;
        assert_eq!(status, StatusCode::OK, "submit failed: {}", body);
        body["task_id"].as_str().unwrap().to_string()
    }

    /// Poll task status until it leaves "processing".
    pub async fn wait_for_task(&self, task_id: &str) -> serde_json::Value {
        for _ in 0..500 {
            let (status, body) = self.get_json(&format!("/api/task-status/{}", task_id)).await;
            assert_eq!(status, StatusCode::OK);
            if body["status"] != "processing" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("task {} did not finish", task_id);
    }
}
