//! Submission and status lookups. The API never runs stage work itself.

use std::sync::Arc;
use uuid::Uuid;

use crate::models::job::{JobStatus, VideoJob};
use crate::services::queue::{JobQueue, QueueError, QueuedJob};
use crate::services::store::{JobStore, StoreError};

#[derive(Clone)]
pub struct JobService {
    store: Arc<dyn JobStore>,
    queue: Arc<dyn JobQueue>,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>, queue: Arc<dyn JobQueue>) -> Self {
        Self { store, queue }
    }

    /// Record a new `Queued` job and hand it to the queue. Returns as soon as
    /// the job is enqueued.
    pub async fn submit(&self, url: &str) -> Result<Uuid, JobError> {
        let job = VideoJob::new(url);
        self.store.insert(&job).await?;

        let queued = QueuedJob {
            job_id: job.id,
            source_url: job.source_url.clone(),
        };
        if let Err(e) = self.queue.enqueue(&queued).await {
            tracing::error!(job_id = %job.id, error = %e, "Failed to enqueue job");
            if let Err(discard_err) = self.store.discard(job.id).await {
                tracing::warn!(job_id = %job.id, error = %discard_err, "Failed to discard unqueued job");
            }
            return Err(e.into());
        }

        metrics::counter!("video_jobs_submitted_total").increment(1);
        tracing::info!(job_id = %job.id, url = %url, "Job submitted");
        Ok(job.id)
    }

    pub async fn status(&self, id: Uuid) -> Result<VideoJob, JobError> {
        self.store.get(id).await?.ok_or(JobError::NotFound(id))
    }

    /// Job whose artifact a download request refers to: the given job, or
    /// the latest successful one.
    pub async fn artifact_job(&self, id: Option<Uuid>) -> Result<VideoJob, JobError> {
        let job = match id {
            Some(id) => self.status(id).await?,
            None => self
                .store
                .latest_succeeded()
                .await?
                .ok_or(JobError::NoArtifact)?,
        };
        if job.status != JobStatus::Succeeded {
            return Err(JobError::NoArtifact);
        }
        Ok(job)
    }

    pub async fn queue_depth(&self) -> Result<u64, JobError> {
        let depth = self.queue.depth().await?;
        metrics::gauge!("video_queue_depth").set(depth as f64);
        Ok(depth)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Job {0} not found")]
    NotFound(Uuid),

    #[error("No finished video available")]
    NoArtifact,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Queue(#[from] QueueError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::job::{JobOutcome, JobResult};
    use crate::services::queue::MemoryJobQueue;
    use crate::services::store::MemoryJobStore;
    use async_trait::async_trait;

    fn service() -> (JobService, Arc<MemoryJobStore>, Arc<MemoryJobQueue>) {
        let store = Arc::new(MemoryJobStore::new());
        let queue = Arc::new(MemoryJobQueue::new());
        (JobService::new(store.clone(), queue.clone()), store, queue)
    }

    #[tokio::test]
    async fn test_submit_returns_queued_job() {
        let (svc, _, queue) = service();
        let id = svc.submit("https://youtube.com/shorts/abc").await.unwrap();

        let job = svc.status(id).await.unwrap();
        assert!(matches!(job.status, JobStatus::Queued | JobStatus::Running));
        assert_eq!(job.source_url, "https://youtube.com/shorts/abc");

        let queued = queue.dequeue("w").await.unwrap().unwrap();
        assert_eq!(queued.job_id, id);
    }

    #[tokio::test]
    async fn test_each_submission_gets_a_fresh_id() {
        let (svc, _, _) = service();
        let a = svc.submit("https://youtu.be/a").await.unwrap();
        let b = svc.submit("https://youtu.be/a").await.unwrap();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn test_unknown_job_not_found() {
        let (svc, _, _) = service();
        let id = Uuid::new_v4();
        assert!(matches!(svc.status(id).await, Err(JobError::NotFound(x)) if x == id));
    }

    struct BrokenQueue;

    #[async_trait]
    impl JobQueue for BrokenQueue {
        async fn enqueue(&self, _job: &QueuedJob) -> Result<(), QueueError> {
            Err(QueueError::Redis(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "connection refused",
            ))))
        }
        async fn dequeue(&self, _c: &str) -> Result<Option<QueuedJob>, QueueError> {
            Ok(None)
        }
        async fn complete(&self, _c: &str, _j: &QueuedJob) -> Result<(), QueueError> {
            Ok(())
        }
        async fn recover(&self, _c: &str) -> Result<usize, QueueError> {
            Ok(0)
        }
        async fn depth(&self) -> Result<u64, QueueError> {
            Ok(0)
        }
        async fn health_check(&self) -> Result<(), QueueError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_enqueue_failure_leaves_no_orphan() {
        let store = Arc::new(MemoryJobStore::new());
        let svc = JobService::new(store.clone(), Arc::new(BrokenQueue));
        assert!(matches!(
            svc.submit("https://youtu.be/a").await,
            Err(JobError::Queue(_))
        ));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_artifact_job_requires_success() {
        let (svc, store, _) = service();
        let id = svc.submit("https://youtu.be/a").await.unwrap();
        assert!(matches!(
            svc.artifact_job(Some(id)).await,
            Err(JobError::NoArtifact)
        ));
        assert!(matches!(svc.artifact_job(None).await, Err(JobError::NoArtifact)));

        let owner = Uuid::new_v4();
        store
            .claim(id, owner, std::time::Duration::from_secs(60))
            .await
            .unwrap();
        store
            .finish(
                id,
                owner,
                &JobOutcome::Succeeded(JobResult {
                    video_path: "videos/a.mp4".to_string(),
                    caption: "c".to_string(),
                }),
            )
            .await
            .unwrap();

        assert_eq!(svc.artifact_job(Some(id)).await.unwrap().id, id);
        assert_eq!(svc.artifact_job(None).await.unwrap().id, id);
    }
}
