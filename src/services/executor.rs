//! Runs one job through Fetch -> Transform -> Caption and records the outcome.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::models::job::{JobOutcome, JobResult, JobStatus, Stage};
use crate::services::queue::QueuedJob;
use crate::services::stages::{StageError, Stages};
use crate::services::storage::ArtifactStore;
use crate::services::store::{JobStore, StoreError};

const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(600);
const DEFAULT_LEASE: Duration = Duration::from_secs(60);

/// What happened to one delivery of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    /// The pipeline ran and its outcome was recorded.
    Finished(JobStatus),
    /// The job was already terminal; nothing was run or written.
    Duplicate(JobStatus),
    /// Another attempt holds a live lease on the job; nothing was run.
    InFlight,
    /// The pipeline ran but the lease was taken over before the outcome
    /// could be recorded.
    Superseded,
    /// No such job in the store.
    Missing,
}

pub struct JobExecutor {
    store: Arc<dyn JobStore>,
    stages: Stages,
    artifacts: Option<Arc<dyn ArtifactStore>>,
    scratch_root: PathBuf,
    stage_timeout: Duration,
    lease: Duration,
}

impl JobExecutor {
    pub fn new(store: Arc<dyn JobStore>, stages: Stages, scratch_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            stages,
            artifacts: None,
            scratch_root: scratch_root.into(),
            stage_timeout: DEFAULT_STAGE_TIMEOUT,
            lease: DEFAULT_LEASE,
        }
    }

    /// Publish finished clips to `artifacts`; the stored `video_path` becomes
    /// the artifact location instead of the scratch path.
    pub fn with_artifacts(mut self, artifacts: Arc<dyn ArtifactStore>) -> Self {
        self.artifacts = Some(artifacts);
        self
    }

    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }

    /// How long a claim survives without renewal. The running attempt renews
    /// it three times per period.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Execute one delivery of `job`. Safe to call more than once for the
    /// same job: terminal jobs are left untouched.
    ///
    /// Only store failures are returned as errors; every pipeline failure is
    /// recorded on the job.
    pub async fn execute(&self, job: &QueuedJob) -> Result<Execution, StoreError> {
        let id = job.job_id;
        let attempt = Uuid::new_v4();

        if !self.store.claim(id, attempt, self.lease).await? {
            return match self.store.get(id).await? {
                None => {
                    tracing::warn!(job_id = %id, "Dropping delivery for unknown job");
                    Ok(Execution::Missing)
                }
                Some(current) if current.status.is_terminal() => {
                    tracing::info!(
                        job_id = %id,
                        status = %current.status,
                        "Job already finished, ignoring redelivery"
                    );
                    Ok(Execution::Duplicate(current.status))
                }
                Some(_) => {
                    tracing::info!(job_id = %id, "Job is held by a live attempt, ignoring redelivery");
                    Ok(Execution::InFlight)
                }
            };
        }

        tracing::info!(job_id = %id, url = %job.source_url, "Processing video job");
        let started = Instant::now();

        let heartbeat = self.spawn_heartbeat(id, attempt);
        let result = self.run_pipeline(job).await;
        heartbeat.abort();

        let outcome = match result {
            Ok(result) => JobOutcome::Succeeded(result),
            Err(e) => {
                tracing::error!(job_id = %id, stage = ?e.stage(), error = %e, "Job failed");
                JobOutcome::Failed {
                    stage: e.stage(),
                    message: e.to_string(),
                }
            }
        };

        if !self.store.finish(id, attempt, &outcome).await? {
            tracing::warn!(job_id = %id, "Lease lost before finishing, outcome discarded");
            return Ok(Execution::Superseded);
        }

        metrics::histogram!("video_job_processing_seconds").record(started.elapsed().as_secs_f64());
        match &outcome {
            JobOutcome::Succeeded(result) => {
                metrics::counter!("video_jobs_completed_total").increment(1);
                tracing::info!(
                    job_id = %id,
                    video_path = %result.video_path,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Job completed successfully"
                );
            }
            JobOutcome::Failed { stage, .. } => {
                let stage = stage.map(|s| s.to_string()).unwrap_or_else(|| "none".to_string());
                metrics::counter!("video_jobs_failed_total", "stage" => stage).increment(1);
            }
        }

        Ok(Execution::Finished(outcome.status()))
    }

    fn spawn_heartbeat(&self, id: Uuid, attempt: Uuid) -> JoinHandle<()> {
        let store = self.store.clone();
        let lease = self.lease;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(lease / 3).await;
                match store.renew(id, attempt, lease).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!(job_id = %id, "Lease taken over by another attempt");
                        break;
                    }
                    Err(e) => tracing::warn!(job_id = %id, error = %e, "Failed to renew lease"),
                }
            }
        })
    }

    async fn run_pipeline(&self, job: &QueuedJob) -> Result<JobResult, StageError> {
        let id = job.job_id;

        tokio::fs::create_dir_all(&self.scratch_root)
            .await
            .map_err(StageError::Workspace)?;
        // removed on drop, including every early return below
        let workspace = tempfile::Builder::new()
            .prefix(&format!("{}-", id))
            .tempdir_in(&self.scratch_root)
            .map_err(StageError::Workspace)?;

        let fetcher = self.stages.fetcher.clone();
        let url = job.source_url.clone();
        let target = workspace.path().join("source.mp4");
        let fetched = self
            .run_stage(id, Stage::Fetch, async move {
                fetcher.fetch(&url, &target).await.map_err(StageError::from)
            })
            .await?;

        let transformer = self.stages.transformer.clone();
        let target = workspace.path().join("vertical.mp4");
        let transformed = self
            .run_stage(id, Stage::Transform, async move {
                transformer
                    .transform(&fetched, &target)
                    .await
                    .map_err(StageError::from)
            })
            .await?;

        let captioner = self.stages.captioner.clone();
        let media = transformed.clone();
        let caption = self
            .run_stage(id, Stage::Caption, async move {
                captioner.caption(&media).await.map_err(StageError::from)
            })
            .await?;

        let video_path = match &self.artifacts {
            Some(artifacts) => {
                let artifacts = artifacts.clone();
                let clip = transformed.clone();
                self.run_stage(id, Stage::Publish, async move {
                    artifacts.publish(id, &clip).await.map_err(StageError::from)
                })
                .await?
            }
            None => transformed.to_string_lossy().into_owned(),
        };

        if let Err(e) = workspace.close() {
            tracing::warn!(job_id = %id, error = %e, "Failed to clean up scratch directory");
        }

        Ok(JobResult {
            video_path,
            caption,
        })
    }

    /// Run one stage on its own task, bounded by the stage timeout. Panics
    /// and timeouts become failures of that stage.
    async fn run_stage<T, F>(&self, job_id: Uuid, stage: Stage, work: F) -> Result<T, StageError>
    where
        T: Send + 'static,
        F: Future<Output = Result<T, StageError>> + Send + 'static,
    {
        tracing::debug!(job_id = %job_id, stage = %stage, "Starting stage");
        let started = Instant::now();

        let mut handle = tokio::spawn(work);
        let result = match tokio::time::timeout(self.stage_timeout, &mut handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(StageError::Crashed {
                stage,
                message: panic_message(join_err),
            }),
            Err(_) => {
                // wait for the task to unwind so nothing still writes to the workspace
                handle.abort();
                let _ = handle.await;
                Err(StageError::Timeout {
                    stage,
                    after: self.stage_timeout,
                })
            }
        };

        let elapsed = started.elapsed();
        metrics::histogram!("video_job_stage_seconds", "stage" => stage.to_string())
            .record(elapsed.as_secs_f64());
        tracing::info!(
            job_id = %job_id,
            stage = %stage,
            duration_ms = elapsed.as_millis() as u64,
            ok = result.is_ok(),
            "Stage finished"
        );

        result
    }
}

fn panic_message(err: tokio::task::JoinError) -> String {
    if !err.is_panic() {
        return err.to_string();
    }
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
