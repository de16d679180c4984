//! Worker loops pulling jobs off the queue and driving the executor.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

use crate::services::executor::{Execution, JobExecutor};
use crate::services::queue::{JobQueue, QueueError};
use crate::services::store::StoreError;

pub const POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// A set of worker loops sharing one queue and executor. Each loop owns a
/// consumer name (`<name>-<n>`) and runs one job at a time.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown: watch::Sender<bool>,
}

impl WorkerPool {
    pub fn spawn(
        name: &str,
        concurrency: usize,
        queue: Arc<dyn JobQueue>,
        executor: Arc<JobExecutor>,
        poll_interval: Duration,
    ) -> Self {
        let (shutdown, signal) = watch::channel(false);
        let handles = (0..concurrency)
            .map(|n| {
                let worker = Worker {
                    consumer: format!("{}-{}", name, n),
                    queue: queue.clone(),
                    executor: executor.clone(),
                    poll_interval,
                };
                tokio::spawn(worker.run(signal.clone()))
            })
            .collect();

        Self { handles, shutdown }
    }

    /// Stop taking new jobs and wait for in-flight jobs to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker task ended abnormally");
            }
        }
    }
}

struct Worker {
    consumer: String,
    queue: Arc<dyn JobQueue>,
    executor: Arc<JobExecutor>,
    poll_interval: Duration,
}

impl Worker {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        match self.queue.recover(&self.consumer).await {
            Ok(0) => {}
            Ok(n) => tracing::warn!(consumer = %self.consumer, jobs = n, "Requeued jobs left in flight by a previous run"),
            Err(e) => tracing::error!(consumer = %self.consumer, error = %e, "Failed to recover in-flight jobs"),
        }

        tracing::info!(consumer = %self.consumer, "Worker ready");

        while !*shutdown.borrow() {
            let idle = match self.process_next_job().await {
                Ok(true) => {
                    tracing::debug!(consumer = %self.consumer, "Job processed, checking for next job");
                    false
                }
                Ok(false) => {
                    tracing::trace!(consumer = %self.consumer, "No jobs available, sleeping");
                    true
                }
                Err(e) => {
                    tracing::error!(consumer = %self.consumer, error = %e, "Error processing job, will retry");
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = sleep(self.poll_interval) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!(consumer = %self.consumer, "Worker stopped");
    }

    /// Process the next job from the queue.
    /// Returns Ok(true) if a job was processed, Ok(false) if no job available.
    async fn process_next_job(&self) -> Result<bool, WorkerError> {
        let job = match self.queue.dequeue(&self.consumer).await? {
            Some(j) => j,
            None => return Ok(false),
        };

        match self.executor.execute(&job).await {
            Ok(execution) => {
                match execution {
                    Execution::Duplicate(status) => {
                        tracing::debug!(job_id = %job.job_id, status = %status, "Dropped duplicate delivery")
                    }
                    Execution::InFlight => {
                        tracing::debug!(job_id = %job.job_id, "Dropped delivery of a job held elsewhere")
                    }
                    Execution::Finished(_) | Execution::Superseded | Execution::Missing => {}
                }
                self.queue.complete(&self.consumer, &job).await?;
                Ok(true)
            }
            Err(e) => {
                // state store unreachable: hand the job back for another delivery
                self.queue.enqueue(&job).await?;
                self.queue.complete(&self.consumer, &job).await?;
                tracing::warn!(job_id = %job.job_id, error = %e, "Job re-queued after store error");
                Err(e.into())
            }
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
