//! Job state store: the authoritative record of every job.
//!
//! All status mutation goes through [`JobStore::claim`] and
//! [`JobStore::finish`], which are compare-and-set operations on the current
//! status. A claim holds the job under a lease that the running attempt keeps
//! renewing; another delivery may take a `Running` job over only once that
//! lease has lapsed. Only the attempt holding the lease can finish the job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::job::{JobOutcome, JobStatus, VideoJob};

#[async_trait]
pub trait JobStore: Send + Sync {
    /// Persist a freshly created job (status `Queued`).
    async fn insert(&self, job: &VideoJob) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<VideoJob>, StoreError>;

    /// Move `id` to `Running` on behalf of the attempt `owner`, holding the
    /// job for `lease`. Succeeds for a `Queued` job, or for a `Running` job
    /// whose previous lease has expired. Returns `false` otherwise.
    async fn claim(&self, id: Uuid, owner: Uuid, lease: Duration) -> Result<bool, StoreError>;

    /// Extend the lease held by `owner`. Returns `false` when `owner` no
    /// longer holds the job.
    async fn renew(&self, id: Uuid, owner: Uuid, lease: Duration) -> Result<bool, StoreError>;

    /// Record a terminal outcome for a `Running` job held by `owner`.
    /// Returns `false` when the job is not running under that owner.
    async fn finish(&self, id: Uuid, owner: Uuid, outcome: &JobOutcome)
        -> Result<bool, StoreError>;

    /// Remove a job that was never dispatched. Only `Queued` jobs are removed.
    async fn discard(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Most recently completed successful job.
    async fn latest_succeeded(&self) -> Result<Option<VideoJob>, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

fn lease_deadline(lease: Duration) -> Result<DateTime<Utc>, StoreError> {
    let lease = chrono::Duration::from_std(lease)
        .map_err(|_| StoreError::InvalidLease(lease))?;
    Ok(Utc::now() + lease)
}

/// Process-local store for single-node deployments and tests.
#[derive(Default)]
pub struct MemoryJobStore {
    jobs: RwLock<HashMap<Uuid, VideoJob>>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.jobs.read().await.is_empty()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: &VideoJob) -> Result<(), StoreError> {
        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(&job.id) {
            return Err(StoreError::Duplicate(job.id));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<VideoJob>, StoreError> {
        Ok(self.jobs.read().await.get(&id).cloned())
    }

    async fn claim(&self, id: Uuid, owner: Uuid, lease: Duration) -> Result<bool, StoreError> {
        let deadline = lease_deadline(lease)?;
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(false);
        };
        let now = Utc::now();
        let claimable = match job.status {
            JobStatus::Queued => true,
            JobStatus::Running => job.lease_until.map_or(true, |until| until < now),
            JobStatus::Succeeded | JobStatus::Failed => false,
        };
        if !claimable {
            return Ok(false);
        }
        job.status = JobStatus::Running;
        job.started_at = Some(now);
        job.lease_owner = Some(owner);
        job.lease_until = Some(deadline);
        Ok(true)
    }

    async fn renew(&self, id: Uuid, owner: Uuid, lease: Duration) -> Result<bool, StoreError> {
        let deadline = lease_deadline(lease)?;
        let mut jobs = self.jobs.write().await;
        match jobs.get_mut(&id) {
            Some(job) if job.status == JobStatus::Running && job.lease_owner == Some(owner) => {
                job.lease_until = Some(deadline);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn finish(
        &self,
        id: Uuid,
        owner: Uuid,
        outcome: &JobOutcome,
    ) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(false);
        };
        if job.lease_owner != Some(owner) || !job.status.can_transition_to(outcome.status()) {
            return Ok(false);
        }
        job.status = outcome.status();
        job.completed_at = Some(Utc::now());
        job.lease_until = None;
        match outcome {
            JobOutcome::Succeeded(result) => job.result = Some(result.clone()),
            JobOutcome::Failed { stage, message } => {
                job.error = Some(message.clone());
                job.failed_stage = *stage;
            }
        }
        Ok(true)
    }

    async fn discard(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut jobs = self.jobs.write().await;
        match jobs.get(&id) {
            Some(job) if job.status == JobStatus::Queued => {
                jobs.remove(&id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn latest_succeeded(&self) -> Result<Option<VideoJob>, StoreError> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.status == JobStatus::Succeeded)
            .max_by_key(|j| j.completed_at)
            .cloned())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Lease of {0:?} is out of range")]
    InvalidLease(Duration),

    #[error("Job {0} already exists")]
    Duplicate(Uuid),

    #[error("Corrupt job record: {0}")]
    Corrupt(String),
}
