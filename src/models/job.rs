use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a video job. Only moves forward:
/// `Queued -> Running -> {Succeeded, Failed}`.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }

    /// Whether `self -> next` is a legal forward move.
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Queued, JobStatus::Running)
                | (JobStatus::Running, JobStatus::Succeeded)
                | (JobStatus::Running, JobStatus::Failed)
        )
    }
}

/// Pipeline stage that produced a failure.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    Fetch,
    Transform,
    Caption,
    Publish,
}

/// Output of a successful job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobResult {
    pub video_path: String,
    pub caption: String,
}

/// Terminal outcome handed to the store by the executor.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Succeeded(JobResult),
    Failed { stage: Option<Stage>, message: String },
}

impl JobOutcome {
    pub fn status(&self) -> JobStatus {
        match self {
            JobOutcome::Succeeded(_) => JobStatus::Succeeded,
            JobOutcome::Failed { .. } => JobStatus::Failed,
        }
    }
}

/// Authoritative job record, owned by the job store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VideoJob {
    pub id: Uuid,
    pub source_url: String,
    pub status: JobStatus,
    pub result: Option<JobResult>,
    pub error: Option<String>,
    pub failed_stage: Option<Stage>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Attempt currently holding the job while it is `Running`.
    pub lease_owner: Option<Uuid>,
    /// When the holder's lease lapses unless renewed.
    pub lease_until: Option<DateTime<Utc>>,
}

impl VideoJob {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            source_url: source_url.into(),
            status: JobStatus::Queued,
            result: None,
            error: None,
            failed_stage: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            lease_owner: None,
            lease_until: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_forward_transitions_only() {
        use JobStatus::*;
        assert!(Queued.can_transition_to(Running));
        assert!(Running.can_transition_to(Succeeded));
        assert!(Running.can_transition_to(Failed));

        assert!(!Queued.can_transition_to(Succeeded));
        assert!(!Running.can_transition_to(Queued));
        assert!(!Succeeded.can_transition_to(Failed));
        assert!(!Failed.can_transition_to(Running));
        assert!(!Running.can_transition_to(Running));
    }

    #[test]
    fn test_status_column_names() {
        assert_eq!(JobStatus::Succeeded.as_ref(), "succeeded");
        assert_eq!(JobStatus::from_str("running").unwrap(), JobStatus::Running);
        assert!(JobStatus::from_str("processing").is_err());
        assert_eq!(Stage::Caption.to_string(), "caption");
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = VideoJob::new("https://www.tiktok.com/@a/video/1");
        assert_eq!(job.status, JobStatus::Queued);
        assert!(job.result.is_none());
        assert!(job.completed_at.is_none());
    }
}
