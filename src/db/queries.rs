use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{JobOutcome, JobResult, JobStatus, Stage, VideoJob};
use crate::services::store::StoreError;

const JOB_COLUMNS: &str = "id, source_url, status, result, error, failed_stage, \
                           created_at, started_at, completed_at, lease_owner, lease_until";

fn row_to_job(row: &PgRow) -> Result<VideoJob, StoreError> {
    let status: String = row.try_get("status")?;
    let status = JobStatus::from_str(&status)
        .map_err(|_| StoreError::Corrupt(format!("unknown status '{}'", status)))?;

    let failed_stage: Option<String> = row.try_get("failed_stage")?;
    let failed_stage = failed_stage
        .map(|s| {
            Stage::from_str(&s).map_err(|_| StoreError::Corrupt(format!("unknown stage '{}'", s)))
        })
        .transpose()?;

    let result: Option<Json<JobResult>> = row.try_get("result")?;

    Ok(VideoJob {
        id: row.try_get("id")?,
        source_url: row.try_get("source_url")?,
        status,
        result: result.map(|Json(r)| r),
        error: row.try_get("error")?,
        failed_stage,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        lease_owner: row.try_get("lease_owner")?,
        lease_until: row.try_get("lease_until")?,
    })
}

/// Insert a new job in `queued` state
pub async fn insert_job(pool: &PgPool, job: &VideoJob) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO video_jobs (id, source_url, status, created_at)
        VALUES ($1, $2, $3, $4)
        "#,
    )
    .bind(job.id)
    .bind(&job.source_url)
    .bind(job.status.as_ref())
    .bind(job.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Get a job by ID
pub async fn get_job(pool: &PgPool, job_id: Uuid) -> Result<Option<VideoJob>, StoreError> {
    let sql = format!("SELECT {} FROM video_jobs WHERE id = $1", JOB_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(job_id)
        .fetch_optional(pool)
        .await?;

    row.as_ref().map(row_to_job).transpose()
}

/// Claim a queued job, or take over a running job whose lease has lapsed.
/// Returns false if neither applies.
pub async fn claim_job(
    pool: &PgPool,
    job_id: Uuid,
    owner: Uuid,
    lease: Duration,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE video_jobs
        SET status = 'running',
            started_at = NOW(),
            lease_owner = $2,
            lease_until = NOW() + make_interval(secs => $3)
        WHERE id = $1
          AND (status = 'queued' OR (status = 'running' AND lease_until < NOW()))
        "#,
    )
    .bind(job_id)
    .bind(owner)
    .bind(lease.as_secs_f64())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Push out the lease held by `owner`
pub async fn renew_lease(
    pool: &PgPool,
    job_id: Uuid,
    owner: Uuid,
    lease: Duration,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE video_jobs
        SET lease_until = NOW() + make_interval(secs => $3)
        WHERE id = $1 AND status = 'running' AND lease_owner = $2
        "#,
    )
    .bind(job_id)
    .bind(owner)
    .bind(lease.as_secs_f64())
    .execute(pool)
    .await?;

    Ok(result.rows_affected() == 1)
}

/// Write the terminal outcome of a running job
pub async fn finish_job(
    pool: &PgPool,
    job_id: Uuid,
    owner: Uuid,
    outcome: &JobOutcome,
) -> Result<bool, StoreError> {
    let (result, error, stage) = match outcome {
        JobOutcome::Succeeded(result) => (Some(Json(result.clone())), None, None),
        JobOutcome::Failed { stage, message } => {
            (None, Some(message.as_str()), stage.map(|s| s.as_ref().to_string()))
        }
    };

    let updated = sqlx::query(
        r#"
        UPDATE video_jobs
        SET status = $2,
            result = $3,
            error = $4,
            failed_stage = $5,
            completed_at = NOW(),
            lease_until = NULL
        WHERE id = $1 AND status = 'running' AND lease_owner = $6
        "#,
    )
    .bind(job_id)
    .bind(outcome.status().as_ref())
    .bind(result)
    .bind(error)
    .bind(stage)
    .bind(owner)
    .execute(pool)
    .await?;

    Ok(updated.rows_affected() == 1)
}

/// Delete a job that never left the queue
pub async fn delete_queued_job(pool: &PgPool, job_id: Uuid) -> Result<bool, sqlx::Error> {
    let deleted = sqlx::query("DELETE FROM video_jobs WHERE id = $1 AND status = 'queued'")
        .bind(job_id)
        .execute(pool)
        .await?;

    Ok(deleted.rows_affected() == 1)
}

/// Most recently completed successful job
pub async fn latest_succeeded_job(pool: &PgPool) -> Result<Option<VideoJob>, StoreError> {
    let sql = format!(
        r#"
        SELECT {}
        FROM video_jobs
        WHERE status = 'succeeded'
        ORDER BY completed_at DESC
        LIMIT 1
        "#,
        JOB_COLUMNS
    );
    let row = sqlx::query(&sql).fetch_optional(pool).await?;

    row.as_ref().map(row_to_job).transpose()
}
