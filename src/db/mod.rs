use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::time::Duration;
use uuid::Uuid;

use crate::models::job::{JobOutcome, VideoJob};
use crate::services::store::{JobStore, StoreError};

/// Initialize PostgreSQL connection pool
pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await
}

/// Run database migrations
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| sqlx::Error::Migrate(Box::new(e)))
}

pub mod queries;

/// PostgreSQL-backed [`JobStore`]. Survives restarts of both the API and the
/// workers.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, job: &VideoJob) -> Result<(), StoreError> {
        queries::insert_job(&self.pool, job).await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<VideoJob>, StoreError> {
        queries::get_job(&self.pool, id).await
    }

    async fn claim(&self, id: Uuid, owner: Uuid, lease: Duration) -> Result<bool, StoreError> {
        Ok(queries::claim_job(&self.pool, id, owner, lease).await?)
    }

    async fn renew(&self, id: Uuid, owner: Uuid, lease: Duration) -> Result<bool, StoreError> {
        Ok(queries::renew_lease(&self.pool, id, owner, lease).await?)
    }

    async fn finish(
        &self,
        id: Uuid,
        owner: Uuid,
        outcome: &JobOutcome,
    ) -> Result<bool, StoreError> {
        queries::finish_job(&self.pool, id, owner, outcome).await
    }

    async fn discard(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(queries::delete_queued_job(&self.pool, id).await?)
    }

    async fn latest_succeeded(&self) -> Result<Option<VideoJob>, StoreError> {
        queries::latest_succeeded_job(&self.pool).await
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
