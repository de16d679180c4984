use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::config::{AppConfig, ConfigError};
use crate::db::{self, PgJobStore};
use crate::services::{
    caption::GroqCaptioner,
    downloader::YtDlpFetcher,
    editor::FfmpegTransformer,
    executor::JobExecutor,
    jobs::JobService,
    queue::{JobQueue, MemoryJobQueue, QueueError, RedisJobQueue},
    stages::Stages,
    storage::{ArtifactStore, LocalArtifactStore, R2Client, StorageError},
    store::{JobStore, MemoryJobStore},
};

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub jobs: JobService,
    pub store: Arc<dyn JobStore>,
    pub queue: Arc<dyn JobQueue>,
    pub artifacts: Arc<dyn ArtifactStore>,
    pub prometheus: Option<Arc<PrometheusHandle>>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn JobStore>,
        queue: Arc<dyn JobQueue>,
        artifacts: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            jobs: JobService::new(store.clone(), queue.clone()),
            store,
            queue,
            artifacts,
            prometheus: None,
        }
    }

    pub fn with_prometheus(mut self, handle: PrometheusHandle) -> Self {
        self.prometheus = Some(Arc::new(handle));
        self
    }

    /// Connect the backends named in `config`, falling back to in-process
    /// implementations for anything left unset.
    pub async fn connect(config: &AppConfig) -> Result<Self, BootstrapError> {
        let store: Arc<dyn JobStore> = match &config.database_url {
            Some(url) => {
                tracing::info!("Connecting to PostgreSQL database");
                let pool = db::init_pool(url).await?;
                tracing::info!("Running database migrations");
                db::run_migrations(&pool).await?;
                Arc::new(PgJobStore::new(pool))
            }
            None => {
                tracing::warn!("DATABASE_URL not set, job state is kept in memory");
                Arc::new(MemoryJobStore::new())
            }
        };

        let queue: Arc<dyn JobQueue> = match &config.redis_url {
            Some(url) => {
                tracing::info!("Connecting to Redis job queue");
                Arc::new(RedisJobQueue::new(url)?)
            }
            None => {
                tracing::warn!("REDIS_URL not set, using the in-process job queue");
                Arc::new(MemoryJobQueue::new())
            }
        };

        let artifacts: Arc<dyn ArtifactStore> = match config.r2()? {
            Some(settings) => {
                tracing::info!(bucket = %settings.bucket, "Initializing R2 storage client");
                Arc::new(R2Client::new(&settings)?)
            }
            None => {
                tracing::info!(dir = %config.artifact_dir.display(), "Storing clips on local disk");
                Arc::new(LocalArtifactStore::new(config.artifact_dir.clone()))
            }
        };

        Ok(Self::new(store, queue, artifacts))
    }

    /// Executor wired with the production stage implementations.
    pub fn executor(&self, config: &AppConfig) -> JobExecutor {
        let stages = Stages::new(
            YtDlpFetcher::new(config.cookies_file.clone()),
            FfmpegTransformer::new(config.overlay_text.clone()),
            GroqCaptioner::new(
                config.groq_api_key.clone(),
                config.groq_base_url.clone(),
                config.transcription_model.clone(),
                config.caption_model.clone(),
            ),
        );

        if config.groq_api_key.as_deref().map_or(true, |k| k.trim().is_empty()) {
            tracing::warn!("GROQ_API_KEY not set, every job will fail at the caption stage");
        }

        JobExecutor::new(self.store.clone(), stages, config.scratch_root())
            .with_artifacts(self.artifacts.clone())
            .with_stage_timeout(config.stage_timeout())
            .with_lease(config.job_lease())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
