use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use viral_clip_engine::app_state::AppState;
use viral_clip_engine::config::AppConfig;
use viral_clip_engine::services::worker::{WorkerPool, POLL_INTERVAL};

#[tokio::main]
async fn main() {
    // Initialize structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting video pipeline worker");

    // Load configuration
    let config = AppConfig::from_env().expect("Failed to load configuration");

    // A standalone worker only sees jobs through shared infrastructure
    if config.redis_url.is_none() || config.database_url.is_none() {
        tracing::error!("The standalone worker needs both REDIS_URL and DATABASE_URL");
        std::process::exit(1);
    }

    // consumer names pick which processing lists get recovered at start-up
    let Some(name) = config.worker_name() else {
        tracing::error!("Set WORKER_NAME (or HOSTNAME) to a name unique to this worker");
        std::process::exit(1);
    };

    tracing::info!("Initializing services");
    let state = AppState::connect(&config)
        .await
        .expect("Failed to initialize backends");

    let pool = WorkerPool::spawn(
        &name,
        config.worker_concurrency,
        state.queue.clone(),
        Arc::new(state.executor(&config)),
        POLL_INTERVAL,
    );

    tracing::info!(
        name = %name,
        concurrency = config.worker_concurrency,
        "Worker ready, starting job processing loop"
    );

    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
    }

    tracing::info!("Shutdown signal received, finishing in-flight jobs");
    pool.shutdown().await;
    tracing::info!("Worker stopped");
}
