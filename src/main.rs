use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use viral_clip_engine::app_state::AppState;
use viral_clip_engine::config::AppConfig;
use viral_clip_engine::routes;
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

    // Load configuration from environment
    let config = AppConfig::from_env().expect("Failed to load configuration from environment");

    tracing::info!("Initializing viral-clip-engine server");

    // Initialize Prometheus metrics recorder
    let prometheus_handle = PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus metrics recorder");

    describe_metrics();

    let state = AppState::connect(&config)
        .await
        .expect("Failed to initialize backends")
        .with_prometheus(prometheus_handle);

    // Without a shared queue nothing else can reach our jobs, so run the
    // workers in this process.
    let embedded_workers = if config.redis_url.is_none() {
        tracing::info!(
            concurrency = config.worker_concurrency,
            "Starting embedded worker pool"
        );
        let name = config.worker_name().unwrap_or_else(|| "embedded".to_string());
        Some(WorkerPool::spawn(
            &name,
            config.worker_concurrency,
            state.queue.clone(),
            Arc::new(state.executor(&config)),
            POLL_INTERVAL,
        ))
    } else {
        None
    };

    let app = routes::router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("Failed to bind to address");

    tracing::info!("Server listening on {}", config.bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    if let Some(pool) = embedded_workers {
        tracing::info!("Waiting for in-flight jobs to finish");
        pool.shutdown().await;
    }

    tracing::info!("Server stopped");
}

fn describe_metrics() {
    metrics::describe_counter!("video_jobs_submitted_total", "Total video jobs submitted");
    metrics::describe_counter!(
        "video_jobs_completed_total",
        "Total video jobs that finished successfully"
    );
    metrics::describe_counter!(
        "video_jobs_failed_total",
        "Total video jobs that failed, by stage"
    );
    metrics::describe_histogram!(
        "video_job_stage_seconds",
        "Time spent in each pipeline stage"
    );
    metrics::describe_histogram!(
        "video_job_processing_seconds",
        "End-to-end time to process a video job"
    );
    metrics::describe_gauge!(
        "video_queue_depth",
        "Current number of jobs waiting for a worker"
    );
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
