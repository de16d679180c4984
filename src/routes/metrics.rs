use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::app_state::AppState;

/// GET /metrics: Prometheus text exposition.
pub async fn prometheus_metrics(State(state): State<AppState>) -> Response {
    let Some(handle) = state.prometheus.as_ref() else {
        return StatusCode::NOT_FOUND.into_response();
    };

    // the queue gauge is sampled on scrape
    if let Err(e) = state.jobs.queue_depth().await {
        tracing::warn!(error = %e, "Failed to sample queue depth");
    }

    handle.render().into_response()
}
