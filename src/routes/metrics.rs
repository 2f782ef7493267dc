use axum::extract::State;
use axum::response::IntoResponse;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::services::queue::QueueChannel;

/// State for the scrape endpoint, kept apart from [`crate::app_state::AppState`].
#[derive(Clone)]
pub struct MetricsState {
    pub handle: Arc<PrometheusHandle>,
    pub queue: Arc<dyn QueueChannel>,
}

/// Prometheus metrics scrape endpoint.
/// Refreshes the queue depth gauge, then renders the text exposition format.
pub async fn prometheus_metrics(State(state): State<MetricsState>) -> impl IntoResponse {
    match state.queue.depth().await {
        Ok(depth) => metrics::gauge!("photo_queue_depth").set(depth as f64),
        Err(e) => tracing::warn!(error = %e, "Failed to read queue depth"),
    }
    state.handle.render()
}
