// crates/clinote-server/src/routes/metrics.rs
//! GET /api/metrics — Prometheus scrape endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;

use crate::metrics::render_metrics;
use crate::state::AppState;

async fn metrics_handler(State(_state): State<Arc<AppState>>) -> Result<String, StatusCode> {
    render_metrics().ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/metrics", get(metrics_handler))
}
