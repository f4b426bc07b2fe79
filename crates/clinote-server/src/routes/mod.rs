// crates/clinote-server/src/routes/mod.rs
//! API route handlers for the clinote server.

pub mod extractions;
pub mod health;
pub mod jobs;
pub mod metrics;
pub mod progress;
pub mod recovery;
pub mod tenants;
pub mod uploads;

use std::sync::Arc;

use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

/// CORS for the clinical API: any origin may read responses, but only the
/// methods/headers this API actually exposes.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Combined API router, all routes nested under `/api`.
pub fn api_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", health::router())
        .nest("/api", metrics::router())
        .nest("/api", jobs::router())
        .nest("/api", uploads::router())
        .nest("/api", extractions::router())
        .nest("/api", progress::router())
        .nest("/api", recovery::router())
        .nest("/api", tenants::router())
        .with_state(state)
        .layer(CompressionLayer::new())
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinote_core::Settings;
    use clinote_db::Database;

    #[tokio::test]
    async fn api_routes_construct_without_panicking() {
        let db = Database::new_in_memory().await.unwrap();
        let state = AppState::new(db, Settings::from_env());
        let _router = api_routes(state);
    }
}
