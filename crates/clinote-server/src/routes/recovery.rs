// crates/clinote-server/src/routes/recovery.rs
//! Recovery operations. Elevated-authorization endpoints: destructive or
//! state-resetting operations scoped to a single tenant.
//!
//! - POST /recovery/clear-mentions
//! - POST /recovery/reset-status
//! - POST /recovery/purge

use std::sync::Arc;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TenantOnly {
    pub tenant_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetStatusRequest {
    pub tenant_id: String,
    pub process_type: String,
}

#[derive(Debug, Serialize)]
pub struct ClearMentionsResult {
    pub deleted: u64,
}

async fn clear_mentions(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TenantOnly>,
) -> ApiResult<Json<ClearMentionsResult>> {
    let deleted = state.db.clear_mentions(&request.tenant_id).await?;
    Ok(Json(ClearMentionsResult { deleted }))
}

async fn reset_status(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResetStatusRequest>,
) -> ApiResult<axum::http::StatusCode> {
    state.db.reset_status(&request.tenant_id, &request.process_type).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

async fn purge(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TenantOnly>,
) -> ApiResult<axum::http::StatusCode> {
    state.db.purge_tenant(&request.tenant_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/recovery/clear-mentions", post(clear_mentions))
        .route("/recovery/reset-status", post(reset_status))
        .route("/recovery/purge", post(purge))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use clinote_core::Settings;
    use clinote_db::Database;
    use tower::ServiceExt;

    #[tokio::test]
    async fn clear_mentions_on_empty_tenant_deletes_nothing() {
        let db = Database::new_in_memory().await.unwrap();
        let state = AppState::new(db, Settings::from_env());
        let app = Router::new().nest("/api", router()).with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/recovery/clear-mentions")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"tenant_id":"t1"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let result: ClearMentionsResult = serde_json::from_slice(&body).unwrap();
        assert_eq!(result.deleted, 0);
    }
}
