// crates/clinote-server/src/routes/tenants.rs
//! Read-only tenant summary endpoints layered on top of the Persistence
//! Gateway, supplementing the core pipeline with the small reporting
//! surface a dashboard needs.
//!
//! - GET /tenants/{tenant_id}/counts
//! - GET /tenants/{tenant_id}/risk

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use clinote_db::queries::PatientMentionCount;
use serde::Serialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct TenantCounts {
    pub patients: i64,
    pub notes: i64,
    pub mentions: i64,
    pub dictionary_entries: i64,
}

async fn tenant_counts(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> ApiResult<Json<TenantCounts>> {
    let patients = state.db.count_patients(&tenant_id).await?;
    let notes = state.db.count_notes(&tenant_id).await?;
    let mentions = state.db.count_mentions(&tenant_id).await?;
    let dictionary_entries = state.db.count_dictionary_entries(&tenant_id).await?;
    Ok(Json(TenantCounts {
        patients,
        notes,
        mentions,
        dictionary_entries,
    }))
}

/// Raw per-patient distinct-segment counts, most-mentioned patient first.
/// Bucketing into risk tiers is left to a downstream report consumer.
async fn tenant_risk(
    State(state): State<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> ApiResult<Json<Vec<PatientMentionCount>>> {
    let counts = state.db.mentions_per_patient(&tenant_id).await?;
    Ok(Json(counts))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tenants/{tenant_id}/counts", get(tenant_counts))
        .route("/tenants/{tenant_id}/risk", get(tenant_risk))
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
    async fn counts_for_empty_tenant_are_all_zero() {
        let db = Database::new_in_memory().await.unwrap();
        let state = AppState::new(db, Settings::from_env());
        let app = Router::new().nest("/api", router()).with_state(state);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/tenants/t1/counts")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let counts: TenantCounts = serde_json::from_slice(&body).unwrap();
        assert_eq!(counts.patients, 0);
        assert_eq!(counts.mentions, 0);
    }
}
