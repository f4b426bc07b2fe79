// crates/clinote-server/src/routes/jobs.rs
//! API routes for job status and cancellation.
//!
//! - GET /jobs/{job_id} — single job status, read from the `jobs` table
//! - GET /jobs?tenant= — all jobs for a tenant, most recent first
//! - DELETE /jobs/{job_id} — cancel a queued job (409 if already running)

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use clinote_core::model::Job;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant: String,
}

async fn get_job(State(state): State<Arc<AppState>>, Path(job_id): Path<String>) -> ApiResult<Json<Job>> {
    let job = state.jobs.get(&job_id).await?;
    Ok(Json(job))
}

async fn list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TenantQuery>,
) -> ApiResult<Json<Vec<Job>>> {
    let jobs = state.jobs.list(&query.tenant).await?;
    Ok(Json(jobs))
}

async fn cancel_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> ApiResult<axum::http::StatusCode> {
    state.jobs.cancel(&job_id).await?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/jobs", get(list_jobs))
        .route("/jobs/{job_id}", get(get_job).delete(cancel_job))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use clinote_core::Settings;
    use clinote_db::Database;
    use tower::ServiceExt;

    async fn app() -> (Router, Arc<AppState>) {
        let db = Database::new_in_memory().await.unwrap();
        let state = AppState::new(db, Settings::from_env());
        (Router::new().nest("/api", router()).with_state(Arc::clone(&state)), state)
    }

    #[tokio::test]
    async fn get_unknown_job_returns_404() {
        let (app, _state) = app().await;
        let response = app
            .oneshot(Request::builder().uri("/api/jobs/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn list_jobs_for_unknown_tenant_is_empty() {
        let (app, _state) = app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/jobs?tenant=ghost")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let jobs: Vec<Job> = serde_json::from_slice(&body).unwrap();
        assert!(jobs.is_empty());
    }
}
