// crates/clinote-server/src/routes/extractions.rs
//! POST /api/extractions — manually (re-)trigger an extraction job for a
//! tenant, outside the automatic post-upload chaining.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::jobs::ExtractionRequest;
use crate::metrics::record_request;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TriggerExtraction {
    pub tenant_id: String,
}

#[derive(Debug, Serialize)]
pub struct ExtractionAccepted {
    pub job_id: String,
}

async fn trigger_extraction(
    State(state): State<Arc<AppState>>,
    Json(request): Json<TriggerExtraction>,
) -> ApiResult<Json<ExtractionAccepted>> {
    let start = Instant::now();
    let job_id = match state.jobs.spawn_extraction(ExtractionRequest { tenant_id: request.tenant_id }).await {
        Ok(job_id) => job_id,
        Err(e) => {
            record_request("trigger_extraction", "500", start.elapsed());
            return Err(e);
        }
    };
    record_request("trigger_extraction", "200", start.elapsed());
    Ok(Json(ExtractionAccepted { job_id }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/extractions", post(trigger_extraction))
}
