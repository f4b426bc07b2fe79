// crates/clinote-server/src/routes/progress.rs
//! GET /api/progress/stream?tenant= — SSE fan-out of live progress events.
//! GET /api/progress/latest?tenant=&process_type= reads the durable
//! snapshot directly.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::routing::get;
use axum::{Json, Router};
use clinote_core::model::ProcessStatus;
use serde::Deserialize;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::error::ApiResult;
use crate::progress_bus::ProgressEvent;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant: String,
}

#[derive(Debug, Deserialize)]
pub struct LatestQuery {
    pub tenant: String,
    pub process_type: String,
}

async fn stream_progress(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TenantQuery>,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let rx = state.progress.subscribe(&query.tenant);
    let greeting_json = serde_json::to_string(&ProgressEvent::Connection { status: "connected".into() })
        .unwrap_or_default();
    let greeting = Event::default().data(greeting_json);

    let events = BroadcastStream::new(rx).filter_map(|item: Result<_, BroadcastStreamRecvError>| {
        item.ok().map(|published| Ok(Event::default().data(published.json)))
    });

    Sse::new(tokio_stream::once(Ok(greeting)).chain(events)).keep_alive(KeepAlive::default())
}

async fn latest_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LatestQuery>,
) -> ApiResult<Json<Option<ProcessStatus>>> {
    let status = state.db.latest_process_status(&query.tenant, &query.process_type).await?;
    Ok(Json(status))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/progress/stream", get(stream_progress))
        .route("/progress/latest", get(latest_status))
}
