// crates/clinote-server/src/routes/uploads.rs
//! POST /api/uploads — multipart file upload that enqueues an upload job.
//! Streams the incoming file straight to a temp path instead of buffering
//! it in memory first.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::Json;
use axum::Router;
use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::{ApiError, ApiResult};
use crate::jobs::UploadRequest;
use crate::metrics::record_request;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TenantQuery {
    pub tenant: String,
}

#[derive(Debug, Serialize)]
pub struct UploadAccepted {
    pub job_id: String,
}

fn boundary_from_headers(headers: &HeaderMap) -> ApiResult<String> {
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("missing content-type".into()))?;
    multer::parse_boundary(content_type)
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart request: {e}")))
}

async fn receive_upload(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TenantQuery>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> ApiResult<Json<UploadAccepted>> {
    let start = Instant::now();
    let result = receive_upload_inner(state, query, headers, body).await;
    match &result {
        Ok(_) => record_request("receive_upload", "200", start.elapsed()),
        Err(ApiError::BadRequest(_)) => record_request("receive_upload", "400", start.elapsed()),
        Err(_) => record_request("receive_upload", "500", start.elapsed()),
    }
    result
}

async fn receive_upload_inner(
    state: Arc<AppState>,
    query: TenantQuery,
    headers: HeaderMap,
    body: axum::body::Body,
) -> ApiResult<Json<UploadAccepted>> {
    let boundary = boundary_from_headers(&headers)?;
    let stream = body.into_data_stream().map_err(std::io::Error::other);
    let mut multipart = multer::Multipart::new(stream, boundary);

    let mut field = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("multipart error: {e}")))?
        .ok_or_else(|| ApiError::BadRequest("no file field in upload".into()))?;

    let file_name = field.file_name().map(str::to_string).unwrap_or_else(|| "upload.csv".to_string());

    let tmp_path = std::env::temp_dir().join(format!("clinote-upload-{}.csv", uuid::Uuid::new_v4()));
    let mut file = tokio::fs::File::create(&tmp_path)
        .await
        .map_err(|e| ApiError::Internal(format!("cannot create temp upload file: {e}")))?;

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|e| ApiError::BadRequest(format!("multipart read error: {e}")))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| ApiError::Internal(format!("failed writing temp upload file: {e}")))?;
    }
    file.flush().await.map_err(|e| ApiError::Internal(e.to_string()))?;

    let job_id = state
        .jobs
        .spawn_upload(UploadRequest {
            tenant_id: query.tenant,
            file_path: tmp_path.to_string_lossy().to_string(),
            file_name,
        })
        .await?;

    Ok(Json(UploadAccepted { job_id }))
}

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/uploads", axum::routing::post(receive_upload))
}
