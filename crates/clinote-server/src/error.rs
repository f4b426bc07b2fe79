// crates/clinote-server/src/error.rs
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use clinote_core::CoreError;
use clinote_db::DbError;
use serde::Serialize;
use thiserror::Error;

/// Structured JSON error response for API errors.
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}

/// API error types that map to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("job not found: {0}")]
    JobNotFound(String),

    #[error("tenant not found or has no data: {0}")]
    TenantNotFound(String),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("database error: {0}")]
    Database(#[from] DbError),

    #[error("running job cannot be cancelled: {0}")]
    JobRunning(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ApiError::JobNotFound(id) => {
                tracing::warn!(job_id = %id, "job not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("job not found", format!("job id: {id}")),
                )
            }
            ApiError::TenantNotFound(tenant_id) => {
                tracing::warn!(tenant_id = %tenant_id, "tenant not found");
                (
                    StatusCode::NOT_FOUND,
                    ErrorResponse::with_details("tenant not found", format!("tenant: {tenant_id}")),
                )
            }
            ApiError::Core(CoreError::DictionaryUnavailable { tenant_id }) => {
                tracing::error!(tenant_id = %tenant_id, "dictionary unavailable");
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorResponse::with_details(
                        "dictionary unavailable",
                        format!("tenant: {tenant_id}"),
                    ),
                )
            }
            ApiError::Core(CoreError::Validation(msg)) => {
                tracing::warn!(message = %msg, "validation error");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse::with_details("validation failed", msg.clone()),
                )
            }
            ApiError::Core(core_err) => {
                tracing::error!(error = %core_err, "core error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("processing error", core_err.to_string()),
                )
            }
            ApiError::Database(db_err) => {
                tracing::error!(error = %db_err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::with_details("database error", db_err.to_string()),
                )
            }
            ApiError::JobRunning(id) => {
                tracing::warn!(job_id = %id, "cancel rejected: job already running");
                (
                    StatusCode::CONFLICT,
                    ErrorResponse::with_details("job is running", format!("job id: {id}")),
                )
            }
            ApiError::BadRequest(msg) => {
                tracing::warn!(message = %msg, "bad request");
                (StatusCode::BAD_REQUEST, ErrorResponse::with_details("bad request", msg.clone()))
            }
            ApiError::Internal(msg) => {
                tracing::error!(message = %msg, "internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::new("internal server error"))
            }
        };

        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    async fn extract(response: Response) -> (StatusCode, ErrorResponse) {
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn job_not_found_returns_404() {
        let (status, body) = extract(ApiError::JobNotFound("j1".into()).into_response()).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.details.unwrap().contains("j1"));
    }

    #[tokio::test]
    async fn running_job_cancel_returns_409() {
        let (status, _) = extract(ApiError::JobRunning("j2".into()).into_response()).await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn dictionary_unavailable_returns_422() {
        let err = ApiError::Core(CoreError::DictionaryUnavailable { tenant_id: "t1".into() });
        let (status, _) = extract(err.into_response()).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn internal_error_hides_details() {
        let (status, body) = extract(ApiError::Internal("boom".into()).into_response()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body.details.is_none());
    }
}
