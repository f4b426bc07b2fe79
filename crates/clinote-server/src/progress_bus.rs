// crates/clinote-server/src/progress_bus.rs
//! Progress bus. Two sinks, one source: every `publish` first upserts a
//! durable `ProcessStatus` row (the durable sink), then best-effort fans
//! the event out to SSE subscribers for the tenant (the live sink).

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use clinote_core::model::ProcessStatus;
use clinote_db::Database;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::warn;

const PROCESS_TYPE_UPLOAD: &str = "upload";
const PROCESS_TYPE_EXTRACTION: &str = "extraction";

/// Tagged progress events. `type` is the SSE/JSON discriminator the
/// frontend switches on.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    Connection {
        status: String,
    },
    UploadProgress {
        job_id: String,
        file_name: String,
        processed_records: u64,
        total_records: u64,
        rate: f64,
        eta: Option<f64>,
        percentage: f64,
    },
    UploadCompleted {
        job_id: String,
        processed_records: u64,
        new_patients: u64,
        new_notes: u64,
        duration_ms: u64,
    },
    UploadFailed {
        job_id: String,
        file_name: String,
        error: String,
    },
    ExtractionProgress {
        batch: usize,
        total_batches: usize,
        batch_progress: f64,
        overall_progress: f64,
        message: String,
    },
    BatchCompleted {
        batch: usize,
        total_batches: usize,
        mentions_found: usize,
        overall_progress: f64,
    },
    BatchWarning {
        batch: usize,
        message: String,
    },
    ExtractionRetry {
        attempt: u32,
        max_retries: u32,
        wait_ms: u64,
        message: String,
    },
    ExtractionCompleted {
        message: String,
    },
    ExtractionError {
        message: String,
    },
}

impl ProgressEvent {
    fn process_type(&self) -> &'static str {
        match self {
            ProgressEvent::UploadProgress { .. }
            | ProgressEvent::UploadCompleted { .. }
            | ProgressEvent::UploadFailed { .. } => PROCESS_TYPE_UPLOAD,
            ProgressEvent::Connection { .. } => PROCESS_TYPE_EXTRACTION,
            _ => PROCESS_TYPE_EXTRACTION,
        }
    }

    /// `(state, percentage, message, stage)` for the Sink A upsert.
    fn status_fields(&self) -> (&'static str, i32, String, &'static str) {
        match self {
            ProgressEvent::Connection { .. } => ("ready", 0, String::new(), "ready"),
            ProgressEvent::UploadProgress { percentage, .. } => {
                ("running", *percentage as i32, "uploading".into(), "upload")
            }
            ProgressEvent::UploadCompleted { .. } => {
                ("completed", 100, "upload complete".into(), "upload")
            }
            ProgressEvent::UploadFailed { error, .. } => {
                ("failed", 0, error.clone(), "upload")
            }
            ProgressEvent::ExtractionProgress { overall_progress, message, .. } => (
                "running",
                (*overall_progress * 100.0) as i32,
                message.clone(),
                "extraction",
            ),
            ProgressEvent::BatchCompleted { overall_progress, .. } => (
                "running",
                (*overall_progress * 100.0) as i32,
                "batch completed".into(),
                "extraction",
            ),
            ProgressEvent::BatchWarning { message, .. } => {
                ("running", 0, message.clone(), "extraction")
            }
            ProgressEvent::ExtractionRetry { message, .. } => {
                ("running", 0, message.clone(), "extraction")
            }
            ProgressEvent::ExtractionCompleted { message } => {
                ("completed", 100, message.clone(), "extraction")
            }
            ProgressEvent::ExtractionError { message } => {
                ("failed", 0, message.clone(), "extraction")
            }
        }
    }
}

/// A tenant-scoped event plus its serialized JSON, as delivered to SSE
/// subscribers.
#[derive(Debug, Clone)]
pub struct PublishedEvent {
    pub tenant_id: String,
    pub json: String,
}

/// Two sinks, one source. `publish` is synchronous on the durable sink (the
/// ProcessStatus upsert) and best-effort on the live sink (SSE fan-out).
pub struct ProgressBus {
    db: Database,
    subscribers: RwLock<HashMap<String, broadcast::Sender<PublishedEvent>>>,
}

impl ProgressBus {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            subscribers: RwLock::new(HashMap::new()),
        }
    }

    /// Publish an event for `tenant_id`. Sink A always completes before this
    /// returns; Sink B drops silently if no subscriber is listening.
    pub async fn publish(&self, tenant_id: &str, event: ProgressEvent) {
        let (state, percentage, message, stage) = event.status_fields();
        if let Err(e) = self
            .upsert_monotonic(tenant_id, event.process_type(), state, percentage, &message, stage)
            .await
        {
            warn!(tenant_id, error = %e, "failed to persist process status");
        }

        let json = serde_json::to_string(&event).unwrap_or_default();
        let published = PublishedEvent {
            tenant_id: tenant_id.to_string(),
            json,
        };
        if let Some(tx) = self.subscribers.read().ok().and_then(|m| m.get(tenant_id).cloned()) {
            let _ = tx.send(published);
        }
    }

    /// Durable-sink upsert with the monotonic-percentage rule: never lower
    /// `percentage` for a `(tenant, process_type)` except on an explicit
    /// `queued`/`reset`/`failed` transition.
    async fn upsert_monotonic(
        &self,
        tenant_id: &str,
        process_type: &str,
        state: &str,
        percentage: i32,
        message: &str,
        stage: &str,
    ) -> clinote_db::DbResult<()> {
        let existing = self.db.latest_process_status(tenant_id, process_type).await?;

        let resets_allowed = matches!(state, "queued" | "reset" | "failed");
        let percentage = if resets_allowed {
            percentage
        } else if let Some(existing) = &existing {
            percentage.max(existing.percentage)
        } else {
            percentage
        };

        let now = Utc::now().naive_utc();
        let status = ProcessStatus {
            tenant_id: tenant_id.to_string(),
            process_type: process_type.to_string(),
            state: state.to_string(),
            percentage,
            message: message.to_string(),
            stage: stage.to_string(),
            total_items: existing.as_ref().and_then(|e| e.total_items),
            processed_items: existing.as_ref().and_then(|e| e.processed_items),
            last_update: Some(now),
            start: existing.as_ref().and_then(|e| e.start).or(Some(now)),
            end: if matches!(state, "completed" | "failed") {
                Some(now)
            } else {
                existing.as_ref().and_then(|e| e.end)
            },
            error: if state == "failed" {
                Some(message.to_string())
            } else {
                None
            },
        };

        self.db.upsert_process_status(&status).await
    }

    /// Subscribe a new SSE session to `tenant_id`'s events. The returned
    /// receiver starts empty; callers must emit a `connection` frame
    /// themselves.
    pub fn subscribe(&self, tenant_id: &str) -> broadcast::Receiver<PublishedEvent> {
        let mut subscribers = match self.subscribers.write() {
            Ok(guard) => guard,
            Err(e) => {
                warn!("progress bus subscriber map poisoned: {e}");
                e.into_inner()
            }
        };
        subscribers
            .entry(tenant_id.to_string())
            .or_insert_with(|| broadcast::channel(256).0)
            .subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_upserts_process_status_and_fans_out() {
        let db = Database::new_in_memory().await.unwrap();
        let bus = ProgressBus::new(db);

        let mut rx = bus.subscribe("t1");
        bus.publish(
            "t1",
            ProgressEvent::UploadProgress {
                job_id: "j1".into(),
                file_name: "notes.csv".into(),
                processed_records: 10,
                total_records: 100,
                rate: 5.0,
                eta: Some(18.0),
                percentage: 10.0,
            },
        )
        .await;

        let received = rx.try_recv().unwrap();
        assert_eq!(received.tenant_id, "t1");
        assert!(received.json.contains("upload_progress"));
    }

    #[tokio::test]
    async fn percentage_never_regresses_outside_reset_states() {
        let db = Database::new_in_memory().await.unwrap();
        let bus = ProgressBus::new(db);

        bus.publish(
            "t1",
            ProgressEvent::ExtractionProgress {
                batch: 2,
                total_batches: 10,
                batch_progress: 1.0,
                overall_progress: 0.5,
                message: "halfway".into(),
            },
        )
        .await;
        bus.publish(
            "t1",
            ProgressEvent::ExtractionProgress {
                batch: 1,
                total_batches: 10,
                batch_progress: 0.1,
                overall_progress: 0.1,
                message: "regressed".into(),
            },
        )
        .await;

        let status = bus.db.latest_process_status("t1", "extraction").await.unwrap().unwrap();
        assert_eq!(status.percentage, 50);
    }

    #[tokio::test]
    async fn failed_state_is_allowed_to_reset_percentage() {
        let db = Database::new_in_memory().await.unwrap();
        let bus = ProgressBus::new(db);

        bus.publish(
            "t1",
            ProgressEvent::ExtractionProgress {
                batch: 5,
                total_batches: 10,
                batch_progress: 1.0,
                overall_progress: 0.9,
                message: "almost done".into(),
            },
        )
        .await;
        bus.publish("t1", ProgressEvent::ExtractionError { message: "boom".into() }).await;

        let status = bus.db.latest_process_status("t1", "extraction").await.unwrap().unwrap();
        assert_eq!(status.state, "failed");
        assert_eq!(status.percentage, 0);
    }
}
