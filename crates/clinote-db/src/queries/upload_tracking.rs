// crates/clinote-db/src/queries/upload_tracking.rs
//! Upload-tracking records: one row per completed upload, recording the
//! source file, tenant, counts, and timing.

use chrono::Utc;

use crate::{Database, DbResult};

#[derive(Debug, Clone)]
pub struct UploadRecord {
    pub upload_id: String,
    pub tenant_id: String,
    pub file_name: String,
    pub processed_records: i64,
    pub new_patients: i64,
    pub new_notes: i64,
    pub duration_ms: i64,
}

impl Database {
    pub async fn record_upload(&self, record: &UploadRecord) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO upload_tracking (
                upload_id, tenant_id, file_name, processed_records, new_patients,
                new_notes, duration_ms, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(upload_id) DO NOTHING
            "#,
        )
        .bind(&record.upload_id)
        .bind(&record.tenant_id)
        .bind(&record.file_name)
        .bind(record.processed_records)
        .bind(record.new_patients)
        .bind(record.new_notes)
        .bind(record.duration_ms)
        .bind(Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }
}
