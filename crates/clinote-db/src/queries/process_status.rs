// crates/clinote-db/src/queries/process_status.rs
//! Progress bus durable sink: the "latest status" row per
//! (tenant_id, process_type). Monotonicity on `percentage` is enforced by
//! the caller (`clinote-server`'s progress bus), not here — this module is
//! a plain upsert/read layer.

use chrono::NaiveDateTime;
use clinote_core::model::ProcessStatus;

use crate::{Database, DbResult};

#[derive(sqlx::FromRow)]
struct ProcessStatusRow {
    tenant_id: String,
    process_type: String,
    state: String,
    percentage: i64,
    message: String,
    stage: String,
    total_items: Option<i64>,
    processed_items: Option<i64>,
    last_update: Option<String>,
    start: Option<String>,
    end: Option<String>,
    error: Option<String>,
}

fn parse_dt(s: &Option<String>) -> Option<NaiveDateTime> {
    s.as_deref()
        .and_then(|v| NaiveDateTime::parse_from_str(v, "%Y-%m-%dT%H:%M:%S%.f").ok())
}

impl From<ProcessStatusRow> for ProcessStatus {
    fn from(row: ProcessStatusRow) -> Self {
        ProcessStatus {
            tenant_id: row.tenant_id,
            process_type: row.process_type,
            state: row.state,
            percentage: row.percentage as i32,
            message: row.message,
            stage: row.stage,
            total_items: row.total_items,
            processed_items: row.processed_items,
            last_update: parse_dt(&row.last_update),
            start: parse_dt(&row.start),
            end: parse_dt(&row.end),
            error: row.error,
        }
    }
}

impl Database {
    pub async fn upsert_process_status(&self, status: &ProcessStatus) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO process_status (
                tenant_id, process_type, state, percentage, message, stage,
                total_items, processed_items, last_update, start, end, error
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(tenant_id, process_type) DO UPDATE SET
                state = excluded.state,
                percentage = excluded.percentage,
                message = excluded.message,
                stage = excluded.stage,
                total_items = excluded.total_items,
                processed_items = excluded.processed_items,
                last_update = excluded.last_update,
                start = COALESCE(process_status.start, excluded.start),
                end = excluded.end,
                error = excluded.error
            "#,
        )
        .bind(&status.tenant_id)
        .bind(&status.process_type)
        .bind(&status.state)
        .bind(status.percentage as i64)
        .bind(&status.message)
        .bind(&status.stage)
        .bind(status.total_items)
        .bind(status.processed_items)
        .bind(status.last_update.map(|d| d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
        .bind(status.start.map(|d| d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
        .bind(status.end.map(|d| d.format("%Y-%m-%dT%H:%M:%S%.f").to_string()))
        .bind(&status.error)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn latest_process_status(
        &self,
        tenant_id: &str,
        process_type: &str,
    ) -> DbResult<Option<ProcessStatus>> {
        let row: Option<ProcessStatusRow> = sqlx::query_as(
            "SELECT * FROM process_status WHERE tenant_id = ?1 AND process_type = ?2",
        )
        .bind(tenant_id)
        .bind(process_type)
        .fetch_optional(self.pool())
        .await?;
        Ok(row.map(ProcessStatus::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn status(percentage: i32) -> ProcessStatus {
        ProcessStatus {
            tenant_id: "t1".into(),
            process_type: "extraction".into(),
            state: "running".into(),
            percentage,
            message: "working".into(),
            stage: "extracting".into(),
            total_items: Some(100),
            processed_items: Some(percentage as i64),
            last_update: Some(Utc::now().naive_utc()),
            start: Some(Utc::now().naive_utc()),
            end: None,
            error: None,
        }
    }

    #[tokio::test]
    async fn upsert_then_read_round_trips() {
        let db = Database::new_in_memory().await.unwrap();
        db.upsert_process_status(&status(10)).await.unwrap();
        db.upsert_process_status(&status(50)).await.unwrap();

        let latest = db
            .latest_process_status("t1", "extraction")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.percentage, 50);
    }
}
