// crates/clinote-db/src/queries/notes.rs
//! Note bulk upsert and reads. Upsert key: (tenant_id, patient_id,
//! date_of_service); conflicting inserts are skipped.

use chrono::NaiveDate;
use clinote_core::model::Note;

use crate::queries::batch::BatchResult;
use crate::{retry, Database, DbResult};

const BATCH_SIZE: usize = 1_000;

#[derive(sqlx::FromRow)]
struct NoteRow {
    id: String,
    tenant_id: String,
    patient_id: String,
    date_of_service: String,
    text: String,
    provider_id: Option<String>,
}

impl TryFrom<NoteRow> for Note {
    type Error = chrono::ParseError;

    fn try_from(row: NoteRow) -> Result<Self, Self::Error> {
        Ok(Note {
            id: row.id,
            tenant_id: row.tenant_id,
            patient_id: row.patient_id,
            date_of_service: NaiveDate::parse_from_str(&row.date_of_service, "%Y-%m-%d")?,
            text: row.text,
            provider_id: row.provider_id,
        })
    }
}

impl Database {
    pub async fn bulk_upsert_notes(&self, notes: &[Note]) -> DbResult<BatchResult> {
        let mut total = BatchResult::default();
        for chunk in notes.chunks(BATCH_SIZE) {
            total = total.merge(self.upsert_notes_chunk(chunk).await?);
        }
        Ok(total)
    }

    async fn upsert_notes_chunk(&self, chunk: &[Note]) -> DbResult<BatchResult> {
        match retry::with_retry(3, || self.insert_notes_multi_row(chunk)).await {
            Ok(rows_affected) => Ok(BatchResult {
                inserted: rows_affected,
                skipped: chunk.len() as u64 - rows_affected,
                failed: 0,
            }),
            Err(_) => self.insert_notes_row_by_row(chunk).await,
        }
    }

    async fn insert_notes_multi_row(&self, chunk: &[Note]) -> Result<u64, sqlx::Error> {
        if chunk.is_empty() {
            return Ok(0);
        }
        let mut builder = sqlx::QueryBuilder::new(
            "INSERT INTO notes (id, tenant_id, patient_id, date_of_service, text, provider_id) ",
        );
        builder.push_values(chunk, |mut b, n| {
            b.push_bind(&n.id)
                .push_bind(&n.tenant_id)
                .push_bind(&n.patient_id)
                .push_bind(n.date_of_service.format("%Y-%m-%d").to_string())
                .push_bind(&n.text)
                .push_bind(&n.provider_id);
        });
        builder.push(" ON CONFLICT(tenant_id, patient_id, date_of_service) DO NOTHING");
        let result = builder.build().execute(self.pool()).await?;
        Ok(result.rows_affected())
    }

    async fn insert_notes_row_by_row(&self, chunk: &[Note]) -> DbResult<BatchResult> {
        let mut result = BatchResult::default();
        for n in chunk {
            let row = sqlx::query(
                r#"
                INSERT INTO notes (id, tenant_id, patient_id, date_of_service, text, provider_id)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(tenant_id, patient_id, date_of_service) DO NOTHING
                "#,
            )
            .bind(&n.id)
            .bind(&n.tenant_id)
            .bind(&n.patient_id)
            .bind(n.date_of_service.format("%Y-%m-%d").to_string())
            .bind(&n.text)
            .bind(&n.provider_id)
            .execute(self.pool())
            .await;

            match row {
                Ok(r) if r.rows_affected() > 0 => result.inserted += 1,
                Ok(_) => result.skipped += 1,
                Err(_) => result.failed += 1,
            }
        }
        Ok(result)
    }

    /// Lists notes for a tenant, optionally paginated via `limit`/`offset`.
    pub async fn list_notes_by_tenant(
        &self,
        tenant_id: &str,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> DbResult<Vec<Note>> {
        let rows: Vec<NoteRow> = sqlx::query_as(
            r#"
            SELECT id, tenant_id, patient_id, date_of_service, text, provider_id
            FROM notes WHERE tenant_id = ?1
            ORDER BY date_of_service DESC
            LIMIT ?2 OFFSET ?3
            "#,
        )
        .bind(tenant_id)
        .bind(limit.unwrap_or(i64::MAX))
        .bind(offset.unwrap_or(0))
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| Note::try_from(r).ok())
            .collect())
    }

    /// Candidate notes for an extraction attempt: tenant notes belonging to
    /// a patient who has no mention yet.
    pub async fn notes_pending_extraction(&self, tenant_id: &str) -> DbResult<Vec<Note>> {
        let rows: Vec<NoteRow> = sqlx::query_as(
            r#"
            SELECT n.id, n.tenant_id, n.patient_id, n.date_of_service, n.text, n.provider_id
            FROM notes n
            WHERE n.tenant_id = ?1
            AND NOT EXISTS (
                SELECT 1 FROM mentions m
                WHERE m.tenant_id = n.tenant_id AND m.patient_id = n.patient_id
            )
            "#,
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows
            .into_iter()
            .filter_map(|r| Note::try_from(r).ok())
            .collect())
    }

    pub async fn count_notes(&self, tenant_id: &str) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM notes WHERE tenant_id = ?1")
            .bind(tenant_id)
            .fetch_one(self.pool())
            .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(tenant: &str, patient: &str, date: &str) -> Note {
        Note {
            id: format!("{tenant}-{patient}-{date}"),
            tenant_id: tenant.into(),
            patient_id: patient.into(),
            date_of_service: NaiveDate::parse_from_str(date, "%Y-%m-%d").unwrap(),
            text: "patient denies any issues".into(),
            provider_id: None,
        }
    }

    #[tokio::test]
    async fn conflicting_note_insert_is_skipped() {
        let db = Database::new_in_memory().await.unwrap();
        let n = note("t1", "P1", "2025-01-01");
        db.bulk_upsert_notes(&[n.clone()]).await.unwrap();
        let second = db.bulk_upsert_notes(&[n]).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 1);
    }

    #[tokio::test]
    async fn notes_pending_extraction_excludes_patients_with_mentions() {
        let db = Database::new_in_memory().await.unwrap();
        let n1 = note("t1", "P1", "2025-01-01");
        let n2 = note("t1", "P2", "2025-01-02");
        db.bulk_upsert_notes(&[n1.clone(), n2.clone()]).await.unwrap();

        let pending = db.notes_pending_extraction("t1").await.unwrap();
        assert_eq!(pending.len(), 2);
    }
}
