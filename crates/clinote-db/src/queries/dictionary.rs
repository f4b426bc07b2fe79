// crates/clinote-db/src/queries/dictionary.rs
//! Dictionary persistence: upsert key (tenant_id, symptom_id); used by the
//! dictionary loader to make reconciled loads idempotent.

use clinote_core::model::{DictionaryEntry, EntryKind, HrsnCategory};

use crate::queries::batch::BatchResult;
use crate::{retry, Database, DbResult};

const BATCH_SIZE: usize = 500;

#[derive(sqlx::FromRow)]
struct DictionaryRow {
    tenant_id: String,
    symptom_id: String,
    segment: String,
    diagnosis: Option<String>,
    diagnosis_code: Option<String>,
    diagnostic_category: Option<String>,
    kind: String,
    hrsn_code: Option<String>,
    hrsn_mapping: Option<String>,
}

impl From<DictionaryRow> for DictionaryEntry {
    fn from(row: DictionaryRow) -> Self {
        DictionaryEntry {
            tenant_id: row.tenant_id,
            symptom_id: row.symptom_id,
            segment: row.segment,
            diagnosis: row.diagnosis,
            diagnosis_code: row.diagnosis_code,
            diagnostic_category: row.diagnostic_category,
            kind: EntryKind::parse(&row.kind).unwrap_or(EntryKind::Symptom),
            hrsn_code: row.hrsn_code,
            hrsn_mapping: row.hrsn_mapping.as_deref().and_then(HrsnCategory::parse),
        }
    }
}

impl Database {
    pub async fn bulk_upsert_dictionary(
        &self,
        entries: &[DictionaryEntry],
    ) -> DbResult<BatchResult> {
        let mut total = BatchResult::default();
        for chunk in entries.chunks(BATCH_SIZE) {
            total = total.merge(self.upsert_dictionary_chunk(chunk).await?);
        }
        Ok(total)
    }

    async fn upsert_dictionary_chunk(&self, chunk: &[DictionaryEntry]) -> DbResult<BatchResult> {
        match retry::with_retry(3, || self.insert_dictionary_multi_row(chunk)).await {
            Ok(rows_affected) => Ok(BatchResult {
                inserted: rows_affected,
                skipped: chunk.len() as u64 - rows_affected,
                failed: 0,
            }),
            Err(_) => self.insert_dictionary_row_by_row(chunk).await,
        }
    }

    async fn insert_dictionary_multi_row(
        &self,
        chunk: &[DictionaryEntry],
    ) -> Result<u64, sqlx::Error> {
        if chunk.is_empty() {
            return Ok(0);
        }
        let mut builder = sqlx::QueryBuilder::new(
            "INSERT INTO dictionary (tenant_id, symptom_id, segment, diagnosis, diagnosis_code, diagnostic_category, kind, hrsn_code, hrsn_mapping) ",
        );
        builder.push_values(chunk, |mut b, e| {
            b.push_bind(&e.tenant_id)
                .push_bind(&e.symptom_id)
                .push_bind(&e.segment)
                .push_bind(&e.diagnosis)
                .push_bind(&e.diagnosis_code)
                .push_bind(&e.diagnostic_category)
                .push_bind(e.kind.as_str())
                .push_bind(&e.hrsn_code)
                .push_bind(e.hrsn_mapping.map(|c| c.as_str()));
        });
        builder.push(" ON CONFLICT(tenant_id, symptom_id) DO NOTHING");
        let result = builder.build().execute(self.pool()).await?;
        Ok(result.rows_affected())
    }

    async fn insert_dictionary_row_by_row(
        &self,
        chunk: &[DictionaryEntry],
    ) -> DbResult<BatchResult> {
        let mut result = BatchResult::default();
        for e in chunk {
            let row = sqlx::query(
                r#"
                INSERT INTO dictionary (tenant_id, symptom_id, segment, diagnosis, diagnosis_code, diagnostic_category, kind, hrsn_code, hrsn_mapping)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(tenant_id, symptom_id) DO NOTHING
                "#,
            )
            .bind(&e.tenant_id)
            .bind(&e.symptom_id)
            .bind(&e.segment)
            .bind(&e.diagnosis)
            .bind(&e.diagnosis_code)
            .bind(&e.diagnostic_category)
            .bind(e.kind.as_str())
            .bind(&e.hrsn_code)
            .bind(e.hrsn_mapping.map(|c| c.as_str()))
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

    /// Reads the stored dictionary for a tenant; empty means "fall back to
    /// the seed file".
    pub async fn load_dictionary(&self, tenant_id: &str) -> DbResult<Vec<DictionaryEntry>> {
        let rows: Vec<DictionaryRow> = sqlx::query_as(
            r#"
            SELECT tenant_id, symptom_id, segment, diagnosis, diagnosis_code, diagnostic_category, kind, hrsn_code, hrsn_mapping
            FROM dictionary WHERE tenant_id = ?1
            "#,
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(DictionaryEntry::from).collect())
    }

    pub async fn count_dictionary_entries(&self, tenant_id: &str) -> DbResult<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM dictionary WHERE tenant_id = ?1")
                .bind(tenant_id)
                .fetch_one(self.pool())
                .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, segment: &str) -> DictionaryEntry {
        DictionaryEntry {
            tenant_id: "t1".into(),
            symptom_id: id.into(),
            segment: segment.into(),
            diagnosis: None,
            diagnosis_code: None,
            diagnostic_category: None,
            kind: EntryKind::Symptom,
            hrsn_code: None,
            hrsn_mapping: None,
        }
    }

    #[tokio::test]
    async fn reload_of_same_dictionary_is_idempotent() {
        let db = Database::new_in_memory().await.unwrap();
        let entries = vec![entry("S1", "hopelessness"), entry("S2", "anxiety")];
        db.bulk_upsert_dictionary(&entries).await.unwrap();
        let second = db.bulk_upsert_dictionary(&entries).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(db.count_dictionary_entries("t1").await.unwrap(), 2);
    }
}
