// crates/clinote-db/src/queries/patients.rs
//! Patient upsert: (tenant_id, patient_id) is immutable once inserted; a
//! conflicting insert is skipped, never updated.

use clinote_core::model::Patient;

use crate::queries::batch::BatchResult;
use crate::{retry, Database, DbResult};

const BATCH_SIZE: usize = 1_000;

impl Database {
    /// Bulk-inserts patients in batches of `BATCH_SIZE`, attempting one
    /// multi-row statement per batch with a per-row fallback on failure.
    pub async fn bulk_upsert_patients(&self, patients: &[Patient]) -> DbResult<BatchResult> {
        let mut total = BatchResult::default();
        for chunk in patients.chunks(BATCH_SIZE) {
            total = total.merge(self.upsert_patient_chunk(chunk).await?);
        }
        Ok(total)
    }

    async fn upsert_patient_chunk(&self, chunk: &[Patient]) -> DbResult<BatchResult> {
        let result = retry::with_retry(3, || self.insert_patients_multi_row(chunk)).await;
        match result {
            Ok(rows_affected) => Ok(BatchResult {
                inserted: rows_affected,
                skipped: chunk.len() as u64 - rows_affected,
                failed: 0,
            }),
            Err(_) => self.insert_patients_row_by_row(chunk).await,
        }
    }

    async fn insert_patients_multi_row(&self, chunk: &[Patient]) -> Result<u64, sqlx::Error> {
        if chunk.is_empty() {
            return Ok(0);
        }
        let mut builder = sqlx::QueryBuilder::new(
            "INSERT INTO patients (tenant_id, patient_id, display_name, age_bucket, gender, race, ethnicity, zip, education, veteran_status) ",
        );
        builder.push_values(chunk, |mut b, p| {
            b.push_bind(&p.tenant_id)
                .push_bind(&p.patient_id)
                .push_bind(&p.display_name)
                .push_bind(&p.demographics.age_bucket)
                .push_bind(&p.demographics.gender)
                .push_bind(&p.demographics.race)
                .push_bind(&p.demographics.ethnicity)
                .push_bind(&p.demographics.zip)
                .push_bind(&p.demographics.education)
                .push_bind(&p.demographics.veteran_status);
        });
        builder.push(" ON CONFLICT(tenant_id, patient_id) DO NOTHING");
        let result = builder.build().execute(self.pool()).await?;
        Ok(result.rows_affected())
    }

    async fn insert_patients_row_by_row(&self, chunk: &[Patient]) -> DbResult<BatchResult> {
        let mut result = BatchResult::default();
        for p in chunk {
            let row = sqlx::query(
                r#"
                INSERT INTO patients (tenant_id, patient_id, display_name, age_bucket, gender, race, ethnicity, zip, education, veteran_status)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                ON CONFLICT(tenant_id, patient_id) DO NOTHING
                "#,
            )
            .bind(&p.tenant_id)
            .bind(&p.patient_id)
            .bind(&p.display_name)
            .bind(&p.demographics.age_bucket)
            .bind(&p.demographics.gender)
            .bind(&p.demographics.race)
            .bind(&p.demographics.ethnicity)
            .bind(&p.demographics.zip)
            .bind(&p.demographics.education)
            .bind(&p.demographics.veteran_status)
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

    pub async fn count_patients(&self, tenant_id: &str) -> DbResult<i64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM patients WHERE tenant_id = ?1")
                .bind(tenant_id)
                .fetch_one(self.pool())
                .await?;
        Ok(row.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clinote_core::model::Demographics;

    fn patient(tenant: &str, id: &str) -> Patient {
        Patient {
            tenant_id: tenant.into(),
            patient_id: id.into(),
            display_name: Some("Jane Doe".into()),
            demographics: Demographics::default(),
        }
    }

    #[tokio::test]
    async fn duplicate_patient_insert_is_skipped() {
        let db = Database::new_in_memory().await.unwrap();
        let p = patient("t1", "P1");
        let first = db.bulk_upsert_patients(&[p.clone()]).await.unwrap();
        assert_eq!(first.inserted, 1);
        let second = db.bulk_upsert_patients(&[p]).await.unwrap();
        assert_eq!(second.inserted, 0);
        assert_eq!(second.skipped, 1);
        assert_eq!(db.count_patients("t1").await.unwrap(), 1);
    }
}
