// crates/clinote-db/src/queries/recovery.rs
//! Recovery operations. All operations are tenant-scoped and idempotent.

use chrono::Utc;

use crate::{Database, DbResult};

impl Database {
    pub async fn clear_mentions(&self, tenant_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM mentions WHERE tenant_id = ?1")
            .bind(tenant_id)
            .execute(self.pool())
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn reset_status(&self, tenant_id: &str, process_type: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO process_status (tenant_id, process_type, state, percentage, message, stage, last_update)
            VALUES (?1, ?2, 'ready', 0, 'Reset', 'ready', ?3)
            ON CONFLICT(tenant_id, process_type) DO UPDATE SET
                state = 'ready',
                percentage = 0,
                message = 'Reset',
                stage = 'ready',
                last_update = excluded.last_update,
                error = NULL
            "#,
        )
        .bind(tenant_id)
        .bind(process_type)
        .bind(Utc::now().naive_utc().format("%Y-%m-%dT%H:%M:%S%.f").to_string())
        .execute(self.pool())
        .await?;
        Ok(())
    }

    /// Deletes all data for a tenant. Order matters: children before
    /// parents, per the foreign-key cascade direction.
    pub async fn purge_tenant(&self, tenant_id: &str) -> DbResult<()> {
        let mut tx = self.pool().begin().await?;
        sqlx::query("DELETE FROM mentions WHERE tenant_id = ?1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM notes WHERE tenant_id = ?1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM patients WHERE tenant_id = ?1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM upload_tracking WHERE tenant_id = ?1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM process_status WHERE tenant_id = ?1")
            .bind(tenant_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use clinote_core::model::{Demographics, Note, Patient};

    #[tokio::test]
    async fn purge_tenant_removes_all_rows() {
        let db = Database::new_in_memory().await.unwrap();
        db.bulk_upsert_patients(&[Patient {
            tenant_id: "t1".into(),
            patient_id: "P1".into(),
            display_name: None,
            demographics: Demographics::default(),
        }])
        .await
        .unwrap();
        db.bulk_upsert_notes(&[Note {
            id: "n1".into(),
            tenant_id: "t1".into(),
            patient_id: "P1".into(),
            date_of_service: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            text: "note text".into(),
            provider_id: None,
        }])
        .await
        .unwrap();

        db.purge_tenant("t1").await.unwrap();

        assert_eq!(db.count_patients("t1").await.unwrap(), 0);
        assert_eq!(db.count_notes("t1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reset_status_is_idempotent() {
        let db = Database::new_in_memory().await.unwrap();
        db.reset_status("t1", "extraction").await.unwrap();
        db.reset_status("t1", "extraction").await.unwrap();
        let status = db.latest_process_status("t1", "extraction").await.unwrap().unwrap();
        assert_eq!(status.state, "ready");
        assert_eq!(status.percentage, 0);
    }
}
