// crates/clinote-db/src/queries/mentions.rs
//! Mention bulk upsert and reads. Upsert key: (tenant_id, patient_id,
//! segment, date_of_service, position_in_text) — duplicates collide and
//! are counted as skipped.

use chrono::{NaiveDate, NaiveDateTime};
use clinote_core::model::{EntryKind, HrsnFlags, Mention};

use crate::queries::batch::BatchResult;
use crate::{retry, Database, DbResult};

const BATCH_SIZE: usize = 1_000;

#[derive(sqlx::FromRow)]
struct MentionRow {
    mention_id: String,
    tenant_id: String,
    patient_id: String,
    date_of_service: String,
    symptom_id: String,
    segment: String,
    diagnosis: Option<String>,
    diagnosis_code: Option<String>,
    diagnostic_category: Option<String>,
    kind: String,
    hrsn_code: String,
    position_in_text: i64,
    present: String,
    detected: String,
    validated: String,
    housing_status: Option<String>,
    food_status: Option<String>,
    financial_status: Option<String>,
    transportation_needs: Option<String>,
    has_a_car: Option<String>,
    utility_insecurity: Option<String>,
    childcare_needs: Option<String>,
    elder_care_needs: Option<String>,
    employment_status: Option<String>,
    education_needs: Option<String>,
    legal_needs: Option<String>,
    social_isolation: Option<String>,
    created_at: String,
}

impl TryFrom<MentionRow> for Mention {
    type Error = chrono::ParseError;

    fn try_from(row: MentionRow) -> Result<Self, Self::Error> {
        Ok(Mention {
            mention_id: row.mention_id,
            tenant_id: row.tenant_id,
            patient_id: row.patient_id,
            date_of_service: NaiveDate::parse_from_str(&row.date_of_service, "%Y-%m-%d")?,
            symptom_id: row.symptom_id,
            segment: row.segment,
            diagnosis: row.diagnosis,
            diagnosis_code: row.diagnosis_code,
            diagnostic_category: row.diagnostic_category,
            kind: EntryKind::parse(&row.kind).unwrap_or(EntryKind::Symptom),
            hrsn_code: row.hrsn_code,
            position_in_text: row.position_in_text,
            present: row.present,
            detected: row.detected,
            validated: row.validated,
            hrsn_flags: HrsnFlags {
                housing_status: row.housing_status,
                food_status: row.food_status,
                financial_status: row.financial_status,
                transportation_needs: row.transportation_needs,
                has_a_car: row.has_a_car,
                utility_insecurity: row.utility_insecurity,
                childcare_needs: row.childcare_needs,
                elder_care_needs: row.elder_care_needs,
                employment_status: row.employment_status,
                education_needs: row.education_needs,
                legal_needs: row.legal_needs,
                social_isolation: row.social_isolation,
            },
            created_at: NaiveDateTime::parse_from_str(&row.created_at, "%Y-%m-%dT%H:%M:%S%.f")
                .or_else(|_| NaiveDateTime::parse_from_str(&row.created_at, "%Y-%m-%d %H:%M:%S%.f"))?,
        })
    }
}

/// (patient_id, distinct_segment_count) used for risk stratification.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow, serde::Serialize)]
pub struct PatientMentionCount {
    pub patient_id: String,
    pub distinct_segment_count: i64,
}

impl Database {
    pub async fn bulk_upsert_mentions(&self, mentions: &[Mention]) -> DbResult<BatchResult> {
        let mut total = BatchResult::default();
        for chunk in mentions.chunks(BATCH_SIZE) {
            total = total.merge(self.upsert_mentions_chunk(chunk).await?);
        }
        Ok(total)
    }

    async fn upsert_mentions_chunk(&self, chunk: &[Mention]) -> DbResult<BatchResult> {
        match retry::with_retry(3, || self.insert_mentions_multi_row(chunk)).await {
            Ok(rows_affected) => Ok(BatchResult {
                inserted: rows_affected,
                skipped: chunk.len() as u64 - rows_affected,
                failed: 0,
            }),
            Err(_) => self.insert_mentions_row_by_row(chunk).await,
        }
    }

    async fn insert_mentions_multi_row(&self, chunk: &[Mention]) -> Result<u64, sqlx::Error> {
        if chunk.is_empty() {
            return Ok(0);
        }
        let mut builder = sqlx::QueryBuilder::new(
            r#"INSERT INTO mentions (
                mention_id, tenant_id, patient_id, date_of_service, symptom_id, segment,
                diagnosis, diagnosis_code, diagnostic_category, kind, hrsn_code, position_in_text,
                present, detected, validated,
                housing_status, food_status, financial_status, transportation_needs, has_a_car,
                utility_insecurity, childcare_needs, elder_care_needs, employment_status,
                education_needs, legal_needs, social_isolation, created_at
            ) "#,
        );
        builder.push_values(chunk, |mut b, m| {
            b.push_bind(&m.mention_id)
                .push_bind(&m.tenant_id)
                .push_bind(&m.patient_id)
                .push_bind(m.date_of_service.format("%Y-%m-%d").to_string())
                .push_bind(&m.symptom_id)
                .push_bind(&m.segment)
                .push_bind(&m.diagnosis)
                .push_bind(&m.diagnosis_code)
                .push_bind(&m.diagnostic_category)
                .push_bind(m.kind.as_str())
                .push_bind(&m.hrsn_code)
                .push_bind(m.position_in_text)
                .push_bind(&m.present)
                .push_bind(&m.detected)
                .push_bind(&m.validated)
                .push_bind(&m.hrsn_flags.housing_status)
                .push_bind(&m.hrsn_flags.food_status)
                .push_bind(&m.hrsn_flags.financial_status)
                .push_bind(&m.hrsn_flags.transportation_needs)
                .push_bind(&m.hrsn_flags.has_a_car)
                .push_bind(&m.hrsn_flags.utility_insecurity)
                .push_bind(&m.hrsn_flags.childcare_needs)
                .push_bind(&m.hrsn_flags.elder_care_needs)
                .push_bind(&m.hrsn_flags.employment_status)
                .push_bind(&m.hrsn_flags.education_needs)
                .push_bind(&m.hrsn_flags.legal_needs)
                .push_bind(&m.hrsn_flags.social_isolation)
                .push_bind(m.created_at.format("%Y-%m-%dT%H:%M:%S%.f").to_string());
        });
        builder.push(
            " ON CONFLICT(tenant_id, patient_id, segment, date_of_service, position_in_text) DO NOTHING",
        );
        let result = builder.build().execute(self.pool()).await?;
        Ok(result.rows_affected())
    }

    async fn insert_mentions_row_by_row(&self, chunk: &[Mention]) -> DbResult<BatchResult> {
        let mut result = BatchResult::default();
        for m in chunk {
            let row = sqlx::query(
                r#"
                INSERT INTO mentions (
                    mention_id, tenant_id, patient_id, date_of_service, symptom_id, segment,
                    diagnosis, diagnosis_code, diagnostic_category, kind, hrsn_code, position_in_text,
                    present, detected, validated,
                    housing_status, food_status, financial_status, transportation_needs, has_a_car,
                    utility_insecurity, childcare_needs, elder_care_needs, employment_status,
                    education_needs, legal_needs, social_isolation, created_at
                ) VALUES (
                    ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                    ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28
                )
                ON CONFLICT(tenant_id, patient_id, segment, date_of_service, position_in_text) DO NOTHING
                "#,
            )
            .bind(&m.mention_id)
            .bind(&m.tenant_id)
            .bind(&m.patient_id)
            .bind(m.date_of_service.format("%Y-%m-%d").to_string())
            .bind(&m.symptom_id)
            .bind(&m.segment)
            .bind(&m.diagnosis)
            .bind(&m.diagnosis_code)
            .bind(&m.diagnostic_category)
            .bind(m.kind.as_str())
            .bind(&m.hrsn_code)
            .bind(m.position_in_text)
            .bind(&m.present)
            .bind(&m.detected)
            .bind(&m.validated)
            .bind(&m.hrsn_flags.housing_status)
            .bind(&m.hrsn_flags.food_status)
            .bind(&m.hrsn_flags.financial_status)
            .bind(&m.hrsn_flags.transportation_needs)
            .bind(&m.hrsn_flags.has_a_car)
            .bind(&m.hrsn_flags.utility_insecurity)
            .bind(&m.hrsn_flags.childcare_needs)
            .bind(&m.hrsn_flags.elder_care_needs)
            .bind(&m.hrsn_flags.employment_status)
            .bind(&m.hrsn_flags.education_needs)
            .bind(&m.hrsn_flags.legal_needs)
            .bind(&m.hrsn_flags.social_isolation)
            .bind(m.created_at.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
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

    pub async fn list_mentions_by_patient(
        &self,
        tenant_id: &str,
        patient_id: &str,
    ) -> DbResult<Vec<Mention>> {
        let rows: Vec<MentionRow> = sqlx::query_as(
            "SELECT * FROM mentions WHERE tenant_id = ?1 AND patient_id = ?2 ORDER BY date_of_service, position_in_text",
        )
        .bind(tenant_id)
        .bind(patient_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().filter_map(|r| Mention::try_from(r).ok()).collect())
    }

    pub async fn list_mentions_by_tenant(&self, tenant_id: &str) -> DbResult<Vec<Mention>> {
        let rows: Vec<MentionRow> = sqlx::query_as(
            "SELECT * FROM mentions WHERE tenant_id = ?1 ORDER BY patient_id, date_of_service, position_in_text",
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().filter_map(|r| Mention::try_from(r).ok()).collect())
    }

    pub async fn count_mentions(&self, tenant_id: &str) -> DbResult<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM mentions WHERE tenant_id = ?1")
            .bind(tenant_id)
            .fetch_one(self.pool())
            .await?;
        Ok(row.0)
    }

    /// Raw per-patient distinct-segment counts; bucketing into risk tiers
    /// is left to a report-layer collaborator outside this repo.
    pub async fn mentions_per_patient(&self, tenant_id: &str) -> DbResult<Vec<PatientMentionCount>> {
        let rows: Vec<PatientMentionCount> = sqlx::query_as(
            r#"
            SELECT patient_id, COUNT(DISTINCT segment) AS distinct_segment_count
            FROM mentions
            WHERE tenant_id = ?1
            GROUP BY patient_id
            ORDER BY distinct_segment_count DESC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(self.pool())
        .await?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn mention(patient: &str, segment: &str, position: i64) -> Mention {
        Mention {
            mention_id: format!("{patient}-{segment}-{position}"),
            tenant_id: "t1".into(),
            patient_id: patient.into(),
            date_of_service: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            symptom_id: "S1".into(),
            segment: segment.into(),
            diagnosis: None,
            diagnosis_code: None,
            diagnostic_category: None,
            kind: EntryKind::Symptom,
            hrsn_code: "No".into(),
            position_in_text: position,
            present: "Yes".into(),
            detected: "Yes".into(),
            validated: "Yes".into(),
            hrsn_flags: HrsnFlags::default(),
            created_at: Utc::now().naive_utc(),
        }
    }

    #[tokio::test]
    async fn duplicate_position_collides_and_is_skipped() {
        let db = Database::new_in_memory().await.unwrap();
        let m = mention("P1", "hopelessness", 0);
        db.bulk_upsert_mentions(&[m.clone()]).await.unwrap();
        let second = db.bulk_upsert_mentions(&[m]).await.unwrap();
        assert_eq!(second.skipped, 1);
        assert_eq!(db.count_mentions("t1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn mentions_per_patient_counts_distinct_segments() {
        let db = Database::new_in_memory().await.unwrap();
        db.bulk_upsert_mentions(&[
            mention("P1", "hopelessness", 0),
            mention("P1", "hopelessness", 20),
            mention("P1", "anxiety", 40),
        ])
        .await
        .unwrap();

        let counts = db.mentions_per_patient("t1").await.unwrap();
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[0].distinct_segment_count, 2);
    }
}
