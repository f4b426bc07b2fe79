// crates/clinote-pipeline/src/uploader.rs
//! Minimal normalized-note-record uploader. The Job Manager treats this as
//! the external collaborator referenced in the upload job lifecycle: it
//! reads a CSV of note rows and bulk-inserts Patients and Notes, reporting
//! progress as it goes. Parsing richer upload formats (XLSX, vendor-specific
//! CSV dialects) is out of scope; this exists only to drive the pipeline.

use std::time::Instant;

use clinote_core::model::{Demographics, Note, Patient};
use clinote_core::{CoreError, CoreResult};
use clinote_db::Database;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
struct UploadRow {
    patient_id: String,
    date_of_service: String,
    text: String,
    provider_id: Option<String>,
    display_name: Option<String>,
    age_bucket: Option<String>,
    gender: Option<String>,
    race: Option<String>,
    ethnicity: Option<String>,
    zip: Option<String>,
    education: Option<String>,
    veteran_status: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UploadOutcome {
    pub processed_records: u64,
    pub new_patients: u64,
    pub new_notes: u64,
    pub duration_ms: u64,
}

/// Reads `file_path` as a CSV of normalized note records for `tenant_id`,
/// bulk-upserting patients and notes.
pub async fn run(
    db: &Database,
    tenant_id: &str,
    file_path: &str,
    mut on_progress: impl FnMut(u64, u64),
) -> CoreResult<UploadOutcome> {
    let start = Instant::now();
    let mut reader = csv::Reader::from_path(file_path).map_err(|e| {
        CoreError::Validation(format!("cannot open upload file {file_path}: {e}"))
    })?;

    let rows: Vec<UploadRow> = reader
        .deserialize::<UploadRow>()
        .filter_map(|r| match r {
            Ok(row) => Some(row),
            Err(e) => {
                warn!(error = %e, "dropping malformed upload row");
                None
            }
        })
        .collect();

    let total = rows.len() as u64;
    let mut patients = Vec::with_capacity(rows.len());
    let mut notes = Vec::with_capacity(rows.len());

    for (i, row) in rows.into_iter().enumerate() {
        let Ok(date_of_service) = chrono::NaiveDate::parse_from_str(&row.date_of_service, "%Y-%m-%d") else {
            warn!(patient_id = %row.patient_id, date = %row.date_of_service, "dropping row with unparseable date");
            continue;
        };

        patients.push(Patient {
            tenant_id: tenant_id.to_string(),
            patient_id: row.patient_id.clone(),
            display_name: row.display_name,
            demographics: Demographics {
                age_bucket: row.age_bucket,
                gender: row.gender,
                race: row.race,
                ethnicity: row.ethnicity,
                zip: row.zip,
                education: row.education,
                veteran_status: row.veteran_status,
            },
        });
        notes.push(Note {
            id: format!("{tenant_id}-{}-{}", row.patient_id, i),
            tenant_id: tenant_id.to_string(),
            patient_id: row.patient_id,
            date_of_service,
            text: row.text,
            provider_id: row.provider_id,
        });

        on_progress(i as u64 + 1, total);
    }

    patients.sort_by(|a, b| a.patient_id.cmp(&b.patient_id));
    patients.dedup_by(|a, b| a.patient_id == b.patient_id);

    let patient_result = db
        .bulk_upsert_patients(&patients)
        .await
        .map_err(|e| CoreError::Validation(e.to_string()))?;
    let note_result = db
        .bulk_upsert_notes(&notes)
        .await
        .map_err(|e| CoreError::Validation(e.to_string()))?;

    Ok(UploadOutcome {
        processed_records: total,
        new_patients: patient_result.inserted,
        new_notes: note_result.inserted,
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn well_formed_csv_inserts_patients_and_notes() {
        let db = Database::new_in_memory().await.unwrap();
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "patient_id,date_of_service,text,provider_id,display_name,age_bucket,gender,race,ethnicity,zip,education,veteran_status").unwrap();
        writeln!(file, "P1,2025-01-01,patient reports anxiety,,,,,,,,,,").unwrap();
        writeln!(file, "P2,2025-01-02,patient feels hopeless,,,,,,,,,,").unwrap();

        let mut calls = 0;
        let outcome = run(&db, "t1", file.path().to_str().unwrap(), |_, _| calls += 1)
            .await
            .unwrap();

        assert_eq!(outcome.processed_records, 2);
        assert_eq!(outcome.new_patients, 2);
        assert_eq!(outcome.new_notes, 2);
        assert_eq!(calls, 2);
    }

    #[tokio::test]
    async fn missing_file_yields_validation_error() {
        let db = Database::new_in_memory().await.unwrap();
        let err = run(&db, "t1", "/nonexistent/upload.csv", |_, _| {})
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
