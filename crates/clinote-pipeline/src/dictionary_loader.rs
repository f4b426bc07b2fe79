// crates/clinote-pipeline/src/dictionary_loader.rs
//! Dictionary loader. Reads the tenant's symptom master from the store,
//! falling back to a seed CSV, and reconciles id collisions and exact
//! duplicates before the set ever reaches the pattern index.

use std::collections::{HashMap, HashSet};

use clinote_core::model::{DictionaryEntry, EntryKind, HrsnCategory};
use clinote_core::{CoreError, CoreResult};
use clinote_db::Database;
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct SeedRow {
    symptom_id: String,
    segment: String,
    diagnosis: Option<String>,
    diagnosis_code: Option<String>,
    diagnostic_category: Option<String>,
    kind: String,
    hrsn_code: Option<String>,
    hrsn_mapping: Option<String>,
}

fn read_seed_file(path: &str, tenant_id: &str) -> CoreResult<Vec<DictionaryEntry>> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| {
        warn!(path, error = %e, "dictionary seed file unavailable");
        CoreError::DictionaryUnavailable {
            tenant_id: tenant_id.to_string(),
        }
    })?;

    let mut entries = Vec::new();
    for record in reader.deserialize::<SeedRow>() {
        let row = record.map_err(|_| CoreError::DictionaryUnavailable {
            tenant_id: tenant_id.to_string(),
        })?;

        let segment = row.segment.trim().to_string();
        if segment.is_empty() {
            continue;
        }
        let Some(kind) = EntryKind::parse(&row.kind) else {
            warn!(symptom_id = %row.symptom_id, kind = %row.kind, "dropping seed row with unrecognized kind");
            continue;
        };
        let hrsn_mapping = row.hrsn_mapping.as_deref().and_then(HrsnCategory::parse);

        entries.push(DictionaryEntry {
            tenant_id: tenant_id.to_string(),
            symptom_id: row.symptom_id,
            segment,
            diagnosis: row.diagnosis,
            diagnosis_code: row.diagnosis_code,
            diagnostic_category: row.diagnostic_category,
            kind,
            hrsn_code: row.hrsn_code,
            hrsn_mapping,
        });
    }
    Ok(entries)
}

/// Drops exact duplicates and disambiguates `symptom_id` collisions by
/// suffixing `{original}_{n}`.
fn reconcile(entries: Vec<DictionaryEntry>) -> Vec<DictionaryEntry> {
    let mut seen_keys: HashSet<_> = HashSet::new();
    let mut used_ids: HashSet<String> = HashSet::new();
    let mut next_suffix: HashMap<String, u32> = HashMap::new();
    let mut reconciled = Vec::with_capacity(entries.len());

    for mut entry in entries {
        let key = (
            entry.symptom_id.clone(),
            entry.segment.clone(),
            entry.diagnosis.clone(),
            entry.diagnosis_code.clone(),
            entry.diagnostic_category.clone(),
            entry.kind,
            entry.hrsn_code.clone(),
            entry.hrsn_mapping,
        );
        if !seen_keys.insert(key) {
            continue;
        }

        if used_ids.contains(&entry.symptom_id) {
            let original = entry.symptom_id.clone();
            loop {
                let n = next_suffix.entry(original.clone()).or_insert(0);
                *n += 1;
                let candidate = format!("{original}_{n}");
                if !used_ids.contains(&candidate) {
                    entry.symptom_id = candidate;
                    break;
                }
            }
        }
        used_ids.insert(entry.symptom_id.clone());
        reconciled.push(entry);
    }
    reconciled
}

/// Reads the tenant's stored dictionary, falls back to the seed CSV when
/// empty, reconciles the result, persists it back, and returns it.
pub async fn load(db: &Database, tenant_id: &str, seed_path: &str) -> CoreResult<Vec<DictionaryEntry>> {
    let stored = db
        .load_dictionary(tenant_id)
        .await
        .map_err(|_| CoreError::DictionaryUnavailable {
            tenant_id: tenant_id.to_string(),
        })?;
    if !stored.is_empty() {
        return Ok(stored);
    }

    info!(tenant_id, seed_path, "tenant dictionary empty; loading seed file");
    let raw = read_seed_file(seed_path, tenant_id)?;
    let reconciled = reconcile(raw);

    db.bulk_upsert_dictionary(&reconciled)
        .await
        .map_err(|_| CoreError::DictionaryUnavailable {
            tenant_id: tenant_id.to_string(),
        })?;

    Ok(reconciled)
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

    #[test]
    fn exact_duplicate_is_dropped() {
        let entries = vec![entry("S1", "hopelessness"), entry("S1", "hopelessness")];
        let reconciled = reconcile(entries);
        assert_eq!(reconciled.len(), 1);
    }

    #[test]
    fn id_collision_with_differing_segment_is_suffixed() {
        let entries = vec![entry("X", "hopelessness"), entry("X", "anxiety")];
        let reconciled = reconcile(entries);
        assert_eq!(reconciled.len(), 2);
        assert_eq!(reconciled[0].symptom_id, "X");
        assert_eq!(reconciled[1].symptom_id, "X_1");
    }

    #[test]
    fn repeated_reconciliation_of_the_same_input_is_idempotent() {
        let entries = vec![entry("X", "hopelessness"), entry("X", "anxiety")];
        let first = reconcile(entries.clone());
        let second = reconcile(entries);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn missing_store_and_seed_file_yields_dictionary_unavailable() {
        let db = Database::new_in_memory().await.unwrap();
        let err = load(&db, "t1", "/nonexistent/seed.csv").await.unwrap_err();
        assert!(matches!(err, CoreError::DictionaryUnavailable { .. }));
    }
}
