//! Note extractor.
//!
//! Pure function over a single note plus the pre-built [`Index`]; emits one
//! [`Mention`] per non-overlapping occurrence of each candidate segment.

use std::collections::HashSet;

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::error::{CoreError, CoreResult};
use crate::model::{
    EntryKind, HrsnFlags, Mention, Note, HRSN_CODE_NONE, HRSN_CODE_ZCODE,
};
use crate::pattern_index::Index;

fn stable_mention_id(
    tenant_id: &str,
    patient_id: &str,
    segment_lower: &str,
    date_of_service: &chrono::NaiveDate,
    position: i64,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(tenant_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(patient_id.as_bytes());
    hasher.update(b"\0");
    hasher.update(segment_lower.as_bytes());
    hasher.update(b"\0");
    hasher.update(date_of_service.to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(position.to_le_bytes());
    format!("{:x}", hasher.finalize())
}

/// Enumerates every occurrence of every index candidate in `note.text` and
/// returns the resulting mentions in candidate-dispatch order.
pub fn extract(note: &Note, index: &Index, tenant_id: &str) -> CoreResult<Vec<Mention>> {
    let candidates = index.candidates(&note.text);
    if candidates.is_empty() {
        return Ok(Vec::new());
    }

    let lower_text = note.text.to_lowercase();
    let mut scanned_segments: HashSet<String> = HashSet::new();
    let mut seen_positions: HashSet<(String, i64)> = HashSet::new();
    let mut mentions = Vec::new();

    for entry in candidates {
        let segment_lower = entry.segment.to_lowercase();
        if segment_lower.is_empty() {
            continue;
        }
        // A segment text already scanned under an earlier (longer-or-equal)
        // candidate produces identical occurrence positions; skip so two
        // entries sharing segment text collapse to one Mention per
        // position.
        if !scanned_segments.insert(segment_lower.clone()) {
            continue;
        }

        let mut cursor = 0usize;
        while cursor <= lower_text.len() {
            let Some(offset) = lower_text[cursor..].find(segment_lower.as_str()) else {
                break;
            };
            let position = (cursor + offset) as i64;
            let key = (segment_lower.clone(), position);
            if seen_positions.insert(key) {
                let hrsn_flags = match (entry.kind, entry.hrsn_mapping) {
                    (EntryKind::Problem, Some(category)) => HrsnFlags::set(category),
                    _ => HrsnFlags::default(),
                };
                let hrsn_code = match entry.kind {
                    EntryKind::Problem => HRSN_CODE_ZCODE.to_string(),
                    EntryKind::Symptom => HRSN_CODE_NONE.to_string(),
                };

                let mention_id = stable_mention_id(
                    tenant_id,
                    &note.patient_id,
                    &segment_lower,
                    &note.date_of_service,
                    position,
                );

                mentions.push(Mention {
                    mention_id,
                    tenant_id: tenant_id.to_string(),
                    patient_id: note.patient_id.clone(),
                    date_of_service: note.date_of_service,
                    symptom_id: entry.symptom_id.clone(),
                    segment: entry.segment.clone(),
                    diagnosis: entry.diagnosis.clone(),
                    diagnosis_code: entry.diagnosis_code.clone(),
                    diagnostic_category: entry.diagnostic_category.clone(),
                    kind: entry.kind,
                    hrsn_code,
                    position_in_text: position,
                    present: "Yes".to_string(),
                    detected: "Yes".to_string(),
                    validated: "Yes".to_string(),
                    hrsn_flags,
                    created_at: Utc::now().naive_utc(),
                });
            }

            let advance = offset + segment_lower.len();
            if advance == 0 {
                // Defensive: a zero-length segment would spin forever.
                return Err(CoreError::Extraction {
                    note_id: note.id.clone(),
                    message: "candidate segment has zero length".to_string(),
                });
            }
            cursor += advance;
        }
    }

    Ok(mentions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntryKind, HrsnCategory};
    use crate::pattern_index::Index;
    use chrono::NaiveDate;

    fn note(text: &str) -> Note {
        Note {
            id: "n1".into(),
            tenant_id: "t1".into(),
            patient_id: "P1".into(),
            date_of_service: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            text: text.to_string(),
            provider_id: None,
        }
    }

    fn symptom_entry(id: &str, segment: &str) -> crate::model::DictionaryEntry {
        crate::model::DictionaryEntry {
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
    fn scenario_s1_two_occurrences_of_the_same_segment() {
        let index = Index::build(vec![symptom_entry("S1", "hopelessness")]);
        let n = note("patient reports hopelessness and hopelessness");
        let mentions = extract(&n, &index, "t1").unwrap();
        let positions: Vec<i64> = mentions.iter().map(|m| m.position_in_text).collect();
        assert_eq!(positions, vec![16, 34]);
    }

    #[test]
    fn scenario_s2_hrsn_flag_population() {
        let mut entry = symptom_entry("S2", "housing insecurity");
        entry.kind = EntryKind::Problem;
        entry.hrsn_mapping = Some(HrsnCategory::HousingStatus);
        let index = Index::build(vec![entry]);
        let n = note("notes indicate housing insecurity concerns");
        let mentions = extract(&n, &index, "t2").unwrap();
        assert_eq!(mentions.len(), 1);
        let m = &mentions[0];
        assert_eq!(m.hrsn_code, HRSN_CODE_ZCODE);
        assert_eq!(
            m.hrsn_flags.housing_status.as_deref(),
            Some("Problem Identified")
        );
        assert!(m.hrsn_flags.food_status.is_none());
        assert!(m.hrsn_flags.social_isolation.is_none());
    }

    #[test]
    fn overlapping_aa_in_aaa_yields_single_mention_at_position_zero() {
        let index = Index::build(vec![symptom_entry("S1", "aa")]);
        let n = note("aaa");
        let mentions = extract(&n, &index, "t1").unwrap();
        let positions: Vec<i64> = mentions.iter().map(|m| m.position_in_text).collect();
        assert_eq!(positions, vec![0]);
    }

    #[test]
    fn empty_note_text_yields_zero_mentions() {
        let index = Index::build(vec![symptom_entry("S1", "hopelessness")]);
        let n = note("");
        let mentions = extract(&n, &index, "t1").unwrap();
        assert!(mentions.is_empty());
    }

    #[test]
    fn duplicate_segment_different_symptom_id_collapses_to_one_mention_per_position() {
        let index = Index::build(vec![
            symptom_entry("S1", "chest pain"),
            symptom_entry("S2", "chest pain"),
        ]);
        let n = note("patient reports chest pain today");
        let mentions = extract(&n, &index, "t1").unwrap();
        assert_eq!(mentions.len(), 1);
    }

    #[test]
    fn exact_match_at_offset_zero() {
        let index = Index::build(vec![symptom_entry("S1", "hopelessness")]);
        let n = note("hopelessness");
        let mentions = extract(&n, &index, "t1").unwrap();
        assert_eq!(mentions.len(), 1);
        assert_eq!(mentions[0].position_in_text, 0);
    }

    #[test]
    fn n_disjoint_occurrences_yield_n_distinct_positions() {
        let index = Index::build(vec![symptom_entry("S1", "anxiety")]);
        let n = note("anxiety anxiety anxiety");
        let mentions = extract(&n, &index, "t1").unwrap();
        let positions: HashSet<i64> = mentions.iter().map(|m| m.position_in_text).collect();
        assert_eq!(positions.len(), 3);
    }
}
