//! Pattern index.
//!
//! Pre-computes a first-token bucket map over a tenant's dictionary so the
//! note extractor only scans candidates whose leading word actually occurs
//! in the note, instead of every entry in the dictionary.

use std::collections::HashMap;
use std::sync::Arc;

use crate::model::DictionaryEntry;

/// Read-only after construction — safe to share across chunk workers
/// without locking.
#[derive(Debug, Default)]
pub struct Index {
    buckets: HashMap<String, Vec<Arc<DictionaryEntry>>>,
}

fn first_token(segment_lower: &str) -> Option<&str> {
    segment_lower.split_whitespace().next()
}

impl Index {
    /// Builds the index from a tenant's dictionary. Entries with an empty
    /// segment are dropped — the loader is expected to have already
    /// filtered these, but the index enforces the invariant regardless.
    pub fn build(entries: Vec<DictionaryEntry>) -> Self {
        let mut sorted: Vec<Arc<DictionaryEntry>> = entries
            .into_iter()
            .filter(|e| !e.segment.trim().is_empty())
            .map(Arc::new)
            .collect();

        // Longer patterns matched first so a short prefix never masks a
        // longer phrase.
        sorted.sort_by(|a, b| b.segment.len().cmp(&a.segment.len()));

        let mut buckets: HashMap<String, Vec<Arc<DictionaryEntry>>> = HashMap::new();
        for entry in sorted {
            let lower = entry.segment.to_lowercase();
            let Some(token) = first_token(&lower) else {
                continue;
            };
            buckets.entry(token.to_string()).or_default().push(entry);
        }

        Index { buckets }
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Returns the ordered candidate list for `note_text`: the concatenation
    /// of bucket lists for every whitespace token present in the note, in
    /// the order those tokens first appear in the note. Each bucket is
    /// already length-descending internally; a token is only consulted once
    /// even if it repeats in the note.
    pub fn candidates(&self, note_text: &str) -> Vec<Arc<DictionaryEntry>> {
        if self.buckets.is_empty() {
            return Vec::new();
        }
        let lower = note_text.to_lowercase();
        let mut seen_tokens: std::collections::HashSet<&str> = std::collections::HashSet::new();
        let mut out = Vec::new();
        for token in lower.split_whitespace() {
            if !seen_tokens.insert(token) {
                continue;
            }
            if let Some(bucket) = self.buckets.get(token) {
                out.extend(bucket.iter().cloned());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntryKind;

    fn entry(symptom_id: &str, segment: &str) -> DictionaryEntry {
        DictionaryEntry {
            tenant_id: "t1".into(),
            symptom_id: symptom_id.into(),
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
    fn candidates_only_include_matching_first_token() {
        let idx = Index::build(vec![
            entry("S1", "hopelessness"),
            entry("S2", "housing insecurity"),
            entry("S3", "financial strain"),
        ]);
        let candidates = idx.candidates("patient reports housing insecurity concerns");
        let ids: Vec<_> = candidates.iter().map(|e| e.symptom_id.clone()).collect();
        assert_eq!(ids, vec!["S2"]);
    }

    #[test]
    fn longer_segments_sort_before_shorter_ones_sharing_a_bucket() {
        let idx = Index::build(vec![
            entry("S1", "housing"),
            entry("S2", "housing insecurity concerns"),
            entry("S3", "housing insecurity"),
        ]);
        let candidates = idx.candidates("housing insecurity concerns noted");
        let ids: Vec<_> = candidates.iter().map(|e| e.symptom_id.clone()).collect();
        assert_eq!(ids, vec!["S2", "S3", "S1"]);
    }

    #[test]
    fn empty_dictionary_yields_no_candidates() {
        let idx = Index::build(vec![]);
        assert!(idx.is_empty());
        assert!(idx.candidates("anything at all").is_empty());
    }

    #[test]
    fn segment_with_no_first_token_match_is_excluded() {
        let idx = Index::build(vec![entry("S1", "anxiety")]);
        assert!(idx.candidates("patient denies any issues").is_empty());
    }
}
