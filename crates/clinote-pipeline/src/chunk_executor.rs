// crates/clinote-pipeline/src/chunk_executor.rs
//! Chunk executor. Shards a note batch into chunks, runs the note extractor
//! on chunks concurrently with per-chunk timeouts and memory-pressure
//! backoff.

use std::sync::Arc;
use std::time::Duration;

use clinote_core::extractor::extract;
use clinote_core::model::{Mention, Note};
use clinote_core::{Index, Settings};
use sysinfo::System;
use tokio::time::Instant;
use tracing::{info, warn};

/// Cumulative counters reported after every chunk completes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    pub processed_notes: usize,
    pub total_notes: usize,
    pub mentions_so_far: usize,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutorOutcome {
    pub mentions: Vec<Mention>,
    pub processed_notes: usize,
    pub total_notes: usize,
    pub timed_out_chunks: usize,
    pub failed_notes: Vec<String>,
    /// Set when `job_timeout` was reached before all notes were dispatched.
    pub job_timed_out: bool,
}

struct ChunkResult {
    mentions: Vec<Mention>,
    note_count: usize,
    timed_out: bool,
    failed_notes: Vec<String>,
}

/// Extracts every note in `notes` sequentially, collecting per-note
/// failures instead of aborting the chunk: workers return results, not
/// exceptions.
fn extract_chunk(notes: &[Note], index: &Index, tenant_id: &str) -> (Vec<Mention>, Vec<String>) {
    let mut mentions = Vec::new();
    let mut failed = Vec::new();
    for note in notes {
        match extract(note, index, tenant_id) {
            Ok(mut m) => mentions.append(&mut m),
            Err(e) => {
                warn!(note_id = %note.id, error = %e, "note extraction failed");
                failed.push(note.id.clone());
            }
        }
    }
    (mentions, failed)
}

fn sample_resident_memory_mb() -> u64 {
    let mut sys = System::new();
    sys.refresh_memory();
    sys.used_memory() / 1024 / 1024
}

/// Contract: `run(notes, index, tenant_id, settings, on_progress)`.
pub async fn run(
    notes: &[Note],
    index: Arc<Index>,
    tenant_id: &str,
    settings: &Settings,
    mut on_progress: impl FnMut(ProgressUpdate),
) -> ExecutorOutcome {
    let total_notes = notes.len();
    let tenant_id: Arc<str> = Arc::from(tenant_id);

    // Below the inline threshold, run extraction directly with no chunking.
    if total_notes < settings.inline_threshold_notes {
        let (mentions, failed_notes) = extract_chunk(notes, &index, &tenant_id);
        let mentions_so_far = mentions.len();
        on_progress(ProgressUpdate {
            processed_notes: total_notes,
            total_notes,
            mentions_so_far,
        });
        return ExecutorOutcome {
            mentions,
            processed_notes: total_notes,
            total_notes,
            timed_out_chunks: 0,
            failed_notes,
            job_timed_out: false,
        };
    }

    let mut chunk_size = settings.target_chunk_size.max(1);
    let mut concurrency = settings.boosted_concurrency().max(1);
    let chunk_timeout = Duration::from_secs(settings.chunk_timeout_sec);
    let job_deadline = Instant::now() + Duration::from_secs(settings.job_timeout_sec);

    let mut outcome = ExecutorOutcome {
        total_notes,
        ..Default::default()
    };

    let mut cursor = 0usize;
    while cursor < total_notes {
        if Instant::now() >= job_deadline {
            warn!("job_timeout reached; stopping dispatch with partial results");
            outcome.job_timed_out = true;
            break;
        }

        // Sample memory before each wave.
        let used_mb = sample_resident_memory_mb();
        if used_mb > settings.memory_soft_limit_mb {
            warn!(used_mb, limit_mb = settings.memory_soft_limit_mb, "memory pressure: serializing wave");
            concurrency = 1;
            chunk_size = (chunk_size / 2).max(100);
        }

        let mut wave_chunks: Vec<Vec<Note>> = Vec::new();
        let mut wave_cursor = cursor;
        for _ in 0..concurrency {
            if wave_cursor >= total_notes {
                break;
            }
            let end = (wave_cursor + chunk_size).min(total_notes);
            wave_chunks.push(notes[wave_cursor..end].to_vec());
            wave_cursor = end;
        }
        cursor = wave_cursor;

        let mut handles = Vec::with_capacity(wave_chunks.len());
        for chunk in wave_chunks {
            let index = Arc::clone(&index);
            let tenant_id = Arc::clone(&tenant_id);
            handles.push(tokio::spawn(async move {
                let note_count = chunk.len();
                let blocking = tokio::task::spawn_blocking(move || {
                    extract_chunk(&chunk, &index, &tenant_id)
                });
                match tokio::time::timeout(chunk_timeout, blocking).await {
                    Ok(Ok((mentions, failed_notes))) => ChunkResult {
                        mentions,
                        note_count,
                        timed_out: false,
                        failed_notes,
                    },
                    Ok(Err(_join_error)) => ChunkResult {
                        mentions: Vec::new(),
                        note_count,
                        timed_out: false,
                        failed_notes: Vec::new(),
                    },
                    Err(_elapsed) => ChunkResult {
                        mentions: Vec::new(),
                        note_count,
                        timed_out: true,
                        failed_notes: Vec::new(),
                    },
                }
            }));
        }

        for handle in handles {
            let result = handle.await.unwrap_or(ChunkResult {
                mentions: Vec::new(),
                note_count: 0,
                timed_out: false,
                failed_notes: Vec::new(),
            });
            if result.timed_out {
                outcome.timed_out_chunks += 1;
            }
            outcome.processed_notes += result.note_count;
            outcome.failed_notes.extend(result.failed_notes);
            outcome.mentions.extend(result.mentions);

            on_progress(ProgressUpdate {
                processed_notes: outcome.processed_notes,
                total_notes,
                mentions_so_far: outcome.mentions.len(),
            });
        }
    }

    info!(
        processed = outcome.processed_notes,
        total = total_notes,
        mentions = outcome.mentions.len(),
        timed_out_chunks = outcome.timed_out_chunks,
        "chunk executor run complete"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use clinote_core::model::{DictionaryEntry, EntryKind};

    fn note(id: &str, text: &str) -> Note {
        Note {
            id: id.into(),
            tenant_id: "t1".into(),
            patient_id: format!("P-{id}"),
            date_of_service: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            text: text.into(),
            provider_id: None,
        }
    }

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
    async fn inline_path_used_below_threshold() {
        let index = Arc::new(Index::build(vec![entry("S1", "hopelessness")]));
        let notes = vec![note("n1", "patient reports hopelessness")];
        let settings = Settings {
            inline_threshold_notes: 10,
            ..Settings::from_env()
        };
        let mut updates = Vec::new();
        let outcome = run(&notes, index, "t1", &settings, |u| updates.push(u)).await;
        assert_eq!(outcome.mentions.len(), 1);
        assert_eq!(outcome.processed_notes, 1);
        assert!(!outcome.job_timed_out);
        assert_eq!(updates.len(), 1);
    }

    #[tokio::test]
    async fn chunked_path_processes_every_note() {
        let index = Arc::new(Index::build(vec![entry("S1", "anxiety")]));
        let notes: Vec<Note> = (0..25)
            .map(|i| note(&format!("n{i}"), "patient reports anxiety today"))
            .collect();
        let settings = Settings {
            inline_threshold_notes: 10,
            target_chunk_size: 5,
            concurrency_base: 2,
            concurrency_boost: 1,
            ..Settings::from_env()
        };
        let outcome = run(&notes, index, "t1", &settings, |_| {}).await;
        assert_eq!(outcome.processed_notes, 25);
        assert_eq!(outcome.mentions.len(), 25);
        assert_eq!(outcome.timed_out_chunks, 0);
    }
}
