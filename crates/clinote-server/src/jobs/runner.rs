// crates/clinote-server/src/jobs/runner.rs
//! Job manager. Bounded concurrency over upload and extraction jobs, backed
//! by the `jobs` table for durable state and the progress bus for live
//! status. Cancellation and scheduling are atomics-only: no
//! oneshot channels, no in-memory broadcast registry for job events — the
//! `jobs` table is the source of truth a `GET /jobs/{id}` reads from.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use chrono::Utc;
use clinote_core::model::{Job, JobKind, JobProgressCounters, JobState};
use clinote_core::{Index, RetryPolicy, Settings};
use clinote_db::queries::UploadRecord;
use clinote_db::Database;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::jobs::state::JobRuntime;
use crate::jobs::types::{ExtractionRequest, UploadRequest};
use crate::metrics::{record_extraction, record_job, record_upload};
use crate::progress_bus::{ProgressBus, ProgressEvent};

/// Owns the in-flight job registry and the semaphore bounding concurrent
/// execution across both job kinds: at most `max_concurrent_jobs` jobs run
/// at once, tenant-agnostic.
pub struct JobManager {
    db: Database,
    progress: Arc<ProgressBus>,
    settings: Settings,
    semaphore: Arc<Semaphore>,
    runtimes: RwLock<HashMap<String, Arc<JobRuntime>>>,
}

impl JobManager {
    pub fn new(db: Database, progress: Arc<ProgressBus>, settings: Settings) -> Arc<Self> {
        Arc::new(Self {
            db,
            progress,
            settings,
            semaphore: Arc::new(Semaphore::new(settings.max_concurrent_jobs.max(1))),
            runtimes: RwLock::new(HashMap::new()),
        })
    }

    fn register(&self, job_id: &str) -> Arc<JobRuntime> {
        let runtime = Arc::new(JobRuntime::new());
        if let Ok(mut runtimes) = self.runtimes.write() {
            runtimes.insert(job_id.to_string(), Arc::clone(&runtime));
        }
        runtime
    }

    fn deregister(&self, job_id: &str) {
        if let Ok(mut runtimes) = self.runtimes.write() {
            runtimes.remove(job_id);
        }
    }

    async fn persist(&self, job: &Job) {
        if let Err(e) = self.db.upsert_job(job).await {
            error!(job_id = %job.id, error = %e, "failed to persist job state");
        }
    }

    /// Enqueues an upload job and returns its id immediately; the job body
    /// runs on the background task pool.
    pub async fn spawn_upload(self: &Arc<Self>, req: UploadRequest) -> ApiResult<String> {
        let job_id = Uuid::new_v4().to_string();
        let job = Job {
            id: job_id.clone(),
            tenant_id: req.tenant_id.clone(),
            kind: JobKind::Upload,
            state: JobState::Queued,
            started_at: None,
            ended_at: None,
            progress: JobProgressCounters::default(),
            error: None,
        };
        self.persist(&job).await;
        let runtime = self.register(&job_id);

        let manager = Arc::clone(self);
        let job_id_for_task = job_id.clone();
        tokio::spawn(async move {
            manager.run_upload(job_id_for_task, runtime, req).await;
        });

        Ok(job_id)
    }

    /// Enqueues an extraction job for every note pending extraction under
    /// `req.tenant_id`.
    pub async fn spawn_extraction(self: &Arc<Self>, req: ExtractionRequest) -> ApiResult<String> {
        let job_id = Uuid::new_v4().to_string();
        let job = Job {
            id: job_id.clone(),
            tenant_id: req.tenant_id.clone(),
            kind: JobKind::Extraction,
            state: JobState::Queued,
            started_at: None,
            ended_at: None,
            progress: JobProgressCounters::default(),
            error: None,
        };
        self.persist(&job).await;
        let runtime = self.register(&job_id);

        let manager = Arc::clone(self);
        let job_id_for_task = job_id.clone();
        tokio::spawn(async move {
            manager.run_extraction(job_id_for_task, runtime, req).await;
        });

        Ok(job_id)
    }

    /// Marks a queued job cancelled before it starts. Running jobs cannot be
    /// cancelled — `DELETE /jobs/{id}` on a running job returns 409.
    pub async fn cancel(&self, job_id: &str) -> ApiResult<()> {
        let runtime = self.runtimes.read().ok().and_then(|m| m.get(job_id).cloned());

        match runtime {
            Some(runtime) => {
                if runtime.request_cancel() {
                    if let Some(mut job) = self.db.get_job(job_id).await.map_err(ApiError::Database)? {
                        job.state = JobState::Cancelled;
                        job.ended_at = Some(Utc::now().naive_utc());
                        self.persist(&job).await;
                    }
                    Ok(())
                } else {
                    Err(ApiError::JobRunning(job_id.to_string()))
                }
            }
            None => match self.db.get_job(job_id).await.map_err(ApiError::Database)? {
                Some(_) => Err(ApiError::JobRunning(job_id.to_string())),
                None => Err(ApiError::JobNotFound(job_id.to_string())),
            },
        }
    }

    pub async fn get(&self, job_id: &str) -> ApiResult<Job> {
        self.db
            .get_job(job_id)
            .await
            .map_err(ApiError::Database)?
            .ok_or_else(|| ApiError::JobNotFound(job_id.to_string()))
    }

    pub async fn list(&self, tenant_id: &str) -> ApiResult<Vec<Job>> {
        self.db.list_jobs_by_tenant(tenant_id).await.map_err(ApiError::Database)
    }

    async fn run_upload(self: Arc<Self>, job_id: String, runtime: Arc<JobRuntime>, req: UploadRequest) {
        let _permit = self.semaphore.acquire().await;
        if runtime.state() == JobState::Cancelled {
            self.deregister(&job_id);
            return;
        }
        runtime.set_state(JobState::Running);

        let mut job = Job {
            id: job_id.clone(),
            tenant_id: req.tenant_id.clone(),
            kind: JobKind::Upload,
            state: JobState::Running,
            started_at: Some(Utc::now().naive_utc()),
            ended_at: None,
            progress: JobProgressCounters::default(),
            error: None,
        };
        self.persist(&job).await;

        let job_start = Instant::now();
        let tenant_id = req.tenant_id.clone();
        let runtime_for_progress = Arc::clone(&runtime);
        let on_progress = {
            let bus = Arc::clone(&self.progress);
            let tenant_id = tenant_id.clone();
            let job_id = job_id.clone();
            let file_name = req.file_name.clone();
            move |processed: u64, total: u64| {
                runtime_for_progress.set_progress(processed, total);
                let percentage = if total == 0 { 0.0 } else { (processed as f64 / total as f64) * 100.0 };
                let bus = bus.clone();
                let tenant_id = tenant_id.clone();
                let job_id = job_id.clone();
                let file_name = file_name.clone();
                tokio::spawn(async move {
                    bus.publish(
                        &tenant_id,
                        ProgressEvent::UploadProgress {
                            job_id,
                            file_name,
                            processed_records: processed,
                            total_records: total,
                            rate: 0.0,
                            eta: None,
                            percentage,
                        },
                    )
                    .await;
                });
            }
        };

        match clinote_pipeline::run_upload(&self.db, &req.tenant_id, &req.file_path, on_progress).await {
            Ok(outcome) => {
                job.state = JobState::Completed;
                job.ended_at = Some(Utc::now().naive_utc());
                job.progress = JobProgressCounters {
                    processed: outcome.processed_records,
                    total: outcome.processed_records,
                    rate_per_sec: 0.0,
                    eta_sec: None,
                    percentage: 100.0,
                };
                self.persist(&job).await;

                let record = UploadRecord {
                    upload_id: job_id.clone(),
                    tenant_id: req.tenant_id.clone(),
                    file_name: req.file_name.clone(),
                    processed_records: outcome.processed_records as i64,
                    new_patients: outcome.new_patients as i64,
                    new_notes: outcome.new_notes as i64,
                    duration_ms: outcome.duration_ms as i64,
                };
                if let Err(e) = self.db.record_upload(&record).await {
                    warn!(job_id, error = %e, "failed to persist upload-tracking record");
                }

                record_job("upload", "completed", job_start.elapsed());
                record_upload(outcome.processed_records);

                self.progress
                    .publish(
                        &tenant_id,
                        ProgressEvent::UploadCompleted {
                            job_id: job_id.clone(),
                            processed_records: outcome.processed_records,
                            new_patients: outcome.new_patients,
                            new_notes: outcome.new_notes,
                            duration_ms: outcome.duration_ms,
                        },
                    )
                    .await;

                // Auto-chain extraction on new notes. A failure to enqueue
                // is a warning, not an upload failure.
                if outcome.new_notes > 0 {
                    let manager = Arc::clone(&self);
                    let extraction_req = ExtractionRequest {
                        tenant_id: req.tenant_id.clone(),
                    };
                    if let Err(e) = manager.spawn_extraction(extraction_req).await {
                        warn!(tenant_id = %req.tenant_id, error = %e, "failed to auto-chain extraction job");
                    }
                }
            }
            Err(e) => {
                job.state = JobState::Failed;
                job.ended_at = Some(Utc::now().naive_utc());
                job.error = Some(e.to_string());
                self.persist(&job).await;

                record_job("upload", "failed", job_start.elapsed());

                self.progress
                    .publish(
                        &tenant_id,
                        ProgressEvent::UploadFailed {
                            job_id: job_id.clone(),
                            file_name: req.file_name.clone(),
                            error: e.to_string(),
                        },
                    )
                    .await;
            }
        }

        self.deregister(&job_id);
    }

    async fn run_extraction(self: Arc<Self>, job_id: String, runtime: Arc<JobRuntime>, req: ExtractionRequest) {
        let _permit = self.semaphore.acquire().await;
        if runtime.state() == JobState::Cancelled {
            self.deregister(&job_id);
            return;
        }
        runtime.set_state(JobState::Running);

        let mut job = Job {
            id: job_id.clone(),
            tenant_id: req.tenant_id.clone(),
            kind: JobKind::Extraction,
            state: JobState::Running,
            started_at: Some(Utc::now().naive_utc()),
            ended_at: None,
            progress: JobProgressCounters::default(),
            error: None,
        };
        self.persist(&job).await;

        let job_start = Instant::now();

        // Dictionary load. Unavailable is fatal, not retried.
        let dictionary = match clinote_pipeline::load_dictionary(
            &self.db,
            &req.tenant_id,
            &self.settings.dictionary_seed_path,
        )
        .await
        {
            Ok(entries) => entries,
            Err(e) => {
                // Dictionary-unavailable and any other core error are both
                // fatal here — retrying without a dictionary can't succeed.
                self.fail_extraction(&mut job, &req.tenant_id, &e.to_string(), job_start.elapsed())
                    .await;
                return;
            }
        };
        let index = Arc::new(Index::build(dictionary));

        let policy = RetryPolicy::extraction_attempts(self.settings.max_extraction_retries);
        let save_batch_size = self.settings.save_batch_size.max(1);
        let batch_timeout = Duration::from_secs(self.settings.batch_timeout_sec);

        let mut attempt = 0u32;
        let (total_notes, total_processed, mentions_total) = loop {
            attempt += 1;

            // Re-fetched every attempt: mentions already persisted by a
            // prior attempt's save-batches exclude their patients here, so
            // retrying from here re-runs step 1 rather than replaying a
            // stale candidate set.
            let notes = match self.db.notes_pending_extraction(&req.tenant_id).await {
                Ok(notes) => notes,
                Err(e) if policy.should_retry(attempt) => {
                    let wait = policy.delay_for_attempt(attempt);
                    warn!(tenant_id = %req.tenant_id, attempt, error = %e, "note fetch failed, retrying whole attempt");
                    self.progress
                        .publish(
                            &req.tenant_id,
                            ProgressEvent::ExtractionRetry {
                                attempt,
                                max_retries: policy.max_attempts,
                                wait_ms: wait.as_millis() as u64,
                                message: format!("note fetch failed: {e}"),
                            },
                        )
                        .await;
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Err(e) => {
                    self.fail_extraction(&mut job, &req.tenant_id, &e.to_string(), job_start.elapsed())
                        .await;
                    return;
                }
            };

            let total_notes = notes.len();
            let total_batches = total_notes.div_ceil(save_batch_size).max(1);
            let mut processed_notes = 0usize;
            let mut mentions_total = 0usize;

            for (batch_index, batch_notes) in notes.chunks(save_batch_size).enumerate() {
                let batch_number = batch_index + 1;
                let processed_before_batch = processed_notes;
                let bus = Arc::clone(&self.progress);
                let tenant_id = req.tenant_id.clone();
                let runtime_for_progress = Arc::clone(&runtime);
                let on_progress = move |update: clinote_pipeline::ProgressUpdate| {
                    let processed_overall = processed_before_batch + update.processed_notes;
                    runtime_for_progress.set_progress(processed_overall as u64, total_notes as u64);
                    let batch_progress = if update.total_notes == 0 {
                        1.0
                    } else {
                        update.processed_notes as f64 / update.total_notes as f64
                    };
                    let overall_progress = if total_notes == 0 {
                        1.0
                    } else {
                        processed_overall as f64 / total_notes as f64
                    };
                    let bus = bus.clone();
                    let tenant_id = tenant_id.clone();
                    tokio::spawn(async move {
                        bus.publish(
                            &tenant_id,
                            ProgressEvent::ExtractionProgress {
                                batch: batch_number,
                                total_batches,
                                batch_progress,
                                overall_progress,
                                message: format!("{} mentions so far", update.mentions_so_far),
                            },
                        )
                        .await;
                    });
                };

                let run_fut = clinote_pipeline::run_chunk_executor(
                    batch_notes,
                    Arc::clone(&index),
                    &req.tenant_id,
                    &self.settings,
                    on_progress,
                );

                let result = match tokio::time::timeout(batch_timeout, run_fut).await {
                    Ok(result) => result,
                    Err(_elapsed) => {
                        warn!(tenant_id = %req.tenant_id, batch = batch_number, "save-batch exceeded batch_timeout_sec");
                        self.progress
                            .publish(
                                &req.tenant_id,
                                ProgressEvent::BatchWarning {
                                    batch: batch_number,
                                    message: "batch timed out".into(),
                                },
                            )
                            .await;
                        continue;
                    }
                };

                if result.job_timed_out || result.timed_out_chunks > 0 {
                    self.progress
                        .publish(
                            &req.tenant_id,
                            ProgressEvent::BatchWarning {
                                batch: batch_number,
                                message: format!(
                                    "{} chunk(s) in this batch timed out",
                                    result.timed_out_chunks.max(1)
                                ),
                            },
                        )
                        .await;
                }
                if !result.failed_notes.is_empty() {
                    self.progress
                        .publish(
                            &req.tenant_id,
                            ProgressEvent::BatchWarning {
                                batch: batch_number,
                                message: format!("{} notes failed extraction", result.failed_notes.len()),
                            },
                        )
                        .await;
                }

                let mentions_found = result.mentions.len();
                if let Err(e) = self.db.bulk_upsert_mentions(&result.mentions).await {
                    warn!(tenant_id = %req.tenant_id, batch = batch_number, error = %e, "failed to persist save-batch mentions");
                    self.progress
                        .publish(
                            &req.tenant_id,
                            ProgressEvent::BatchWarning {
                                batch: batch_number,
                                message: format!("failed to persist batch: {e}"),
                            },
                        )
                        .await;
                    continue;
                }

                processed_notes += result.processed_notes;
                mentions_total += mentions_found;

                let overall_progress = if total_notes == 0 {
                    1.0
                } else {
                    processed_notes as f64 / total_notes as f64
                };
                self.progress
                    .publish(
                        &req.tenant_id,
                        ProgressEvent::BatchCompleted {
                            batch: batch_number,
                            total_batches,
                            mentions_found,
                            overall_progress,
                        },
                    )
                    .await;
            }

            break (total_notes, processed_notes, mentions_total);
        };

        job.state = JobState::Completed;
        job.ended_at = Some(Utc::now().naive_utc());
        job.progress = JobProgressCounters {
            processed: total_processed as u64,
            total: total_notes as u64,
            rate_per_sec: 0.0,
            eta_sec: None,
            percentage: 100.0,
        };
        self.persist(&job).await;

        record_job("extraction", "completed", job_start.elapsed());
        record_extraction(mentions_total as u64);

        self.progress
            .publish(
                &req.tenant_id,
                ProgressEvent::ExtractionCompleted {
                    message: format!("processed {total_processed} notes, found {mentions_total} mentions"),
                },
            )
            .await;

        self.deregister(&job_id);
    }

    async fn fail_extraction(&self, job: &mut Job, tenant_id: &str, message: &str, elapsed: Duration) {
        job.state = JobState::Failed;
        job.ended_at = Some(Utc::now().naive_utc());
        job.error = Some(message.to_string());
        self.persist(job).await;
        record_job("extraction", "failed", elapsed);
        self.progress
            .publish(tenant_id, ProgressEvent::ExtractionError { message: message.to_string() })
            .await;
        self.deregister(&job.id);
        info!(job_id = %job.id, "extraction job failed: {message}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use clinote_core::model::{DictionaryEntry, EntryKind, Note};

    #[tokio::test]
    async fn cancel_on_unknown_job_returns_not_found() {
        let db = Database::new_in_memory().await.unwrap();
        let bus = Arc::new(ProgressBus::new(db.clone()));
        let manager = JobManager::new(db, bus, Settings::from_env());

        let err = manager.cancel("nonexistent").await.unwrap_err();
        assert!(matches!(err, ApiError::JobNotFound(_)));
    }

    #[tokio::test]
    async fn spawn_upload_assigns_an_id_and_persists_queued_then_runs() {
        let db = Database::new_in_memory().await.unwrap();
        let bus = Arc::new(ProgressBus::new(db.clone()));
        let manager = JobManager::new(db.clone(), bus, Settings::from_env());

        let job_id = manager
            .spawn_upload(UploadRequest {
                tenant_id: "t1".into(),
                file_path: "/nonexistent/upload.csv".into(),
                file_name: "upload.csv".into(),
            })
            .await
            .unwrap();

        assert!(!job_id.is_empty());
        // Give the spawned task a chance to run and persist a failure.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let job = manager.get(&job_id).await.unwrap();
        assert_eq!(job.state, JobState::Failed);
    }

    #[tokio::test]
    async fn extraction_persists_mentions_every_save_batch_not_just_at_the_end() {
        let db = Database::new_in_memory().await.unwrap();
        db.bulk_upsert_dictionary(&[DictionaryEntry {
            tenant_id: "t1".into(),
            symptom_id: "S1".into(),
            segment: "hopelessness".into(),
            diagnosis: None,
            diagnosis_code: None,
            diagnostic_category: None,
            kind: EntryKind::Symptom,
            hrsn_code: None,
            hrsn_mapping: None,
        }])
        .await
        .unwrap();

        let date = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let notes: Vec<Note> = (0..5)
            .map(|i| Note {
                id: format!("n{i}"),
                tenant_id: "t1".into(),
                patient_id: format!("p{i}"),
                date_of_service: date,
                text: "patient reports hopelessness today".into(),
                provider_id: None,
            })
            .collect();
        db.bulk_upsert_notes(&notes).await.unwrap();

        let bus = Arc::new(ProgressBus::new(db.clone()));
        // Force 5 notes into 5 separate save-batches so completion can only
        // be explained by every batch persisting its own mentions.
        let settings = Settings { save_batch_size: 1, ..Settings::from_env() };
        let manager = JobManager::new(db.clone(), bus, settings);

        let job_id = manager
            .spawn_extraction(ExtractionRequest { tenant_id: "t1".into() })
            .await
            .unwrap();

        let mut job = manager.get(&job_id).await.unwrap();
        for _ in 0..100 {
            if job.state != JobState::Queued && job.state != JobState::Running {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            job = manager.get(&job_id).await.unwrap();
        }

        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress.processed, 5);

        // If mentions were only written once at the very end, a crash
        // mid-attempt would leave every note re-queued. Persisting per
        // save-batch means none of them are pending anymore.
        let pending = db.notes_pending_extraction("t1").await.unwrap();
        assert!(pending.is_empty());
    }
}
