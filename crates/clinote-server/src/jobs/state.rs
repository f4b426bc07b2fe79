// crates/clinote-server/src/jobs/state.rs
//! In-process runtime handle for a single job. Lock-free progress counters
//! (atomics, no mutex on the hot path); the durable record lives in
//! `clinote-db`'s `jobs` table, not here.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use clinote_core::model::JobState;

fn state_to_code(state: JobState) -> u8 {
    match state {
        JobState::Queued => 0,
        JobState::Running => 1,
        JobState::Completed => 2,
        JobState::Failed => 3,
        JobState::Cancelled => 4,
    }
}

fn code_to_state(code: u8) -> JobState {
    match code {
        1 => JobState::Running,
        2 => JobState::Completed,
        3 => JobState::Failed,
        4 => JobState::Cancelled,
        _ => JobState::Queued,
    }
}

/// Shared runtime state for one enqueued job. Cheaply cloned via `Arc`;
/// cancellation is a plain atomic write, not a channel send, since the
/// spawned task only needs to observe it at its next poll point.
#[derive(Debug)]
pub struct JobRuntime {
    state: AtomicU8,
    processed: AtomicU64,
    total: AtomicU64,
}

impl JobRuntime {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(state_to_code(JobState::Queued)),
            processed: AtomicU64::new(0),
            total: AtomicU64::new(0),
        }
    }

    pub fn state(&self) -> JobState {
        code_to_state(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: JobState) {
        self.state.store(state_to_code(state), Ordering::Release);
    }

    /// Requests cancellation. A no-op once the job has left `Queued` in
    /// practice — the runner still checks this after acquiring its
    /// semaphore permit, closing the race window where cancellation arrives
    /// while the job sits in the queue.
    pub fn request_cancel(&self) -> bool {
        self.state
            .compare_exchange(
                state_to_code(JobState::Queued),
                state_to_code(JobState::Cancelled),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    pub fn set_progress(&self, processed: u64, total: u64) {
        self.processed.store(processed, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    pub fn progress(&self) -> (u64, u64) {
        (self.processed.load(Ordering::Relaxed), self.total.load(Ordering::Relaxed))
    }
}

impl Default for JobRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_cancel_only_succeeds_while_queued() {
        let runtime = JobRuntime::new();
        assert!(runtime.request_cancel());
        assert_eq!(runtime.state(), JobState::Cancelled);

        let runtime = JobRuntime::new();
        runtime.set_state(JobState::Running);
        assert!(!runtime.request_cancel());
        assert_eq!(runtime.state(), JobState::Running);
    }

    #[test]
    fn progress_round_trips() {
        let runtime = JobRuntime::new();
        runtime.set_progress(10, 100);
        assert_eq!(runtime.progress(), (10, 100));
    }
}
