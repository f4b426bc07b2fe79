// crates/clinote-server/src/state.rs
//! Application state for the Axum server.

use std::sync::Arc;
use std::time::Instant;

use clinote_core::Settings;
use clinote_db::Database;

use crate::jobs::JobManager;
use crate::progress_bus::ProgressBus;

/// Shared application state accessible from all route handlers.
pub struct AppState {
    /// Server start time for uptime tracking.
    pub start_time: Instant,
    /// Database handle shared by every persisted component: notes, jobs,
    /// progress, and recovery.
    pub db: Database,
    /// Bounded-concurrency job scheduler.
    pub jobs: Arc<JobManager>,
    /// Durable status + SSE fan-out for upload/extraction progress.
    pub progress: Arc<ProgressBus>,
    /// Environment-derived tuning knobs shared by every route and job.
    pub settings: Settings,
}

impl AppState {
    pub fn new(db: Database, settings: Settings) -> Arc<Self> {
        let progress = Arc::new(ProgressBus::new(db.clone()));
        let jobs = JobManager::new(db.clone(), Arc::clone(&progress), settings);

        Arc::new(Self {
            start_time: Instant::now(),
            db,
            jobs,
            progress,
            settings,
        })
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_state_starts_with_zero_uptime() {
        let db = Database::new_in_memory().await.unwrap();
        let state = AppState::new(db, Settings::from_env());
        assert_eq!(state.uptime_secs(), 0);
    }
}
