//! Environment-driven settings, collected once at process startup.
//!
//! Follows the `get_port()`-style pattern: read an env var, parse it, fall
//! back to a documented default.

use std::env;

fn env_parsed<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    pub max_concurrent_jobs: usize,
    pub target_chunk_size: usize,
    pub save_batch_size: usize,
    pub concurrency_base: usize,
    pub concurrency_boost: usize,
    pub concurrency_hard_cap: usize,
    pub chunk_timeout_sec: u64,
    pub batch_timeout_sec: u64,
    pub job_timeout_sec: u64,
    pub memory_soft_limit_mb: u64,
    pub max_extraction_retries: u32,
    pub job_cleanup_age_hours: u64,
    /// Below this note count, the chunk executor runs inline with no
    /// chunking at all.
    pub inline_threshold_notes: usize,
    /// Fallback CSV read by the dictionary loader when a tenant's store is
    /// empty.
    pub dictionary_seed_path: String,
}

impl Settings {
    pub fn from_env() -> Self {
        let cpu_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let concurrency_base_default = (cpu_count.saturating_sub(1)).clamp(1, 4);

        Self {
            max_concurrent_jobs: env_parsed("MAX_CONCURRENT_JOBS", 3),
            target_chunk_size: env_parsed("TARGET_CHUNK_SIZE", 1_000),
            save_batch_size: env_parsed("SAVE_BATCH_SIZE", 400),
            concurrency_base: env_parsed("CONCURRENCY_BASE", concurrency_base_default),
            concurrency_boost: env_parsed("CONCURRENCY_BOOST", 2),
            concurrency_hard_cap: env_parsed("CONCURRENCY_HARD_CAP", 16),
            chunk_timeout_sec: env_parsed("CHUNK_TIMEOUT_SEC", 120),
            batch_timeout_sec: env_parsed("BATCH_TIMEOUT_SEC", 600),
            job_timeout_sec: env_parsed("JOB_TIMEOUT_SEC", 7_200),
            memory_soft_limit_mb: env_parsed("MEMORY_SOFT_LIMIT_MB", 8_192),
            max_extraction_retries: env_parsed("MAX_EXTRACTION_RETRIES", 3),
            job_cleanup_age_hours: env_parsed("JOB_CLEANUP_AGE_HOURS", 24),
            inline_threshold_notes: env_parsed("INLINE_THRESHOLD_NOTES", 10),
            dictionary_seed_path: env::var("DICTIONARY_SEED_PATH")
                .unwrap_or_else(|_| "dictionary_seed.csv".to_string()),
        }
    }

    /// Effective chunk concurrency, honoring the hard cap.
    pub fn boosted_concurrency(&self) -> usize {
        (self.concurrency_base * self.concurrency_boost).min(self.concurrency_hard_cap)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_when_unset() {
        let s = Settings {
            concurrency_base: 4,
            ..Settings::from_env()
        };
        assert_eq!(s.max_concurrent_jobs, 3);
        assert_eq!(s.target_chunk_size, 1_000);
        assert_eq!(s.memory_soft_limit_mb, 8_192);
        assert_eq!(s.boosted_concurrency(), 8);
    }

    #[test]
    fn boosted_concurrency_respects_hard_cap() {
        let s = Settings {
            concurrency_base: 16,
            concurrency_boost: 4,
            concurrency_hard_cap: 16,
            ..Settings::from_env()
        };
        assert_eq!(s.boosted_concurrency(), 16);
    }
}
