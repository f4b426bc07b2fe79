// crates/clinote-db/src/queries/batch.rs
//! Shared batch-write result type: every bulk write returns this instead of
//! raising, so the fallback to per-row inserts is driven by an explicit
//! error classifier.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub inserted: u64,
    pub skipped: u64,
    pub failed: u64,
}

impl BatchResult {
    pub fn merge(mut self, other: BatchResult) -> Self {
        self.inserted += other.inserted;
        self.skipped += other.skipped;
        self.failed += other.failed;
        self
    }
}
