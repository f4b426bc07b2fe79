//! Shared error taxonomy.
//!
//! Kinds that are purely local ([`CoreError::Validation`]) are handled by the
//! caller and never escape as a fatal error; kinds that reach the job
//! manager ([`CoreError::DictionaryUnavailable`], [`CoreError::Extraction`])
//! are the ones downstream crates match on to decide retry behavior.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    /// Malformed input that is skipped locally rather than propagated.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The note extractor failed on a specific note. Fatal to that note, not
    /// to the batch containing it.
    #[error("extraction failed for note {note_id}: {message}")]
    Extraction { note_id: String, message: String },

    /// Neither the persistent store nor the seed file could produce a
    /// dictionary. Fatal to the extraction job; not retried.
    #[error("dictionary unavailable for tenant {tenant_id}")]
    DictionaryUnavailable { tenant_id: String },
}

pub type CoreResult<T> = Result<T, CoreError>;
