// src/error.rs
use thiserror::Error;

/// Error taxonomy for the dedupe engine.
///
/// Only configuration problems are fatal before a job exists; everything
/// else is either recovered locally (missing fields read as null) or
/// collected into `MergeResult::errors` / `JobState::errors` without
/// aborting the run.
#[derive(Debug, Error)]
pub enum DedupeError {
    /// Invalid or incomplete configuration. Surfaced immediately; no job
    /// state is created.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The configured object type is unknown to the record store.
    #[error("unknown object type: {0}")]
    UnknownObjectType(String),

    /// A record or field could not be read from the store.
    #[error("record access error for {record_id}: {message}")]
    RecordAccess { record_id: String, message: String },

    /// Consolidating one or more duplicates into a master failed.
    #[error("merge error: {0}")]
    Merge(String),
}
