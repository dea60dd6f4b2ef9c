// src/storage/mod.rs
//
// Narrow interfaces to the host environment. The engine owns no storage:
// records, audit notes and job snapshots are all persisted through these
// traits, and the orchestrator is generic over them.
pub mod memory;

use anyhow::Result;

use crate::models::core::Record;
use crate::models::merge_models::MergeAuditNote;
use crate::models::stats_models::JobState;

/// Outcome of consolidating one sub-batch of duplicates into a master.
/// Failures are per-record and never abort the remaining sub-batches.
#[derive(Debug, Default)]
pub struct ConsolidationOutcome {
    pub merged: usize,
    pub failures: Vec<(String, String)>,
}

/// The host's generic-record storage capability: identity-ordered paging
/// plus consolidation of duplicates into a surviving master.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    async fn count(&self, object_type: &str) -> Result<usize>;

    /// Returns up to `limit` records with identities strictly after
    /// `after_id`, in identity order.
    async fn fetch_chunk(
        &self,
        object_type: &str,
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Record>>;

    /// Consolidates the given duplicates into the master: absorbed
    /// records are removed, the master survives.
    async fn consolidate(
        &self,
        object_type: &str,
        master_id: &str,
        duplicate_ids: &[String],
    ) -> Result<ConsolidationOutcome>;
}

/// External note/log collaborator receiving one audit entry per merge.
#[allow(async_fn_in_trait)]
pub trait AuditSink {
    async fn record_merge(&self, note: &MergeAuditNote) -> Result<()>;
}

/// External persistence for job snapshots, letting a fresh execution
/// cycle resume from the stored cursor.
#[allow(async_fn_in_trait)]
pub trait JobStateStore {
    async fn load(&self, job_id: &str) -> Result<Option<JobState>>;
    async fn save(&self, state: &JobState) -> Result<()>;
}
