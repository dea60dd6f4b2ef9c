// src/models/stats_models.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle of one dedupe job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Queued,
    Running,
    Completed,
    Failed,
}

/// Snapshot of one job's progress. Owned exclusively by the batch
/// orchestrator, mutated at chunk boundaries, and persisted so a fresh
/// execution cycle can resume from the cursor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobState {
    pub job_id: String,
    pub object_type: String,
    pub status: JobStatus,
    pub records_processed: u64,
    pub duplicates_found: u64,
    pub records_merged: u64,
    /// Identity of the last record seen; the next chunk starts after it.
    pub cursor: Option<String>,
    pub errors: Vec<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobState {
    pub fn queued(job_id: impl Into<String>, object_type: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            object_type: object_type.into(),
            status: JobStatus::Queued,
            records_processed: 0,
            duplicates_found: 0,
            records_merged: 0,
            cursor: None,
            errors: Vec::new(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobStatus::Completed | JobStatus::Failed)
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        if self.status == JobStatus::Queued {
            self.status = JobStatus::Running;
            self.started_at = Some(now);
        }
    }

    pub fn mark_completed(&mut self, now: DateTime<Utc>) {
        self.status = JobStatus::Completed;
        self.completed_at = Some(now);
    }

    pub fn mark_failed(&mut self, error: String, now: DateTime<Utc>) {
        self.errors.push(error);
        self.status = JobStatus::Failed;
        self.completed_at = Some(now);
    }
}
