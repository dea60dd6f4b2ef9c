// src/storage/memory.rs
use std::collections::{BTreeMap, HashMap, HashSet};
use std::ops::Bound;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use anyhow::Result;
use tokio::sync::Mutex;

use crate::error::DedupeError;
use crate::models::core::Record;
use crate::models::merge_models::MergeAuditNote;
use crate::models::stats_models::JobState;
use crate::storage::{AuditSink, ConsolidationOutcome, JobStateStore, RecordStore};

/// In-memory record store used by the unit tests and the demo binaries.
/// Records are held per object type in identity order; consolidation
/// failures can be injected per record or for whole batches.
pub struct InMemoryRecordStore {
    objects: Mutex<HashMap<String, BTreeMap<String, Record>>>,
    failing_ids: Mutex<HashSet<String>>,
    poison_consolidation: AtomicBool,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self {
            objects: Mutex::new(HashMap::new()),
            failing_ids: Mutex::new(HashSet::new()),
            poison_consolidation: AtomicBool::new(false),
        }
    }

    pub async fn seed(&self, object_type: &str, records: Vec<Record>) {
        let mut objects = self.objects.lock().await;
        let table = objects.entry(object_type.to_string()).or_default();
        for record in records {
            table.insert(record.id.clone(), record);
        }
    }

    pub async fn len(&self, object_type: &str) -> usize {
        self.objects
            .lock()
            .await
            .get(object_type)
            .map(|t| t.len())
            .unwrap_or(0)
    }

    pub async fn contains(&self, object_type: &str, id: &str) -> bool {
        self.objects
            .lock()
            .await
            .get(object_type)
            .map(|t| t.contains_key(id))
            .unwrap_or(false)
    }

    /// Makes consolidation of the given record id fail without aborting
    /// its batch.
    pub async fn fail_consolidation_of(&self, id: &str) {
        self.failing_ids.lock().await.insert(id.to_string());
    }

    /// Makes every consolidate call fail wholesale.
    pub fn poison_consolidation(&self) {
        self.poison_consolidation.store(true, Ordering::SeqCst);
    }
}

impl Default for InMemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for InMemoryRecordStore {
    async fn count(&self, object_type: &str) -> Result<usize> {
        let objects = self.objects.lock().await;
        let table = objects
            .get(object_type)
            .ok_or_else(|| DedupeError::UnknownObjectType(object_type.to_string()))?;
        Ok(table.len())
    }

    async fn fetch_chunk(
        &self,
        object_type: &str,
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<Record>> {
        let objects = self.objects.lock().await;
        let table = objects
            .get(object_type)
            .ok_or_else(|| DedupeError::UnknownObjectType(object_type.to_string()))?;
        let lower = match after_id {
            Some(id) => Bound::Excluded(id.to_string()),
            None => Bound::Unbounded,
        };
        Ok(table
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn consolidate(
        &self,
        object_type: &str,
        master_id: &str,
        duplicate_ids: &[String],
    ) -> Result<ConsolidationOutcome> {
        if self.poison_consolidation.load(Ordering::SeqCst) {
            return Err(DedupeError::Merge("consolidation unavailable".into()).into());
        }
        let mut objects = self.objects.lock().await;
        let table = objects
            .get_mut(object_type)
            .ok_or_else(|| DedupeError::UnknownObjectType(object_type.to_string()))?;
        if !table.contains_key(master_id) {
            return Err(DedupeError::Merge(format!("master record {} not found", master_id)).into());
        }
        let failing = self.failing_ids.lock().await;
        let mut outcome = ConsolidationOutcome::default();
        for id in duplicate_ids {
            if failing.contains(id) {
                outcome
                    .failures
                    .push((id.clone(), "record is locked by another process".into()));
                continue;
            }
            match table.remove(id) {
                Some(_) => outcome.merged += 1,
                None => outcome.failures.push((id.clone(), "record not found".into())),
            }
        }
        Ok(outcome)
    }
}

/// Collects merge audit notes in memory.
pub struct InMemoryAuditSink {
    notes: Mutex<Vec<MergeAuditNote>>,
    failing: AtomicBool,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self {
            notes: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub async fn notes(&self) -> Vec<MergeAuditNote> {
        self.notes.lock().await.clone()
    }

    pub fn fail_writes(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }
}

impl Default for InMemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for InMemoryAuditSink {
    async fn record_merge(&self, note: &MergeAuditNote) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(DedupeError::Merge("audit sink unavailable".into()).into());
        }
        self.notes.lock().await.push(note.clone());
        Ok(())
    }
}

/// Holds job snapshots in memory and counts saves, so tests can assert
/// that state is persisted at every chunk boundary.
pub struct InMemoryJobStateStore {
    states: Mutex<HashMap<String, JobState>>,
    saves: AtomicUsize,
}

impl InMemoryJobStateStore {
    pub fn new() -> Self {
        Self {
            states: Mutex::new(HashMap::new()),
            saves: AtomicUsize::new(0),
        }
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryJobStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl JobStateStore for InMemoryJobStateStore {
    async fn load(&self, job_id: &str) -> Result<Option<JobState>> {
        Ok(self.states.lock().await.get(job_id).cloned())
    }

    async fn save(&self, state: &JobState) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.states
            .lock()
            .await
            .insert(state.job_id.clone(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rec(id: &str) -> Record {
        Record::new(id, Utc::now()).with_field("name", id)
    }

    #[tokio::test]
    async fn fetch_chunk_pages_in_identity_order() {
        let store = InMemoryRecordStore::new();
        store
            .seed("account", vec![rec("r3"), rec("r1"), rec("r2"), rec("r4")])
            .await;

        let first = store.fetch_chunk("account", None, 2).await.unwrap();
        let ids: Vec<&str> = first.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r2"]);

        let second = store.fetch_chunk("account", Some("r2"), 2).await.unwrap();
        let ids: Vec<&str> = second.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r3", "r4"]);

        let tail = store.fetch_chunk("account", Some("r4"), 2).await.unwrap();
        assert!(tail.is_empty());
    }

    #[tokio::test]
    async fn unknown_object_type_is_an_error() {
        let store = InMemoryRecordStore::new();
        assert!(store.count("nope").await.is_err());
        assert!(store.fetch_chunk("nope", None, 10).await.is_err());
    }

    #[tokio::test]
    async fn consolidate_removes_duplicates_and_reports_failures() {
        let store = InMemoryRecordStore::new();
        store
            .seed("account", vec![rec("m"), rec("d1"), rec("d2"), rec("d3")])
            .await;
        store.fail_consolidation_of("d2").await;

        let outcome = store
            .consolidate(
                "account",
                "m",
                &["d1".to_string(), "d2".to_string(), "d3".to_string(), "ghost".to_string()],
            )
            .await
            .unwrap();
        assert_eq!(outcome.merged, 2);
        assert_eq!(outcome.failures.len(), 2);
        assert!(store.contains("account", "m").await);
        assert!(store.contains("account", "d2").await);
        assert!(!store.contains("account", "d1").await);
        assert_eq!(store.len("account").await, 2);
    }

    #[tokio::test]
    async fn poisoned_consolidation_fails_wholesale() {
        let store = InMemoryRecordStore::new();
        store.seed("account", vec![rec("m"), rec("d")]).await;
        store.poison_consolidation();
        assert!(store
            .consolidate("account", "m", &["d".to_string()])
            .await
            .is_err());
    }
}
