// src/merge/executor.rs
use chrono::Utc;
use log::{debug, info, warn};

use crate::models::core::MasterStrategy;
use crate::models::matching::DuplicateGroup;
use crate::models::merge_models::{ConflictSet, MergeAuditNote, MergeResult};
use crate::storage::{AuditSink, RecordStore};

/// Consolidation requests are split into sub-batches this large to stay
/// inside the host's transactional limits.
pub const MERGE_SUB_BATCH_SIZE: usize = 100;

const DEFAULT_ACTOR: &str = "dedupe-engine";

/// Consolidates one duplicate group into its master record: selects the
/// master, captures field conflicts, writes the audit note, then asks the
/// record store to absorb the duplicates in sub-batches. Individual
/// failures are collected, never fatal; a merge that fails entirely still
/// returns a well-formed result.
pub struct MergeExecutor<'a, S, A> {
    store: &'a S,
    audit: &'a A,
    sub_batch_size: usize,
    actor: String,
}

impl<'a, S, A> MergeExecutor<'a, S, A>
where
    S: RecordStore,
    A: AuditSink,
{
    pub fn new(store: &'a S, audit: &'a A) -> Self {
        Self {
            store,
            audit,
            sub_batch_size: MERGE_SUB_BATCH_SIZE,
            actor: DEFAULT_ACTOR.to_string(),
        }
    }

    pub fn with_sub_batch_size(mut self, size: usize) -> Self {
        self.sub_batch_size = size.max(1);
        self
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub async fn merge(
        &self,
        object_type: &str,
        group: &DuplicateGroup,
        strategy: MasterStrategy,
    ) -> MergeResult {
        let mut result = MergeResult::default();

        let master = match group.master(strategy) {
            Some(master) => master,
            None => {
                result.errors.push(format!(
                    "group {} is empty; nothing to merge",
                    group.group_key
                ));
                return result;
            }
        };
        let duplicate_ids = group.duplicate_ids(Some(master));
        if duplicate_ids.is_empty() {
            debug!("Group {} has no duplicates; skipping", group.group_key);
            return result;
        }

        let conflicts = ConflictSet::diff(group, master);
        debug!(
            "Group {}: master {}, {} duplicate(s), {} conflict(s), {} non-mergeable field(s)",
            group.group_key,
            master.id,
            duplicate_ids.len(),
            conflicts.conflicts.len(),
            conflicts.non_mergeable.len()
        );

        let note = MergeAuditNote {
            object_type: object_type.to_string(),
            group_key: group.group_key.clone(),
            master_id: master.id.clone(),
            merged_ids: duplicate_ids.clone(),
            match_score: group.match_score,
            is_exact_match: group.is_exact_match,
            conflicts,
            merged_at: Utc::now(),
            actor: self.actor.clone(),
        };

        // Every successful merge must leave an audit trail, so a failed
        // audit write aborts this group's consolidation.
        if let Err(e) = self.audit.record_merge(&note).await {
            warn!("Audit write failed for group {}: {:#}", group.group_key, e);
            result.errors.push(format!(
                "audit note for group {} failed, consolidation skipped: {}",
                group.group_key, e
            ));
            return result;
        }

        for sub_batch in duplicate_ids.chunks(self.sub_batch_size) {
            match self.store.consolidate(object_type, &master.id, sub_batch).await {
                Ok(outcome) => {
                    result.records_merged += outcome.merged;
                    for (id, reason) in outcome.failures {
                        result
                            .errors
                            .push(format!("failed to merge {} into {}: {}", id, master.id, reason));
                    }
                }
                Err(e) => {
                    warn!(
                        "Consolidation sub-batch of {} failed for group {}: {:#}",
                        sub_batch.len(),
                        group.group_key,
                        e
                    );
                    result.errors.push(format!(
                        "consolidation of {} record(s) into {} failed: {}",
                        sub_batch.len(),
                        master.id,
                        e
                    ));
                }
            }
        }

        info!(
            "Merged group {}: {} of {} duplicate(s) absorbed into {}{}",
            group.group_key,
            result.records_merged,
            duplicate_ids.len(),
            master.id,
            if result.errors.is_empty() {
                String::new()
            } else {
                format!(", {} error(s)", result.errors.len())
            }
        );
        result
    }
}
