// src/models/merge_models.rs
use std::collections::BTreeMap;
use std::fmt::Write as _;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::core::{Record, Value};
use crate::models::matching::DuplicateGroup;

/// One field where a non-master record disagrees with the master.
#[derive(Debug, Clone, Serialize)]
pub struct FieldConflict {
    pub field: String,
    pub master_value: Value,
    pub other_value: Value,
    pub other_id: String,
}

/// A field populated only on a non-master record. Captured for the audit
/// trail; never written back onto the master.
#[derive(Debug, Clone, Serialize)]
pub struct NonMergeableField {
    pub field: String,
    pub value: Value,
    pub record_id: String,
}

/// Field-level differences observed across a group during a merge.
/// Transient — serialized into the audit note, never persisted on its own.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ConflictSet {
    pub conflicts: Vec<FieldConflict>,
    pub non_mergeable: Vec<NonMergeableField>,
}

impl ConflictSet {
    /// Diffs every populated field of every non-master record against the
    /// master. Differing values become conflicts; values the master lacks
    /// entirely become non-mergeable data.
    pub fn diff(group: &DuplicateGroup, master: &Record) -> Self {
        let mut set = ConflictSet::default();
        for record in group.records.iter().filter(|r| r.id != master.id) {
            for (field, value) in record.fields() {
                if !value.is_populated() {
                    continue;
                }
                match master.get(field).filter(|v| v.is_populated()) {
                    Some(master_value) => {
                        if master_value != value {
                            set.conflicts.push(FieldConflict {
                                field: field.clone(),
                                master_value: master_value.clone(),
                                other_value: value.clone(),
                                other_id: record.id.clone(),
                            });
                        }
                    }
                    None => set.non_mergeable.push(NonMergeableField {
                        field: field.clone(),
                        value: value.clone(),
                        record_id: record.id.clone(),
                    }),
                }
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty() && self.non_mergeable.is_empty()
    }

    /// Conflicting values keyed by field name, for the audit payload.
    pub fn by_field(&self) -> BTreeMap<&str, Vec<&FieldConflict>> {
        let mut map: BTreeMap<&str, Vec<&FieldConflict>> = BTreeMap::new();
        for conflict in &self.conflicts {
            map.entry(conflict.field.as_str()).or_default().push(conflict);
        }
        map
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.conflicts.iter().any(|c| c.field == field)
    }
}

/// The audit payload handed to the note collaborator for one merged group.
#[derive(Debug, Clone, Serialize)]
pub struct MergeAuditNote {
    pub object_type: String,
    pub group_key: String,
    pub master_id: String,
    pub merged_ids: Vec<String>,
    pub match_score: f64,
    pub is_exact_match: bool,
    pub conflicts: ConflictSet,
    pub merged_at: DateTime<Utc>,
    pub actor: String,
}

impl MergeAuditNote {
    /// Human-readable note body summarizing the merge.
    pub fn body(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "Merged {} duplicate {} record(s) into {}.",
            self.merged_ids.len(),
            self.object_type,
            self.master_id
        );
        let _ = writeln!(
            out,
            "Group {} matched at {:.1} ({}).",
            self.group_key,
            self.match_score,
            if self.is_exact_match { "exact" } else { "fuzzy" }
        );
        let _ = writeln!(out, "Absorbed: {}", self.merged_ids.join(", "));
        if self.conflicts.conflicts.is_empty() {
            let _ = writeln!(out, "No field conflicts.");
        } else {
            let _ = writeln!(out, "Field conflicts (master value kept):");
            for (field, conflicts) in self.conflicts.by_field() {
                for c in conflicts {
                    let _ = writeln!(
                        out,
                        "  {}: master '{}' vs '{}' from {}",
                        field, c.master_value, c.other_value, c.other_id
                    );
                }
            }
        }
        if !self.conflicts.non_mergeable.is_empty() {
            let _ = writeln!(out, "Data present only on absorbed records:");
            for nm in &self.conflicts.non_mergeable {
                let _ = writeln!(out, "  {}: '{}' from {}", nm.field, nm.value, nm.record_id);
            }
        }
        let _ = write!(out, "Merged at {} by {}.", self.merged_at.to_rfc3339(), self.actor);
        out
    }
}

/// Aggregate outcome of merging one group. Individual failures are data,
/// not early exits; a merge that fails entirely still returns a
/// well-formed result.
#[derive(Debug, Clone, Default)]
pub struct MergeResult {
    pub records_merged: usize,
    pub errors: Vec<String>,
}
