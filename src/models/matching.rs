// src/models/matching.rs
use serde::Serialize;

use crate::models::core::{MasterStrategy, Record};

/// A cluster of records believed to represent the same real-world entity.
///
/// Built once by the grouping engine and never mutated afterwards; the
/// merge executor only decides which member becomes the master.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicateGroup {
    pub records: Vec<Record>,
    pub match_score: f64,
    pub group_key: String,
    pub is_exact_match: bool,
}

impl DuplicateGroup {
    pub fn new(
        records: Vec<Record>,
        match_score: f64,
        group_key: impl Into<String>,
        is_exact_match: bool,
    ) -> Self {
        debug_assert!(!records.is_empty(), "duplicate groups hold at least one record");
        Self {
            records,
            match_score,
            group_key: group_key.into(),
            is_exact_match,
        }
    }

    pub fn size(&self) -> usize {
        self.records.len()
    }

    pub fn has_duplicates(&self) -> bool {
        self.records.len() > 1
    }

    /// Selects the master record under the given strategy.
    ///
    /// Ties in creation timestamp or completeness resolve to the record
    /// seen first, which makes repeated calls deterministic.
    pub fn master(&self, strategy: MasterStrategy) -> Option<&Record> {
        let mut iter = self.records.iter();
        let first = iter.next()?;
        let mut best = first;
        for candidate in iter {
            let wins = match strategy {
                MasterStrategy::OldestCreated => candidate.created_at < best.created_at,
                MasterStrategy::NewestCreated => candidate.created_at > best.created_at,
                MasterStrategy::MostComplete => {
                    candidate.populated_field_count() > best.populated_field_count()
                }
            };
            if wins {
                best = candidate;
            }
        }
        Some(best)
    }

    /// Identities of every member except the master, in group order.
    pub fn duplicate_ids(&self, master: Option<&Record>) -> Vec<String> {
        let master_id = match master {
            Some(m) => &m.id,
            None => return Vec::new(),
        };
        self.records
            .iter()
            .filter(|r| &r.id != master_id)
            .map(|r| r.id.clone())
            .collect()
    }
}
