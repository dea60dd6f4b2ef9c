// src/matching/engine.rs
use std::collections::HashMap;

use log::debug;

use crate::error::DedupeError;
use crate::matching::fields::{default_weight, MatcherRegistry};
use crate::matching::keys::build_composite_key;
use crate::matching::normalize::Normalizer;
use crate::models::core::{FieldSpec, Record, DEFAULT_FUZZY_THRESHOLD};
use crate::models::matching::DuplicateGroup;

/// Fuzzy grouping needs at least this many scoring dimensions to be
/// meaningful; below it only the exact phase runs.
const MIN_FIELDS_FOR_FUZZY: usize = 2;

/// Prefix for synthesized fuzzy group keys.
const FUZZY_KEY_PREFIX: &str = "fuzzy-";

/// Two-phase duplicate grouping over one chunk of records.
///
/// Phase 1 partitions by composite key; phase 2 runs greedy single-link
/// fuzzy clustering over the residue. The fuzzy phase is deliberately not
/// transitive-closure aware: when A matches B and B matches C but A does
/// not match C, the outcome depends on input order. Clusters are greedy,
/// deterministic and single-pass — not globally optimal.
pub struct DuplicateGroupingEngine {
    registry: MatcherRegistry,
    normalizer: Normalizer,
    fuzzy_threshold: f64,
}

impl DuplicateGroupingEngine {
    pub fn new(registry: MatcherRegistry, fuzzy_threshold: f64) -> Self {
        Self {
            registry,
            normalizer: Normalizer::new(),
            fuzzy_threshold,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(MatcherRegistry::for_grouping(), DEFAULT_FUZZY_THRESHOLD)
    }

    pub fn fuzzy_threshold(&self) -> f64 {
        self.fuzzy_threshold
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// Groups a chunk of records into duplicate clusters, keyed by the
    /// composite key (exact groups) or `fuzzy-<seed id>` (fuzzy groups).
    /// Every record lands in at most one group; records without duplicates
    /// are simply absent from the result.
    pub fn find_duplicate_groups(
        &self,
        records: &[Record],
        field_specs: &[FieldSpec],
    ) -> Result<HashMap<String, DuplicateGroup>, DedupeError> {
        if field_specs.is_empty() {
            return Err(DedupeError::Configuration(
                "grouping requires at least one field spec".into(),
            ));
        }

        let mut groups: HashMap<String, DuplicateGroup> = HashMap::new();

        // Phase 1: exact partitioning by composite key. An empty key means
        // a required field was missing; those records can never exact-match
        // and go straight to the fuzzy residue.
        let keys: Vec<String> = records
            .iter()
            .map(|r| build_composite_key(&self.normalizer, r, field_specs))
            .collect();

        let mut key_counts: HashMap<&str, usize> = HashMap::new();
        for key in keys.iter().filter(|k| !k.is_empty()) {
            *key_counts.entry(key.as_str()).or_insert(0) += 1;
        }

        let mut exact_partitions: HashMap<&str, Vec<Record>> = HashMap::new();
        let mut residual: Vec<&Record> = Vec::new();
        for (record, key) in records.iter().zip(keys.iter()) {
            if !key.is_empty() && key_counts.get(key.as_str()).copied().unwrap_or(0) >= 2 {
                exact_partitions.entry(key.as_str()).or_default().push(record.clone());
            } else {
                residual.push(record);
            }
        }

        let exact_group_count = exact_partitions.len();
        for (key, members) in exact_partitions {
            groups.insert(
                key.to_string(),
                DuplicateGroup::new(members, 100.0, key, true),
            );
        }
        debug!(
            "Exact phase: {} group(s) from {} record(s), {} left for fuzzy comparison",
            exact_group_count,
            records.len(),
            residual.len()
        );

        // Phase 2: greedy pairwise fuzzy clustering over the residue.
        if field_specs.len() < MIN_FIELDS_FOR_FUZZY {
            debug!(
                "Fuzzy phase skipped: {} field spec(s) configured, {} required",
                field_specs.len(),
                MIN_FIELDS_FOR_FUZZY
            );
            return Ok(groups);
        }

        let mut consumed = vec![false; residual.len()];
        for i in 0..residual.len() {
            if consumed[i] {
                continue;
            }
            let seed = residual[i];
            let mut members: Vec<Record> = vec![seed.clone()];
            let mut best_score = 0.0f64;
            for j in (i + 1)..residual.len() {
                if consumed[j] {
                    continue;
                }
                let candidate = residual[j];
                let score = self.pair_score(seed, candidate, field_specs);
                if score >= self.fuzzy_threshold {
                    members.push(candidate.clone());
                    consumed[j] = true;
                    if score > best_score {
                        best_score = score;
                    }
                }
            }
            if members.len() > 1 {
                consumed[i] = true;
                let key = format!("{}{}", FUZZY_KEY_PREFIX, seed.id);
                debug!(
                    "Fuzzy group {} formed with {} member(s), best pair score {:.1}",
                    key,
                    members.len(),
                    best_score
                );
                groups.insert(key.clone(), DuplicateGroup::new(members, best_score, key, false));
            }
        }

        Ok(groups)
    }

    /// Weighted mean of per-field scores over the fields where at least
    /// one side is populated; fields unpopulated on both sides contribute
    /// to neither numerator nor denominator.
    pub fn pair_score(&self, record1: &Record, record2: &Record, field_specs: &[FieldSpec]) -> f64 {
        let mut weighted_sum = 0.0f64;
        let mut total_weight = 0.0f64;
        for spec in field_specs {
            let v1 = record1.matchable(&spec.name);
            let v2 = record2.matchable(&spec.name);
            if v1.is_none() && v2.is_none() {
                continue;
            }
            let weight = spec.weight.unwrap_or_else(|| default_weight(&spec.name));
            if weight <= 0.0 {
                continue;
            }
            let score =
                self.registry
                    .score_pair(&self.normalizer, &spec.name, v1.as_deref(), v2.as_deref());
            weighted_sum += score * weight;
            total_weight += weight;
        }
        if total_weight <= 0.0 {
            0.0
        } else {
            weighted_sum / total_weight
        }
    }
}
