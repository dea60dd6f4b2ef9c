// src/batch/orchestrator.rs
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use log::{debug, info, warn};

use crate::batch::budget::{BudgetCounter, ResourceBudget};
use crate::error::DedupeError;
use crate::matching::engine::DuplicateGroupingEngine;
use crate::matching::fields::MatcherRegistry;
use crate::merge::executor::MergeExecutor;
use crate::models::core::DedupeConfig;
use crate::models::matching::DuplicateGroup;
use crate::models::stats_models::{JobState, JobStatus};
use crate::storage::{AuditSink, JobStateStore, RecordStore};

/// Upper bound on execution cycles per job; a job still yielding after
/// this many passes is stuck, not making progress.
pub const MAX_EXECUTION_CYCLES: usize = 1_000;

/// How one execution cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleStatus {
    /// Budget or cancellation stopped the cycle at a chunk boundary;
    /// state is persisted and a later cycle resumes from the cursor.
    Yielded,
    Completed,
    Failed,
}

/// What one execution cycle produced. `groups` is populated on dry runs
/// only — live runs consume their groups by merging them.
#[derive(Debug)]
pub struct CycleReport {
    pub status: CycleStatus,
    pub state: JobState,
    pub groups: HashMap<String, DuplicateGroup>,
}

enum ChunkOutcome {
    More,
    Exhausted,
}

/// Drives the grouping engine over a record population in bounded chunks.
///
/// Execution is single-threaded and cooperative: each chunk runs to
/// completion, the only suspension point is the chunk boundary, and a new
/// execution cycle (scheduled by the host) resumes from the persisted
/// cursor. The orchestrator never re-enqueues itself. Two jobs over
/// overlapping populations are not coordinated here.
pub struct DedupeOrchestrator<'a, S, A, J> {
    store: &'a S,
    audit: &'a A,
    jobs: &'a J,
    config: DedupeConfig,
    engine: DuplicateGroupingEngine,
    cancel_flag: Option<Arc<AtomicBool>>,
}

impl<'a, S, A, J> DedupeOrchestrator<'a, S, A, J>
where
    S: RecordStore,
    A: AuditSink,
    J: JobStateStore,
{
    /// Validates the configuration up front; a bad configuration never
    /// creates job state.
    pub fn new(store: &'a S, audit: &'a A, jobs: &'a J, config: DedupeConfig) -> Result<Self, DedupeError> {
        config.validate()?;
        let engine = DuplicateGroupingEngine::new(MatcherRegistry::for_grouping(), config.fuzzy_threshold);
        Ok(Self {
            store,
            audit,
            jobs,
            config,
            engine,
            cancel_flag: None,
        })
    }

    /// Replaces the default grouping engine, e.g. to inject a custom
    /// matcher registry.
    pub fn with_engine(mut self, engine: DuplicateGroupingEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Cooperative cancellation: the flag is observed at chunk boundaries
    /// only, never mid-chunk.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel_flag = Some(flag);
        self
    }

    pub fn config(&self) -> &DedupeConfig {
        &self.config
    }

    fn cancelled(&self) -> bool {
        self.cancel_flag
            .as_ref()
            .map(|f| f.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Runs one execution cycle: process chunks until the population is
    /// exhausted, the budget says yield, or something fails. Errors are
    /// returned only when no job state exists yet (configuration-level
    /// failures); once a job is running, failures land in its state.
    pub async fn run_cycle<B: ResourceBudget>(&self, job_id: &str, budget: &B) -> Result<CycleReport> {
        // An unknown object type is a configuration error and must surface
        // before any job state is created.
        let total = self
            .store
            .count(&self.config.object_type)
            .await
            .with_context(|| format!("cannot count '{}' records", self.config.object_type))?;
        budget.charge(BudgetCounter::StoreOperations, 1);

        let mut state = match self.jobs.load(job_id).await.context("failed to load job state")? {
            Some(state) => state,
            None => JobState::queued(job_id, &self.config.object_type),
        };

        if state.is_terminal() {
            debug!("Job {} already {:?}; nothing to do", job_id, state.status);
            let status = if state.status == JobStatus::Completed {
                CycleStatus::Completed
            } else {
                CycleStatus::Failed
            };
            return Ok(CycleReport {
                status,
                state,
                groups: HashMap::new(),
            });
        }

        if state.status == JobStatus::Queued {
            info!(
                "Starting dedupe job {} over {} '{}' record(s) (chunk size {}, threshold {}, dry run: {})",
                job_id,
                total,
                self.config.object_type,
                self.config.chunk_size,
                self.config.fuzzy_threshold,
                self.config.dry_run
            );
        } else {
            info!(
                "Resuming dedupe job {} from cursor {:?} ({} record(s) processed so far)",
                job_id, state.cursor, state.records_processed
            );
        }
        state.mark_running(Utc::now());
        self.jobs.save(&state).await.context("failed to persist job state")?;
        budget.charge(BudgetCounter::StoreOperations, 1);

        let mut dry_run_groups: HashMap<String, DuplicateGroup> = HashMap::new();

        loop {
            if self.cancelled() {
                info!("Job {} cancelled; yielding at chunk boundary", job_id);
                self.jobs.save(&state).await.context("failed to persist job state")?;
                return Ok(CycleReport {
                    status: CycleStatus::Yielded,
                    state,
                    groups: dry_run_groups,
                });
            }
            if budget.should_yield() {
                info!(
                    "Job {} yielding: budget consumption store_ops {:.0}%, cpu {:.0}%",
                    job_id,
                    100.0 * budget.fraction_consumed(BudgetCounter::StoreOperations),
                    100.0 * budget.fraction_consumed(BudgetCounter::CpuTime)
                );
                self.jobs.save(&state).await.context("failed to persist job state")?;
                return Ok(CycleReport {
                    status: CycleStatus::Yielded,
                    state,
                    groups: dry_run_groups,
                });
            }

            match self.process_chunk(job_id, &mut state, budget, &mut dry_run_groups).await {
                Ok(ChunkOutcome::More) => continue,
                Ok(ChunkOutcome::Exhausted) => {
                    state.mark_completed(Utc::now());
                    self.jobs.save(&state).await.context("failed to persist job state")?;
                    info!(
                        "Job {} completed: {} processed, {} duplicates found, {} merged, {} error(s)",
                        job_id,
                        state.records_processed,
                        state.duplicates_found,
                        state.records_merged,
                        state.errors.len()
                    );
                    return Ok(CycleReport {
                        status: CycleStatus::Completed,
                        state,
                        groups: dry_run_groups,
                    });
                }
                Err(e) => {
                    warn!("Job {} failed mid-chunk: {:#}", job_id, e);
                    state.mark_failed(format!("{:#}", e), Utc::now());
                    // Partial progress is retained even when the final
                    // persist fails; the failure itself must not be lost.
                    if let Err(save_err) = self.jobs.save(&state).await {
                        warn!("Job {} failure state could not be persisted: {:#}", job_id, save_err);
                    }
                    return Ok(CycleReport {
                        status: CycleStatus::Failed,
                        state,
                        groups: dry_run_groups,
                    });
                }
            }
        }
    }

    async fn process_chunk<B: ResourceBudget>(
        &self,
        job_id: &str,
        state: &mut JobState,
        budget: &B,
        dry_run_groups: &mut HashMap<String, DuplicateGroup>,
    ) -> Result<ChunkOutcome> {
        let chunk = self
            .store
            .fetch_chunk(
                &self.config.object_type,
                state.cursor.as_deref(),
                self.config.chunk_size,
            )
            .await
            .context("failed to fetch chunk")?;
        budget.charge(BudgetCounter::StoreOperations, 1);

        if chunk.is_empty() {
            return Ok(ChunkOutcome::Exhausted);
        }

        let groups = self
            .engine
            .find_duplicate_groups(&chunk, &self.config.field_specs)
            .context("grouping failed")?;

        let chunk_len = chunk.len();
        state.records_processed += chunk_len as u64;
        state.duplicates_found += groups
            .values()
            .map(|g| (g.size() as u64).saturating_sub(1))
            .sum::<u64>();

        debug!(
            "Job {}: chunk of {} yielded {} duplicate group(s)",
            job_id,
            chunk_len,
            groups.len()
        );

        if self.config.dry_run {
            dry_run_groups.extend(groups);
        } else {
            let executor = MergeExecutor::new(self.store, self.audit)
                .with_actor(format!("dedupe-job/{}", job_id));
            for group in groups.values() {
                let merge_result = executor
                    .merge(&self.config.object_type, group, self.config.master_strategy)
                    .await;
                state.records_merged += merge_result.records_merged as u64;
                state.errors.extend(merge_result.errors);
                budget.charge(BudgetCounter::StoreOperations, 1);
            }
        }

        state.cursor = chunk.last().map(|r| r.id.clone());
        self.jobs.save(state).await.context("failed to persist job state")?;
        budget.charge(BudgetCounter::StoreOperations, 1);

        if chunk_len < self.config.chunk_size {
            Ok(ChunkOutcome::Exhausted)
        } else {
            Ok(ChunkOutcome::More)
        }
    }

    /// In-process rendition of the host scheduler: keeps submitting fresh
    /// execution cycles (each with a fresh budget) until the job reaches a
    /// terminal state, accumulating dry-run groups across cycles.
    pub async fn run_to_completion<B, F>(&self, job_id: &str, make_budget: F) -> Result<CycleReport>
    where
        B: ResourceBudget,
        F: Fn() -> B,
    {
        let mut all_groups: HashMap<String, DuplicateGroup> = HashMap::new();
        for cycle in 0..MAX_EXECUTION_CYCLES {
            let budget = make_budget();
            let mut report = self.run_cycle(job_id, &budget).await?;
            all_groups.extend(report.groups.drain());
            match report.status {
                CycleStatus::Yielded => {
                    if self.cancelled() {
                        report.groups = all_groups;
                        return Ok(report);
                    }
                    debug!("Job {} yielded after cycle {}; resubmitting", job_id, cycle + 1);
                }
                _ => {
                    report.groups = all_groups;
                    return Ok(report);
                }
            }
        }
        Err(anyhow!(
            "job {} exceeded {} execution cycles without completing",
            job_id,
            MAX_EXECUTION_CYCLES
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::budget::{CycleBudget, StaticBudget};
    use crate::models::core::{DedupeConfig, FieldSpec, MasterStrategy, Record};
    use crate::storage::memory::{InMemoryAuditSink, InMemoryJobStateStore, InMemoryRecordStore};
    use crate::storage::ConsolidationOutcome;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn rec(id: &str, name: &str, phone: &str, city: &str) -> Record {
        Record::new(id, chrono::Utc::now())
            .with_field("name", name)
            .with_field("phone", phone)
            .with_field("billing_city", city)
    }

    /// Eight records in identity order: one exact pair, one fuzzy pair,
    /// four singletons.
    fn population() -> Vec<Record> {
        vec![
            rec("r01", "Acme Corp", "(415) 555-1234", "Oakland"),
            rec("r02", "ACME CORP.", "415.555.1234", "oakland"),
            rec("r03", "Initech Industries", "510-555-0001", "Berkeley"),
            rec("r04", "Initech Industrys", "510-555-0001", "Berkeley"),
            rec("r05", "Umbrella Holdings", "916-555-9999", "Davis"),
            rec("r06", "Stark Labs", "650-555-7777", "Palo Alto"),
            rec("r07", "Wayne Metals", "408-555-3333", "San Jose"),
            rec("r08", "Oscorp Chemical", "707-555-2222", "Napa"),
        ]
    }

    fn config(chunk_size: usize, dry_run: bool) -> DedupeConfig {
        let mut config = DedupeConfig::new(
            "account",
            vec![
                FieldSpec::fuzzy("name"),
                FieldSpec::fuzzy("phone"),
                FieldSpec::exact("billing_city"),
            ],
        );
        config.chunk_size = chunk_size;
        config.dry_run = dry_run;
        config.master_strategy = MasterStrategy::OldestCreated;
        config
    }

    fn generous_budget() -> CycleBudget {
        CycleBudget::new(1_000_000, Duration::from_secs(600))
    }

    #[tokio::test]
    async fn empty_population_completes_immediately() {
        let store = InMemoryRecordStore::new();
        store.seed("account", vec![]).await;
        let audit = InMemoryAuditSink::new();
        let jobs = InMemoryJobStateStore::new();
        let orchestrator =
            DedupeOrchestrator::new(&store, &audit, &jobs, config(100, false)).unwrap();

        let report = orchestrator.run_cycle("job-empty", &generous_budget()).await.unwrap();
        assert_eq!(report.status, CycleStatus::Completed);
        assert_eq!(report.state.status, JobStatus::Completed);
        assert_eq!(report.state.records_processed, 0);
        assert_eq!(report.state.duplicates_found, 0);
        assert_eq!(report.state.records_merged, 0);
        assert!(report.state.completed_at.is_some());
    }

    #[tokio::test]
    async fn unknown_object_type_creates_no_job_state() {
        let store = InMemoryRecordStore::new();
        let audit = InMemoryAuditSink::new();
        let jobs = InMemoryJobStateStore::new();
        let orchestrator =
            DedupeOrchestrator::new(&store, &audit, &jobs, config(100, false)).unwrap();

        let result = orchestrator.run_cycle("job-x", &generous_budget()).await;
        assert!(result.is_err());
        assert_eq!(jobs.save_count(), 0);
        assert!(jobs.load("job-x").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_field_specs_are_rejected_at_construction() {
        let store = InMemoryRecordStore::new();
        let audit = InMemoryAuditSink::new();
        let jobs = InMemoryJobStateStore::new();
        let mut bad = config(100, false);
        bad.field_specs.clear();
        assert!(DedupeOrchestrator::new(&store, &audit, &jobs, bad).is_err());
    }

    #[tokio::test]
    async fn live_run_merges_and_accumulates_counters() {
        let store = InMemoryRecordStore::new();
        store.seed("account", population()).await;
        let audit = InMemoryAuditSink::new();
        let jobs = InMemoryJobStateStore::new();
        let orchestrator =
            DedupeOrchestrator::new(&store, &audit, &jobs, config(2, false)).unwrap();

        let report = orchestrator
            .run_to_completion("job-live", generous_budget)
            .await
            .unwrap();

        assert_eq!(report.status, CycleStatus::Completed);
        assert_eq!(report.state.records_processed, 8);
        assert_eq!(report.state.duplicates_found, 2);
        assert_eq!(report.state.records_merged, 2);
        assert!(report.state.errors.is_empty());
        assert_eq!(store.len("account").await, 6);
        // One audit note per merged group.
        assert_eq!(audit.notes().await.len(), 2);
        // Masters are the oldest-created (first) members.
        assert!(store.contains("account", "r01").await);
        assert!(!store.contains("account", "r02").await);
        assert!(store.contains("account", "r03").await);
        assert!(!store.contains("account", "r04").await);
        // State was persisted at every chunk boundary.
        assert!(jobs.save_count() >= 5);
    }

    #[tokio::test]
    async fn dry_run_reports_groups_without_mutating() {
        let store = InMemoryRecordStore::new();
        store.seed("account", population()).await;
        let audit = InMemoryAuditSink::new();
        let jobs = InMemoryJobStateStore::new();
        let orchestrator =
            DedupeOrchestrator::new(&store, &audit, &jobs, config(4, true)).unwrap();

        let report = orchestrator
            .run_to_completion("job-dry", generous_budget)
            .await
            .unwrap();

        assert_eq!(report.status, CycleStatus::Completed);
        assert_eq!(report.groups.len(), 2);
        assert_eq!(report.state.duplicates_found, 2);
        assert_eq!(report.state.records_merged, 0);
        assert_eq!(store.len("account").await, 8, "dry runs never mutate");
        assert!(audit.notes().await.is_empty());
        let exact_groups = report.groups.values().filter(|g| g.is_exact_match).count();
        assert_eq!(exact_groups, 1);
    }

    #[tokio::test]
    async fn tight_budget_yields_and_resumes_across_cycles() {
        let store = InMemoryRecordStore::new();
        store.seed("account", population()).await;
        let audit = InMemoryAuditSink::new();
        let jobs = InMemoryJobStateStore::new();
        let orchestrator =
            DedupeOrchestrator::new(&store, &audit, &jobs, config(2, false)).unwrap();

        let cycles = AtomicUsize::new(0);
        let report = orchestrator
            .run_to_completion("job-budget", || {
                cycles.fetch_add(1, Ordering::SeqCst);
                // Roughly one chunk's worth of operations per cycle.
                CycleBudget::new(3, Duration::from_secs(600))
            })
            .await
            .unwrap();

        assert_eq!(report.status, CycleStatus::Completed);
        assert!(cycles.load(Ordering::SeqCst) > 1, "tight budget must force multiple cycles");
        assert_eq!(report.state.records_processed, 8, "resume must not reprocess records");
        assert_eq!(report.state.records_merged, 2);
        assert_eq!(store.len("account").await, 6);
    }

    #[tokio::test]
    async fn exhausted_budget_yields_without_progress() {
        let store = InMemoryRecordStore::new();
        store.seed("account", population()).await;
        let audit = InMemoryAuditSink::new();
        let jobs = InMemoryJobStateStore::new();
        let orchestrator =
            DedupeOrchestrator::new(&store, &audit, &jobs, config(2, false)).unwrap();

        let report = orchestrator
            .run_cycle("job-starved", &StaticBudget::exhausted())
            .await
            .unwrap();
        assert_eq!(report.status, CycleStatus::Yielded);
        assert_eq!(report.state.status, JobStatus::Running);
        assert_eq!(report.state.records_processed, 0);
        // The running state is persisted so the next cycle can resume.
        assert!(jobs.load("job-starved").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn merge_errors_are_collected_without_failing_the_job() {
        let store = InMemoryRecordStore::new();
        store.seed("account", population()).await;
        store.fail_consolidation_of("r02").await;
        let audit = InMemoryAuditSink::new();
        let jobs = InMemoryJobStateStore::new();
        let orchestrator =
            DedupeOrchestrator::new(&store, &audit, &jobs, config(4, false)).unwrap();

        let report = orchestrator
            .run_to_completion("job-partial", generous_budget)
            .await
            .unwrap();

        assert_eq!(report.status, CycleStatus::Completed);
        assert_eq!(report.state.records_merged, 1);
        assert_eq!(report.state.errors.len(), 1);
        assert!(report.state.errors[0].contains("r02"));
        assert!(store.contains("account", "r02").await);
    }

    #[tokio::test]
    async fn cancellation_is_observed_at_chunk_boundaries() {
        let store = InMemoryRecordStore::new();
        store.seed("account", population()).await;
        let audit = InMemoryAuditSink::new();
        let jobs = InMemoryJobStateStore::new();
        let flag = Arc::new(AtomicBool::new(true));
        let orchestrator = DedupeOrchestrator::new(&store, &audit, &jobs, config(2, false))
            .unwrap()
            .with_cancel_flag(flag.clone());

        let report = orchestrator.run_cycle("job-cancel", &generous_budget()).await.unwrap();
        assert_eq!(report.status, CycleStatus::Yielded);
        assert_eq!(report.state.records_processed, 0);
        assert_eq!(store.len("account").await, 8);

        // Lifting the cancellation lets the job finish from its cursor.
        flag.store(false, Ordering::SeqCst);
        let report = orchestrator
            .run_to_completion("job-cancel", generous_budget)
            .await
            .unwrap();
        assert_eq!(report.status, CycleStatus::Completed);
        assert_eq!(report.state.records_processed, 8);
    }

    #[tokio::test]
    async fn terminal_jobs_are_not_reprocessed() {
        let store = InMemoryRecordStore::new();
        store.seed("account", population()).await;
        let audit = InMemoryAuditSink::new();
        let jobs = InMemoryJobStateStore::new();
        let orchestrator =
            DedupeOrchestrator::new(&store, &audit, &jobs, config(100, false)).unwrap();

        let first = orchestrator.run_cycle("job-once", &generous_budget()).await.unwrap();
        assert_eq!(first.status, CycleStatus::Completed);
        let processed = first.state.records_processed;

        let second = orchestrator.run_cycle("job-once", &generous_budget()).await.unwrap();
        assert_eq!(second.status, CycleStatus::Completed);
        assert_eq!(second.state.records_processed, processed);
        assert_eq!(store.len("account").await, 6);
    }

    /// Record store that starts failing fetches after a set number of
    /// calls, for exercising the job-failure path.
    struct FailingFetchStore {
        inner: InMemoryRecordStore,
        fetches: AtomicUsize,
        fail_from: usize,
    }

    impl RecordStore for FailingFetchStore {
        async fn count(&self, object_type: &str) -> Result<usize> {
            self.inner.count(object_type).await
        }

        async fn fetch_chunk(
            &self,
            object_type: &str,
            after_id: Option<&str>,
            limit: usize,
        ) -> Result<Vec<Record>> {
            let call = self.fetches.fetch_add(1, Ordering::SeqCst);
            if call >= self.fail_from {
                return Err(anyhow!("storage offline"));
            }
            self.inner.fetch_chunk(object_type, after_id, limit).await
        }

        async fn consolidate(
            &self,
            object_type: &str,
            master_id: &str,
            duplicate_ids: &[String],
        ) -> Result<ConsolidationOutcome> {
            self.inner.consolidate(object_type, master_id, duplicate_ids).await
        }
    }

    #[tokio::test]
    async fn unhandled_chunk_error_fails_the_job_but_keeps_progress() {
        let store = FailingFetchStore {
            inner: InMemoryRecordStore::new(),
            fetches: AtomicUsize::new(0),
            fail_from: 2,
        };
        store.inner.seed("account", population()).await;
        let audit = InMemoryAuditSink::new();
        let jobs = InMemoryJobStateStore::new();
        let orchestrator =
            DedupeOrchestrator::new(&store, &audit, &jobs, config(2, false)).unwrap();

        let report = orchestrator.run_cycle("job-fail", &generous_budget()).await.unwrap();
        assert_eq!(report.status, CycleStatus::Failed);
        assert_eq!(report.state.status, JobStatus::Failed);
        // Chunks one and two committed before the third fetch died.
        assert_eq!(report.state.records_processed, 4);
        assert_eq!(report.state.records_merged, 2);
        assert!(report.state.errors.iter().any(|e| e.contains("storage offline")));
        // Committed merges are retained, not rolled back.
        assert!(!store.inner.contains("account", "r02").await);

        // No further chunks run on a failed job.
        let after = orchestrator.run_cycle("job-fail", &generous_budget()).await.unwrap();
        assert_eq!(after.status, CycleStatus::Failed);
        assert_eq!(after.state.records_processed, 4);
    }
}
