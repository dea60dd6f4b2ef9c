use std::collections::HashMap;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::Parser;
use dedupe_lib::batch::budget::CycleBudget;
use dedupe_lib::batch::orchestrator::{CycleStatus, DedupeOrchestrator, MAX_EXECUTION_CYCLES};
use dedupe_lib::models::core::{DedupeConfig, FieldSpec, MasterStrategy};
use dedupe_lib::storage::memory::{InMemoryAuditSink, InMemoryJobStateStore, InMemoryRecordStore};
use dedupe_lib::utils::env::load_env;
use dedupe_lib::utils::{get_memory_usage, sample_data::generate_accounts};
use indicatif::{ProgressBar, ProgressStyle};
use log::info;
use uuid::Uuid;

/// Demo pipeline: generates a synthetic account population, then runs
/// the chunked dedupe job over it with a per-cycle resource budget.
#[derive(Parser, Debug)]
#[command(name = "dedupe", about = "Duplicate detection and merge over a record collection")]
struct Args {
    /// Object type the job runs against.
    #[arg(long, default_value = "account")]
    object_type: String,

    /// Number of synthetic records to generate.
    #[arg(long, default_value_t = 2_000)]
    records: usize,

    /// Seed for the synthetic population.
    #[arg(long, default_value_t = 42)]
    seed: u64,

    /// Records per chunk.
    #[arg(long, default_value_t = 200)]
    chunk_size: usize,

    /// Fuzzy match threshold (0-100).
    #[arg(long, default_value_t = 75.0)]
    threshold: f64,

    /// Master selection strategy: oldest_created, newest_created or
    /// most_complete.
    #[arg(long, default_value = "oldest_created")]
    strategy: String,

    /// Detect and report groups without merging anything.
    #[arg(long)]
    dry_run: bool,

    /// Store-operation allowance per execution cycle.
    #[arg(long, default_value_t = 500)]
    ops_per_cycle: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let args = Args::parse();

    info!("Starting record dedupe pipeline");
    let start = Instant::now();

    let store = InMemoryRecordStore::new();
    let population = generate_accounts(args.records, args.seed);
    store.seed(&args.object_type, population).await;
    info!(
        "Seeded {} '{}' record(s) (seed {})",
        args.records, args.object_type, args.seed
    );

    let mut config = DedupeConfig::new(
        &args.object_type,
        vec![
            FieldSpec::fuzzy("name"),
            FieldSpec::fuzzy("phone"),
            FieldSpec::fuzzy("email"),
            FieldSpec::fuzzy("billing_street"),
            FieldSpec::exact("billing_city"),
        ],
    );
    config.master_strategy = MasterStrategy::parse(&args.strategy);
    config.fuzzy_threshold = args.threshold;
    config.chunk_size = args.chunk_size;
    config.dry_run = args.dry_run;

    let audit = InMemoryAuditSink::new();
    let jobs = InMemoryJobStateStore::new();
    let orchestrator = DedupeOrchestrator::new(&store, &audit, &jobs, config)?;

    let job_id = Uuid::new_v4().to_string();
    info!("Job ID: {}", job_id);

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap(),
    );

    let mut cycles = 0usize;
    let mut dry_run_groups = HashMap::new();
    let report = loop {
        cycles += 1;
        if cycles > MAX_EXECUTION_CYCLES {
            bail!("job {} exceeded {} execution cycles", job_id, MAX_EXECUTION_CYCLES);
        }
        let budget = CycleBudget::new(args.ops_per_cycle, Duration::from_secs(30));
        let mut report = orchestrator.run_cycle(&job_id, &budget).await?;
        dry_run_groups.extend(report.groups.drain());
        pb.set_message(format!(
            "cycle {}: {} processed, {} duplicates, {} merged",
            cycles,
            report.state.records_processed,
            report.state.duplicates_found,
            report.state.records_merged
        ));
        pb.tick();
        match report.status {
            CycleStatus::Yielded => continue,
            _ => break report,
        }
    };
    pb.finish_with_message(format!("{:?} after {} cycle(s)", report.status, cycles));

    let state = &report.state;
    info!("=== Dedupe Summary ===");
    info!("Job ID: {}", job_id);
    info!("Status: {:?}", state.status);
    info!("Execution cycles: {}", cycles);
    info!("Records processed: {}", state.records_processed);
    info!("Duplicates found: {}", state.duplicates_found);
    info!("Records merged: {}", state.records_merged);
    info!("Errors: {}", state.errors.len());
    for error in state.errors.iter().take(10) {
        info!("  - {}", error);
    }
    info!("Remaining records: {}", store.len(&args.object_type).await);
    info!("Audit notes written: {}", audit.notes().await.len());
    info!("Total execution time: {:.2?}", start.elapsed());
    info!("Final memory usage: {} MB", get_memory_usage().await);

    if args.dry_run {
        info!("Dry run: {} duplicate group(s) detected", dry_run_groups.len());
        let mut groups: Vec<_> = dry_run_groups.values().collect();
        groups.sort_by(|a, b| {
            b.match_score
                .partial_cmp(&a.match_score)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for group in groups.iter().take(10) {
            info!(
                "  {} [{}] score {:.1}: {}",
                group.group_key,
                if group.is_exact_match { "exact" } else { "fuzzy" },
                group.match_score,
                group
                    .records
                    .iter()
                    .map(|r| r.id.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }
    }

    info!("Pipeline completed successfully!");
    Ok(())
}
