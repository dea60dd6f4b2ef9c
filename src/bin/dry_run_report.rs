// src/bin/dry_run_report.rs
//
// Detects duplicate groups over a synthetic population without merging
// anything and prints a per-group report, the way a presentation layer
// would render a dry run.
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use dedupe_lib::batch::budget::CycleBudget;
use dedupe_lib::batch::orchestrator::DedupeOrchestrator;
use dedupe_lib::models::core::{DedupeConfig, FieldSpec};
use dedupe_lib::storage::memory::{InMemoryAuditSink, InMemoryJobStateStore, InMemoryRecordStore};
use dedupe_lib::utils::env::load_env;
use dedupe_lib::utils::sample_data::generate_accounts;
use log::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "dry_run_report", about = "Report duplicate groups without merging")]
struct Args {
    #[arg(long, default_value_t = 1_000)]
    records: usize,

    #[arg(long, default_value_t = 42)]
    seed: u64,

    #[arg(long, default_value_t = 75.0)]
    threshold: f64,

    /// Maximum groups to print in full.
    #[arg(long, default_value_t = 25)]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    load_env();
    let args = Args::parse();

    let store = InMemoryRecordStore::new();
    store.seed("account", generate_accounts(args.records, args.seed)).await;

    let mut config = DedupeConfig::new(
        "account",
        vec![
            FieldSpec::fuzzy("name"),
            FieldSpec::fuzzy("phone"),
            FieldSpec::fuzzy("email"),
            FieldSpec::fuzzy("billing_street"),
            FieldSpec::exact("billing_city"),
        ],
    );
    config.fuzzy_threshold = args.threshold;
    config.dry_run = true;

    let audit = InMemoryAuditSink::new();
    let jobs = InMemoryJobStateStore::new();
    let orchestrator = DedupeOrchestrator::new(&store, &audit, &jobs, config)?;

    let job_id = Uuid::new_v4().to_string();
    info!("Dry run {} over {} record(s)", job_id, args.records);
    let report = orchestrator
        .run_to_completion(&job_id, || CycleBudget::new(10_000, Duration::from_secs(60)))
        .await?;

    let mut groups: Vec<_> = report.groups.values().collect();
    groups.sort_by(|a, b| {
        b.match_score
            .partial_cmp(&a.match_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.group_key.cmp(&b.group_key))
    });

    println!("Duplicate group report ({} groups)", groups.len());
    println!("=========================================");
    for group in groups.iter().take(args.limit) {
        println!(
            "{} | score {:.1} | {} | {} member(s)",
            group.group_key,
            group.match_score,
            if group.is_exact_match { "exact" } else { "fuzzy" },
            group.size()
        );
        for record in &group.records {
            println!(
                "    {}  {}  {}",
                record.id,
                record.matchable("name").unwrap_or_default(),
                record.matchable("phone").unwrap_or_default()
            );
        }
    }
    if groups.len() > args.limit {
        println!("... and {} more group(s)", groups.len() - args.limit);
    }
    println!(
        "{} of {} record(s) would be merged away",
        report.state.duplicates_found, report.state.records_processed
    );
    Ok(())
}
