// src/lib.rs
pub mod batch;
pub mod error;
pub mod matching;
pub mod merge;
pub mod models;
pub mod storage;
pub mod utils;

pub use batch::budget::{BudgetCounter, CycleBudget, ResourceBudget, StaticBudget};
pub use batch::orchestrator::{CycleReport, CycleStatus, DedupeOrchestrator};
pub use error::DedupeError;
pub use matching::engine::DuplicateGroupingEngine;
pub use matching::fields::MatcherRegistry;
pub use models::core::{DedupeConfig, FieldSpec, MasterStrategy, MatchType, Record, Value};
pub use models::matching::DuplicateGroup;
pub use models::stats_models::{JobState, JobStatus};
