// src/models/core.rs
use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DedupeError;

pub const DEFAULT_FUZZY_THRESHOLD: f64 = 75.0;
pub const DEFAULT_CHUNK_SIZE: usize = 200;

/// Closed scalar type for record field values. Records are attribute bags
/// over this type; no raw reflection anywhere.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Number(f64),
    Boolean(bool),
    Timestamp(DateTime<Utc>),
    Null,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Whether the value counts as populated. Whitespace-only text is
    /// treated as unpopulated, the same way null is treated as empty
    /// string during key building.
    pub fn is_populated(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Text(s) => !s.trim().is_empty(),
            _ => true,
        }
    }

    /// The string form used for matching and key building. `None` for
    /// null and blank text.
    pub fn matchable_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(trimmed.to_string())
                }
            }
            Value::Number(n) => Some(format!("{}", n)),
            Value::Boolean(b) => Some(b.to_string()),
            Value::Timestamp(ts) => Some(ts.to_rfc3339()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => write!(f, "{}", s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Boolean(b) => write!(f, "{}", b),
            Value::Timestamp(ts) => write!(f, "{}", ts.to_rfc3339()),
            Value::Null => write!(f, "<null>"),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

/// A generic, identity-bearing attribute bag representing one business
/// entity instance. Owned by the record store; the engine only reads it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub created_at: DateTime<Utc>,
    fields: BTreeMap<String, Value>,
}

impl Record {
    pub fn new(id: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            created_at,
            fields: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// A field absent from the bag reads the same as an explicit null.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field).filter(|v| !v.is_null())
    }

    /// The matchable string form of a field, or `None` when the field is
    /// absent, null or blank.
    pub fn matchable(&self, field: &str) -> Option<String> {
        self.get(field).and_then(Value::matchable_text)
    }

    pub fn fields(&self) -> &BTreeMap<String, Value> {
        &self.fields
    }

    /// Number of populated fields, used by the MostComplete strategy.
    pub fn populated_field_count(&self) -> usize {
        self.fields.values().filter(|v| v.is_populated()).count()
    }
}

/// How a field participates in composite-key building.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchType {
    Exact,
    Fuzzy,
    Phonetic,
}

/// Configuration describing how one field participates in key building
/// and fuzzy scoring. A `None` weight defers to the built-in weight
/// table; an explicit weight takes precedence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub required: bool,
    pub match_type: MatchType,
    pub weight: Option<f64>,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, match_type: MatchType) -> Self {
        Self {
            name: name.into(),
            required: false,
            match_type,
            weight: None,
        }
    }

    pub fn exact(name: impl Into<String>) -> Self {
        Self::new(name, MatchType::Exact)
    }

    pub fn fuzzy(name: impl Into<String>) -> Self {
        Self::new(name, MatchType::Fuzzy)
    }

    pub fn phonetic(name: impl Into<String>) -> Self {
        Self::new(name, MatchType::Phonetic)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }
}

/// Master-record selection policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MasterStrategy {
    OldestCreated,
    NewestCreated,
    MostComplete,
}

impl MasterStrategy {
    /// Lenient parse; unknown strings default to OldestCreated.
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "newest" | "newestcreated" => MasterStrategy::NewestCreated,
            "mostcomplete" | "complete" => MasterStrategy::MostComplete,
            _ => MasterStrategy::OldestCreated,
        }
    }
}

impl fmt::Display for MasterStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MasterStrategy::OldestCreated => "oldest_created",
            MasterStrategy::NewestCreated => "newest_created",
            MasterStrategy::MostComplete => "most_complete",
        };
        write!(f, "{}", s)
    }
}

/// Top-level configuration for one dedupe job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupeConfig {
    pub object_type: String,
    pub field_specs: Vec<FieldSpec>,
    pub master_strategy: MasterStrategy,
    pub fuzzy_threshold: f64,
    pub chunk_size: usize,
    pub dry_run: bool,
}

impl DedupeConfig {
    pub fn new(object_type: impl Into<String>, field_specs: Vec<FieldSpec>) -> Self {
        Self {
            object_type: object_type.into(),
            field_specs,
            master_strategy: MasterStrategy::OldestCreated,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            dry_run: false,
        }
    }

    pub fn validate(&self) -> Result<(), DedupeError> {
        if self.object_type.trim().is_empty() {
            return Err(DedupeError::Configuration(
                "object_type must not be empty".into(),
            ));
        }
        if self.field_specs.is_empty() {
            return Err(DedupeError::Configuration(
                "at least one field spec is required for grouping".into(),
            ));
        }
        for spec in &self.field_specs {
            if spec.name.trim().is_empty() {
                return Err(DedupeError::Configuration(
                    "field spec names must not be empty".into(),
                ));
            }
            if let Some(w) = spec.weight {
                if !w.is_finite() || w < 0.0 {
                    return Err(DedupeError::Configuration(format!(
                        "field '{}' has invalid weight {}",
                        spec.name, w
                    )));
                }
            }
        }
        if !(0.0..=100.0).contains(&self.fuzzy_threshold) {
            return Err(DedupeError::Configuration(format!(
                "fuzzy_threshold must be within 0..=100, got {}",
                self.fuzzy_threshold
            )));
        }
        if self.chunk_size == 0 {
            return Err(DedupeError::Configuration(
                "chunk_size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
