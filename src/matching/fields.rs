// src/matching/fields.rs
use url::Url;

use crate::matching::normalize::Normalizer;
use crate::matching::similarity::similarity_ratio;

/// Strings shorter than this require an exact match; similarity ratios on
/// one- and two-character values are meaningless.
const MIN_FUZZY_LENGTH: usize = 3;

/// Blend weights for the name matcher: whole-string similarity vs shared
/// token coverage.
const NAME_WHOLE_STRING_WEIGHT: f64 = 0.4;
const NAME_TOKEN_WEIGHT: f64 = 0.6;

/// Semantic category a field falls into, decided by name heuristics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldCategory {
    Email,
    Phone,
    Name,
    Address,
    Website,
    Generic,
}

impl FieldCategory {
    pub fn of(field_name: &str) -> Self {
        let lower = field_name.to_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
        if lower.contains("email") {
            FieldCategory::Email
        } else if has(&["phone", "mobile", "fax"]) {
            FieldCategory::Phone
        } else if lower.contains("name") {
            FieldCategory::Name
        } else if has(&["address", "street", "city", "state", "country", "postal", "zip"]) {
            FieldCategory::Address
        } else if has(&["website", "url", "domain"]) {
            FieldCategory::Website
        } else {
            FieldCategory::Generic
        }
    }
}

/// Built-in field weights for fuzzy scoring, keyed by common field-name
/// patterns. Configuration-level overrides take precedence.
pub fn default_weight(field_name: &str) -> f64 {
    let lower = field_name.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
    if lower.contains("email") {
        0.8
    } else if has(&["phone", "mobile", "fax"]) {
        0.7
    } else if lower.contains("name") {
        0.6
    } else if has(&["postal", "zip"]) {
        0.4
    } else if lower.contains("city") {
        0.35
    } else if has(&["street", "address", "state", "country"]) {
        0.3
    } else if has(&["website", "url", "domain"]) {
        0.4
    } else {
        0.5
    }
}

/// A field-semantic scorer. Implementations receive raw (non-null,
/// non-blank) values and return a score in [0, 100].
pub trait FieldScorer: Send + Sync {
    fn score(&self, normalizer: &Normalizer, value1: &str, value2: &str) -> f64;
}

// ---------------------------------------------------------------------------
// Email
// ---------------------------------------------------------------------------

/// Email scoring. Canonical equality (alias tags stripped, gmail dots
/// removed, googlemail folded) scores 100; different domains score 0;
/// same-domain addresses score the similarity of their local parts. In
/// strict mode anything short of canonical equality scores 0.
pub struct EmailMatcher {
    strict: bool,
}

impl EmailMatcher {
    pub fn partial() -> Self {
        Self { strict: false }
    }

    pub fn strict() -> Self {
        Self { strict: true }
    }
}

/// Canonical form for equivalence checks: `+tag` suffixes dropped,
/// `googlemail.com` folded to `gmail.com`, dots removed from gmail local
/// parts. `None` when the address has no usable local@domain shape.
fn canonical_email(normalized: &str) -> Option<(String, String)> {
    if normalized.matches('@').count() != 1 {
        return None;
    }
    let (local_full, domain) = normalized.split_once('@')?;
    let local_no_tag = local_full.split('+').next().unwrap_or("");
    let domain = match domain {
        "googlemail.com" => "gmail.com",
        other => other,
    };
    let local = if domain == "gmail.com" {
        local_no_tag.replace('.', "")
    } else {
        local_no_tag.to_string()
    };
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    Some((local, domain.to_string()))
}

impl FieldScorer for EmailMatcher {
    fn score(&self, normalizer: &Normalizer, value1: &str, value2: &str) -> f64 {
        let e1 = normalizer.normalize_email(value1);
        let e2 = normalizer.normalize_email(value2);
        if e1.is_empty() || e2.is_empty() {
            return 0.0;
        }
        if e1 == e2 {
            return 100.0;
        }
        match (canonical_email(&e1), canonical_email(&e2)) {
            (Some((local1, domain1)), Some((local2, domain2))) => {
                if local1 == local2 && domain1 == domain2 {
                    100.0
                } else if self.strict {
                    0.0
                } else if domain1 != domain2 {
                    0.0
                } else {
                    similarity_ratio(&local1, &local2)
                }
            }
            // Not shaped like an email on at least one side; fall back to
            // generic text scoring (strict mode stays exact-only).
            _ => {
                if self.strict {
                    0.0
                } else {
                    GenericMatcher.score(normalizer, value1, value2)
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Phone
// ---------------------------------------------------------------------------

/// Digit-only exact matching, with 11-digit numbers carrying a leading
/// `1` compared in their 10-digit national form.
pub struct PhoneMatcher;

fn national_digits(normalizer: &Normalizer, raw: &str) -> String {
    let digits = normalizer.normalize_phone(raw);
    if digits.len() == 11 && digits.starts_with('1') {
        digits[1..].to_string()
    } else {
        digits
    }
}

impl FieldScorer for PhoneMatcher {
    fn score(&self, normalizer: &Normalizer, value1: &str, value2: &str) -> f64 {
        let d1 = national_digits(normalizer, value1);
        let d2 = national_digits(normalizer, value2);
        if d1.is_empty() || d2.is_empty() {
            return 0.0;
        }
        if d1 == d2 {
            100.0
        } else {
            0.0
        }
    }
}

// ---------------------------------------------------------------------------
// Name
// ---------------------------------------------------------------------------

/// Blended name scoring: whole-string similarity plus shared-token
/// coverage, where each token may be matched at most once.
pub struct NameMatcher;

fn common_token_score(tokens1: &[&str], tokens2: &[&str]) -> f64 {
    let max_tokens = tokens1.len().max(tokens2.len());
    if max_tokens == 0 {
        return 0.0;
    }
    let mut remaining: Vec<&str> = tokens2.to_vec();
    let mut matched = 0usize;
    for token in tokens1 {
        if let Some(pos) = remaining.iter().position(|t| t == token) {
            remaining.swap_remove(pos);
            matched += 1;
        }
    }
    100.0 * matched as f64 / max_tokens as f64
}

impl FieldScorer for NameMatcher {
    fn score(&self, normalizer: &Normalizer, value1: &str, value2: &str) -> f64 {
        let n1 = normalizer.normalize(value1);
        let n2 = normalizer.normalize(value2);
        if n1 == n2 {
            return 100.0;
        }
        if n1.chars().count() < MIN_FUZZY_LENGTH || n2.chars().count() < MIN_FUZZY_LENGTH {
            return 0.0;
        }
        let whole = similarity_ratio(&n1, &n2);
        let tokens1: Vec<&str> = n1.split_whitespace().collect();
        let tokens2: Vec<&str> = n2.split_whitespace().collect();
        let tokens = common_token_score(&tokens1, &tokens2);
        NAME_WHOLE_STRING_WEIGHT * whole + NAME_TOKEN_WEIGHT * tokens
    }
}

// ---------------------------------------------------------------------------
// Address
// ---------------------------------------------------------------------------

/// Token-overlap address scoring with street-type abbreviations expanded
/// before comparison.
pub struct AddressMatcher;

fn expand_street_abbreviation(token: &str) -> &str {
    match token {
        "st" | "str" => "street",
        "rd" => "road",
        "ave" | "av" => "avenue",
        "blvd" | "blv" => "boulevard",
        "dr" => "drive",
        "ln" => "lane",
        "ct" => "court",
        "pl" => "place",
        "sq" => "square",
        "pkwy" => "parkway",
        "cir" => "circle",
        "hwy" => "highway",
        other => other,
    }
}

fn address_tokens(normalizer: &Normalizer, raw: &str) -> Vec<String> {
    normalizer
        .normalize(raw)
        .split_whitespace()
        .map(|t| expand_street_abbreviation(t).to_string())
        .collect()
}

impl FieldScorer for AddressMatcher {
    fn score(&self, normalizer: &Normalizer, value1: &str, value2: &str) -> f64 {
        let tokens1 = address_tokens(normalizer, value1);
        let tokens2 = address_tokens(normalizer, value2);
        if tokens1 == tokens2 {
            return 100.0;
        }
        let total1 = tokens1.len();
        let total2 = tokens2.len();
        if total1 == 0 || total2 == 0 {
            return 0.0;
        }
        let mut remaining = tokens1.clone();
        let mut common = 0usize;
        for token in &tokens2 {
            if let Some(pos) = remaining.iter().position(|t| t == token) {
                remaining.swap_remove(pos);
                common += 1;
            }
        }
        let union = total1 + total2 - common;
        100.0 * common as f64 / union as f64
    }
}

// ---------------------------------------------------------------------------
// Website
// ---------------------------------------------------------------------------

/// Host-level equality for website fields: identical hosts (scheme and
/// `www.` ignored) score 100, anything else 0.
pub struct WebsiteMatcher;

fn extract_host(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed = Url::parse(trimmed)
        .ok()
        .filter(|u| u.host_str().is_some())
        .or_else(|| Url::parse(&format!("http://{}", trimmed)).ok())?;
    let host = parsed.host_str()?.to_lowercase();
    Some(host.strip_prefix("www.").unwrap_or(&host).to_string())
}

impl FieldScorer for WebsiteMatcher {
    fn score(&self, _normalizer: &Normalizer, value1: &str, value2: &str) -> f64 {
        match (extract_host(value1), extract_host(value2)) {
            (Some(h1), Some(h2)) if h1 == h2 => 100.0,
            _ => 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Generic
// ---------------------------------------------------------------------------

/// Catch-all text scoring: normalized equality, then plain similarity
/// ratio, with short strings held to exact matches.
pub struct GenericMatcher;

impl FieldScorer for GenericMatcher {
    fn score(&self, normalizer: &Normalizer, value1: &str, value2: &str) -> f64 {
        let n1 = normalizer.normalize(value1);
        let n2 = normalizer.normalize(value2);
        if n1 == n2 {
            return 100.0;
        }
        if n1.chars().count() < MIN_FUZZY_LENGTH || n2.chars().count() < MIN_FUZZY_LENGTH {
            return 0.0;
        }
        similarity_ratio(&n1, &n2)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

type FieldPredicate = Box<dyn Fn(&str) -> bool + Send + Sync>;

struct RegistryEntry {
    predicate: FieldPredicate,
    scorer: Box<dyn FieldScorer>,
}

/// Ordered list of (predicate, scorer) pairs. Dispatch walks the entries
/// in registration order and uses the first predicate that accepts the
/// field name; registries are constructed explicitly and injected rather
/// than living behind a global factory.
pub struct MatcherRegistry {
    entries: Vec<RegistryEntry>,
}

impl MatcherRegistry {
    pub fn empty() -> Self {
        Self { entries: Vec::new() }
    }

    /// The standard registry: partial email scoring plus the phone, name,
    /// address, website and generic matchers.
    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register_category(FieldCategory::Email, EmailMatcher::partial());
        registry.register_category(FieldCategory::Phone, PhoneMatcher);
        registry.register_category(FieldCategory::Name, NameMatcher);
        registry.register_category(FieldCategory::Address, AddressMatcher);
        registry.register_category(FieldCategory::Website, WebsiteMatcher);
        registry.register_category(FieldCategory::Generic, GenericMatcher);
        registry
    }

    /// The registry the grouping engine installs by default: identical to
    /// the standard one except that email fields are exact-only (0/100).
    pub fn for_grouping() -> Self {
        let mut registry = Self::empty();
        registry.register_category(FieldCategory::Email, EmailMatcher::strict());
        registry.register_category(FieldCategory::Phone, PhoneMatcher);
        registry.register_category(FieldCategory::Name, NameMatcher);
        registry.register_category(FieldCategory::Address, AddressMatcher);
        registry.register_category(FieldCategory::Website, WebsiteMatcher);
        registry.register_category(FieldCategory::Generic, GenericMatcher);
        registry
    }

    pub fn register_category(&mut self, category: FieldCategory, scorer: impl FieldScorer + 'static) {
        self.register(
            move |field: &str| FieldCategory::of(field) == category,
            scorer,
        );
    }

    pub fn register(
        &mut self,
        predicate: impl Fn(&str) -> bool + Send + Sync + 'static,
        scorer: impl FieldScorer + 'static,
    ) {
        self.entries.push(RegistryEntry {
            predicate: Box::new(predicate),
            scorer: Box::new(scorer),
        });
    }

    fn scorer_for(&self, field_name: &str) -> Option<&dyn FieldScorer> {
        self.entries
            .iter()
            .find(|entry| (entry.predicate)(field_name))
            .map(|entry| entry.scorer.as_ref())
    }

    /// Scores one field across a record pair. Either side missing scores
    /// 0; both missing is the caller's case to skip.
    pub fn score_pair(
        &self,
        normalizer: &Normalizer,
        field_name: &str,
        value1: Option<&str>,
        value2: Option<&str>,
    ) -> f64 {
        let (v1, v2) = match (value1, value2) {
            (Some(v1), Some(v2)) => (v1, v2),
            _ => return 0.0,
        };
        match self.scorer_for(field_name) {
            Some(scorer) => scorer.score(normalizer, v1, v2),
            None => 0.0,
        }
    }
}

impl Default for MatcherRegistry {
    fn default() -> Self {
        Self::standard()
    }
}
