// src/matching/normalize.rs
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use once_cell::sync::Lazy;
use regex::Regex;

/// Inputs whose cache key would exceed this length bypass the memo cache
/// entirely, which keeps a pathological value stream from ballooning it.
const MAX_CACHE_KEY_LEN: usize = 200;

/// Bounded number of memoized normalizations per kind-tagged key.
const NORMALIZE_CACHE_CAPACITY: usize = 4096;

static NON_ALPHANUMERIC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9]+").expect("static normalization pattern"));

/// Lowercases, replaces every non-alphanumeric run with a single space,
/// collapses whitespace, trims. Safe on blank input.
pub fn normalize_text(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    if lower.is_empty() {
        return String::new();
    }
    NON_ALPHANUMERIC_RE
        .replace_all(&lower, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Strips everything but digits.
pub fn normalize_phone(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Lowercase and trim only — the `@` and `.` must survive.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NormalizeKind {
    Text,
    Phone,
    Email,
}

impl NormalizeKind {
    fn apply(self, raw: &str) -> String {
        match self {
            NormalizeKind::Text => normalize_text(raw),
            NormalizeKind::Phone => normalize_phone(raw),
            NormalizeKind::Email => normalize_email(raw),
        }
    }
}

/// Normalization front-end with a bounded memoization cache, owned by the
/// engine instance rather than living as process-global state.
pub struct Normalizer {
    cache: Mutex<LruCache<(NormalizeKind, String), String>>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::with_capacity(NORMALIZE_CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn normalize(&self, raw: &str) -> String {
        self.cached(NormalizeKind::Text, raw)
    }

    pub fn normalize_phone(&self, raw: &str) -> String {
        self.cached(NormalizeKind::Phone, raw)
    }

    pub fn normalize_email(&self, raw: &str) -> String {
        self.cached(NormalizeKind::Email, raw)
    }

    pub fn clear(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            cache.clear();
        }
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }

    fn cached(&self, kind: NormalizeKind, raw: &str) -> String {
        if raw.len() > MAX_CACHE_KEY_LEN {
            return kind.apply(raw);
        }
        let key = (kind, raw.to_string());
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&key) {
                return hit.clone();
            }
            let computed = kind.apply(raw);
            cache.put(key, computed.clone());
            return computed;
        }
        kind.apply(raw)
    }
}

impl Default for Normalizer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation_and_collapses_whitespace() {
        assert_eq!(normalize_text("  Acme,   Corp.  "), "acme corp");
        assert_eq!(normalize_text("ACME-CORP #42"), "acme corp 42");
        assert_eq!(normalize_text(""), "");
        assert_eq!(normalize_text("   "), "");
        assert_eq!(normalize_text("!!!"), "");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in ["  Acme,   Corp.  ", "100 Pine St.", "A&B Holdings, LLC", ""] {
            let once = normalize_text(raw);
            assert_eq!(normalize_text(&once), once);
        }
    }

    #[test]
    fn phone_keeps_digits_only() {
        assert_eq!(normalize_phone("(415) 555-1234"), "4155551234");
        assert_eq!(normalize_phone("415-555-1234"), "4155551234");
        assert_eq!(normalize_phone("no digits"), "");
    }

    #[test]
    fn email_survives_punctuation() {
        assert_eq!(normalize_email("  User.Name@Example.COM "), "user.name@example.com");
        assert_eq!(normalize_email(""), "");
    }

    #[test]
    fn cache_hits_and_clears() {
        let normalizer = Normalizer::with_capacity(16);
        assert_eq!(normalizer.normalize("Acme Corp"), "acme corp");
        assert_eq!(normalizer.normalize("Acme Corp"), "acme corp");
        assert_eq!(normalizer.cached_entries(), 1);
        normalizer.clear();
        assert_eq!(normalizer.cached_entries(), 0);
    }

    #[test]
    fn oversized_inputs_bypass_the_cache() {
        let normalizer = Normalizer::with_capacity(16);
        let huge = "x".repeat(MAX_CACHE_KEY_LEN + 1);
        let _ = normalizer.normalize(&huge);
        assert_eq!(normalizer.cached_entries(), 0);
    }

    #[test]
    fn cache_capacity_is_bounded() {
        let normalizer = Normalizer::with_capacity(4);
        for i in 0..32 {
            let _ = normalizer.normalize(&format!("value {}", i));
        }
        assert!(normalizer.cached_entries() <= 4);
    }

    #[test]
    fn kinds_do_not_collide_in_the_cache() {
        let normalizer = Normalizer::with_capacity(16);
        assert_eq!(normalizer.normalize("415-555-1234"), "415 555 1234");
        assert_eq!(normalizer.normalize_phone("415-555-1234"), "4155551234");
    }
}
