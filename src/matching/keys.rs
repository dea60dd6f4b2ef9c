// src/matching/keys.rs
use crate::matching::normalize::Normalizer;
use crate::models::core::{FieldSpec, MatchType, Record};

/// Separator guaranteed not to appear in normalized output (normalization
/// strips `|` and `#`).
pub const KEY_SEPARATOR: &str = "|#|";

/// Reserved stand-in for an optional field with no usable value. Contains
/// characters normalization can never produce, so it cannot collide with
/// real data.
pub const NULL_VALUE_TOKEN: &str = "<null>";

/// Deterministic consonant skeleton: letters only, lowercased, first
/// letter kept, vowels stripped from the remainder.
pub fn phonetic_skeleton(value: &str) -> String {
    let letters: String = value
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .collect::<String>()
        .to_lowercase();
    let mut chars = letters.chars();
    let first = match chars.next() {
        Some(c) => c,
        None => return String::new(),
    };
    let mut skeleton = String::with_capacity(letters.len());
    skeleton.push(first);
    skeleton.extend(chars.filter(|c| !matches!(c, 'a' | 'e' | 'i' | 'o' | 'u')));
    skeleton
}

fn normalize_for_key(normalizer: &Normalizer, value: &str, match_type: MatchType) -> String {
    match match_type {
        MatchType::Exact => value.trim().to_lowercase(),
        MatchType::Fuzzy => value
            .to_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect(),
        MatchType::Phonetic => phonetic_skeleton(value),
    }
}

/// Builds the exact-match partition key for a record.
///
/// Null and blank-normalizing values are treated alike: on a required
/// field they void the whole key (empty string — the record is excluded
/// from exact-key grouping); on an optional field they contribute the
/// reserved placeholder token. Parts follow the field-spec input order,
/// so the same spec list always produces comparable keys.
pub fn build_composite_key(
    normalizer: &Normalizer,
    record: &Record,
    field_specs: &[FieldSpec],
) -> String {
    let mut parts: Vec<String> = Vec::with_capacity(field_specs.len());
    for spec in field_specs {
        let normalized = record
            .matchable(&spec.name)
            .map(|raw| normalize_for_key(normalizer, &raw, spec.match_type))
            .filter(|n| !n.is_empty());
        match normalized {
            Some(part) => parts.push(part),
            None if spec.required => return String::new(),
            None => parts.push(NULL_VALUE_TOKEN.to_string()),
        }
    }
    parts.join(KEY_SEPARATOR)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn rec(fields: &[(&str, &str)]) -> Record {
        let mut record = Record::new("r", Utc::now());
        for (name, value) in fields {
            record.set_field(*name, *value);
        }
        record
    }

    #[test]
    fn skeleton_keeps_first_letter_and_consonants() {
        assert_eq!(phonetic_skeleton("Robert"), "rbrt");
        assert_eq!(phonetic_skeleton("Acme"), "acm");
        assert_eq!(phonetic_skeleton("Oakland"), "oklnd");
        assert_eq!(phonetic_skeleton("A"), "a");
        assert_eq!(phonetic_skeleton("42"), "");
    }

    #[test]
    fn key_respects_match_type_normalization() {
        let normalizer = Normalizer::new();
        let record = rec(&[("name", "Acme Corp."), ("city", " Oakland "), ("code", "Robert")]);
        let specs = vec![
            FieldSpec::fuzzy("name"),
            FieldSpec::exact("city"),
            FieldSpec::phonetic("code"),
        ];
        let key = build_composite_key(&normalizer, &record, &specs);
        assert_eq!(key, format!("acmecorp{0}oakland{0}rbrt", KEY_SEPARATOR));
    }

    #[test]
    fn key_is_deterministic_and_order_preserving() {
        let normalizer = Normalizer::new();
        let record = rec(&[("a", "one"), ("b", "two")]);
        let forward = vec![FieldSpec::exact("a"), FieldSpec::exact("b")];
        let reversed = vec![FieldSpec::exact("b"), FieldSpec::exact("a")];
        let k1 = build_composite_key(&normalizer, &record, &forward);
        let k2 = build_composite_key(&normalizer, &record, &forward);
        assert_eq!(k1, k2);
        assert_ne!(k1, build_composite_key(&normalizer, &record, &reversed));
    }

    #[test]
    fn required_null_voids_the_key() {
        let normalizer = Normalizer::new();
        let record = rec(&[("city", "Oakland")]);
        let specs = vec![FieldSpec::fuzzy("name").required(), FieldSpec::exact("city")];
        assert_eq!(build_composite_key(&normalizer, &record, &specs), "");
    }

    #[test]
    fn optional_null_and_blank_share_the_placeholder() {
        let normalizer = Normalizer::new();
        let specs = vec![FieldSpec::fuzzy("name"), FieldSpec::fuzzy("suite")];
        let with_null = rec(&[("name", "Acme")]);
        let with_blank = rec(&[("name", "Acme"), ("suite", "   ")]);
        let k1 = build_composite_key(&normalizer, &with_null, &specs);
        let k2 = build_composite_key(&normalizer, &with_blank, &specs);
        assert_eq!(k1, k2);
        assert!(k1.contains(NULL_VALUE_TOKEN));
    }

    #[test]
    fn punctuation_only_fuzzy_value_counts_as_null() {
        let normalizer = Normalizer::new();
        let specs = vec![FieldSpec::fuzzy("name"), FieldSpec::fuzzy("note")];
        let dashes = rec(&[("name", "Acme"), ("note", "---")]);
        let none = rec(&[("name", "Acme")]);
        assert_eq!(
            build_composite_key(&normalizer, &dashes, &specs),
            build_composite_key(&normalizer, &none, &specs)
        );
    }
}
