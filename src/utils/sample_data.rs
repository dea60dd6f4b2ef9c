// src/utils/sample_data.rs
//
// Seeded synthetic account populations for the demo binaries. Roughly a
// quarter of the records are near-duplicates of their predecessor:
// abbreviated names and streets, reformatted phone numbers, case noise.
use chrono::{Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::models::core::Record;

const COMPANY_STEMS: [&str; 12] = [
    "Acme", "Initech", "Globex", "Umbrella", "Stark", "Wayne", "Oscorp", "Hooli", "Vandelay",
    "Wonka", "Tyrell", "Cyberdyne",
];

const COMPANY_SUFFIXES: [&str; 6] = [
    "Corporation", "Industries", "Holdings", "Group", "Laboratories", "Partners",
];

const STREET_NAMES: [&str; 8] = [
    "Pine", "Oak", "Maple", "Birch", "Cedar", "Walnut", "Spruce", "Elm",
];

const CITIES: [&str; 8] = [
    "Oakland", "Berkeley", "Davis", "Fresno", "San Jose", "Napa", "Eureka", "Monterey",
];

fn abbreviate_suffix(name: &str) -> String {
    name.replace("Corporation", "Corp.")
        .replace("Industries", "Ind.")
        .replace("Laboratories", "Labs")
        .replace("Holdings", "Hldgs")
}

fn reformat_phone(rng: &mut StdRng, area: u32, prefix: u32, line: u32) -> String {
    match rng.gen_range(0..4) {
        0 => format!("({}) {}-{}", area, prefix, line),
        1 => format!("{}-{}-{}", area, prefix, line),
        2 => format!("{}.{}.{}", area, prefix, line),
        _ => format!("+1 {} {} {}", area, prefix, line),
    }
}

/// Generates `count` account records in identity order, seeded so the
/// same arguments always produce the same population.
pub fn generate_accounts(count: usize, seed: u64) -> Vec<Record> {
    let mut rng = StdRng::seed_from_u64(seed);
    let base_time = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).single().unwrap_or_else(Utc::now);
    let mut records: Vec<Record> = Vec::with_capacity(count);
    let mut last_original: Option<usize> = None;

    for i in 0..count {
        let id = format!("acct-{:06}", i);
        let created_at = base_time + Duration::minutes(i as i64);

        // Roughly every fourth record shadows the previous original.
        let duplicate_of = if rng.gen_ratio(1, 4) { last_original } else { None };

        let record = match duplicate_of.and_then(|idx| records.get(idx)) {
            Some(original) => {
                let mut record = Record::new(id, created_at);
                let name = original.matchable("name").unwrap_or_default();
                record.set_field(
                    "name",
                    if rng.gen_bool(0.5) {
                        abbreviate_suffix(&name)
                    } else {
                        name.to_uppercase()
                    },
                );
                if let Some(phone) = original.matchable("phone") {
                    let digits: String = phone.chars().filter(|c| c.is_ascii_digit()).collect();
                    if digits.len() == 10 {
                        let area: u32 = digits[0..3].parse().unwrap_or(415);
                        let prefix: u32 = digits[3..6].parse().unwrap_or(555);
                        let line: u32 = digits[6..10].parse().unwrap_or(1000);
                        record.set_field("phone", reformat_phone(&mut rng, area, prefix, line));
                    }
                }
                if let Some(street) = original.matchable("billing_street") {
                    record.set_field(
                        "billing_street",
                        if rng.gen_bool(0.5) {
                            street.replace("Street", "St").replace("Avenue", "Ave")
                        } else {
                            street
                        },
                    );
                }
                if let Some(city) = original.matchable("billing_city") {
                    record.set_field("billing_city", city);
                }
                if rng.gen_bool(0.7) {
                    if let Some(email) = original.matchable("email") {
                        record.set_field("email", email);
                    }
                }
                record
            }
            None => {
                last_original = Some(i);
                let stem = COMPANY_STEMS[rng.gen_range(0..COMPANY_STEMS.len())];
                let suffix = COMPANY_SUFFIXES[rng.gen_range(0..COMPANY_SUFFIXES.len())];
                let street = STREET_NAMES[rng.gen_range(0..STREET_NAMES.len())];
                let city = CITIES[rng.gen_range(0..CITIES.len())];
                let area = 200 + rng.gen_range(0..700);
                let prefix = 200 + rng.gen_range(0..700);
                let line = rng.gen_range(1000..10000);
                let number = rng.gen_range(1..999);
                Record::new(id, created_at)
                    .with_field("name", format!("{} {} {}", stem, suffix, number))
                    .with_field("phone", format!("{}-{}-{}", area, prefix, line))
                    .with_field("email", format!("contact@{}{}.example.com", stem.to_lowercase(), number))
                    .with_field("billing_street", format!("{} {} Street", number, street))
                    .with_field("billing_city", city)
            }
        };
        records.push(record);
    }
    records
}
