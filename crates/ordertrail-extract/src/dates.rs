//! Natural-language date resolution for dates lifted out of message text.

use std::sync::LazyLock;

use chrono::{Datelike, Days, NaiveDate};
use regex::Regex;

static ORDINAL_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(\d{1,2})(?:st|nd|rd|th)\b").expect("ordinal regex"));

static LEADING_NOISE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:on|by|till|until|before)\s+|(?:mon|tue|tues|wed|thu|thur|thurs|fri|sat|sun)(?:day|sday|nesday|rsday|urday)?[\s,]+)+",
    )
    .expect("leading noise regex")
});

static IN_DAYS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^in\s+(\d{1,3})\s+days?\b").expect("in-days regex"));

static DAYS_AGO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(\d{1,3})\s+days?\s+ago\b").expect("days-ago regex"));

// %b only takes three-letter names; %B takes full names
const MONTH_NAME_FORMATS: &[&str] = &["%d %b %Y", "%d %B %Y", "%b %d %Y", "%B %d %Y"];
const NUMERIC_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%d-%b-%Y", "%d-%b-%y",
];

/// Resolve a loosely formatted date such as `on Tuesday, 14th Jan 2025`,
/// `Jan 14`, `14/01/2025` or `yesterday` against `reference`.
///
/// A missing year resolves to the reference year. Text after a parseable
/// prefix is ignored, so trailing times or sentences are harmless.
pub fn resolve_date(text: &str, reference: NaiveDate) -> Option<NaiveDate> {
    let trimmed = text
        .trim()
        .trim_matches(|c: char| c.is_ascii_punctuation() && c != '-' && c != '/');
    let cleaned = LEADING_NOISE.replace(trimmed, "");
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }

    if let Some(date) = resolve_relative(cleaned, reference) {
        return Some(date);
    }

    let cleaned = ORDINAL_SUFFIX.replace_all(cleaned, "$1");
    let normalized = cleaned.replace([',', '|'], " ");
    let tokens: Vec<&str> = normalized.split_whitespace().collect();

    if tokens.len() >= 3 {
        let candidate = tokens[..3].join(" ");
        if let Some(date) = parse_with(&candidate, MONTH_NAME_FORMATS) {
            return Some(date);
        }
    }
    if tokens.len() >= 2 {
        let candidate = format!("{} {}", tokens[..2].join(" "), reference.year());
        if let Some(date) = parse_with(&candidate, MONTH_NAME_FORMATS) {
            return Some(date);
        }
    }
    let first = tokens.first()?;
    parse_with(first, NUMERIC_FORMATS).or_else(|| {
        // ISO timestamps such as 2025-01-14T10:22:00Z
        first.get(..10).and_then(|head| parse_with(head, &["%Y-%m-%d"]))
    })
}

fn resolve_relative(text: &str, reference: NaiveDate) -> Option<NaiveDate> {
    let lower = text.to_ascii_lowercase();
    let word = lower.split(|c: char| !c.is_ascii_alphabetic()).next().unwrap_or("");
    match word {
        "today" => return Some(reference),
        "yesterday" => return reference.checked_sub_days(Days::new(1)),
        "tomorrow" => return reference.checked_add_days(Days::new(1)),
        _ => {}
    }
    if let Some(caps) = IN_DAYS.captures(&lower) {
        let days: u64 = caps[1].parse().ok()?;
        return reference.checked_add_days(Days::new(days));
    }
    if let Some(caps) = DAYS_AGO.captures(&lower) {
        let days: u64 = caps[1].parse().ok()?;
        return reference.checked_sub_days(Days::new(days));
    }
    None
}

fn parse_with(candidate: &str, formats: &[&str]) -> Option<NaiveDate> {
    formats
        .iter()
        .filter_map(|format| NaiveDate::parse_from_str(candidate, format).ok())
        .find(|date| (1990..=2100).contains(&date.year()))
}
