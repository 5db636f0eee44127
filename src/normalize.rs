// src/normalize.rs

use crate::record::{BillFields, ReadingType};
use chrono::{Datelike, NaiveDate};
use serde_json::{Map, Value};
use tracing::warn;

/// Note used when the model flags a split tariff but does not describe it.
pub const SPLIT_TARIFF_NOTE: &str = "Multiple tariff periods detected";

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%Y.%m.%d",
    "%d/%m/%Y",
    "%d-%m-%Y",
    "%d.%m.%Y",
    "%d %B %Y",
    "%d %b %Y",
    "%d/%m/%y",
    "%d-%m-%y",
];

/// Years outside this range come from a short year matched by `%Y`.
const YEARS: std::ops::RangeInclusive<i32> = 1900..=2100;

impl BillFields {
    /// Build typed fields from the model's JSON object.
    ///
    /// Lenient about what the model sends (numbers as strings, units,
    /// thousands separators, odd date formats), strict about what comes
    /// out: numbers are bare, dates are ISO, and the tariff flag agrees
    /// with the notes.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let tariff_split = bool_field(map, "tariff_split");
        let mut notes = text_field(map, "notes");

        if tariff_split && notes.is_empty() {
            warn!("tariff_split set without notes, adding a generic note");
            notes = SPLIT_TARIFF_NOTE.to_string();
        } else if !tariff_split && !notes.is_empty() {
            warn!(notes = %notes, "Dropping notes on a single-tariff bill");
            notes.clear();
        }

        Self {
            provider: text_field(map, "provider"),
            account_number: text_field(map, "account_number"),
            start_date: date_field(map, "start_date"),
            end_date: date_field(map, "end_date"),
            kwh_usage: number_field(map, "kWh_usage"),
            cost_per_kwh: number_field(map, "cost_per_kWh"),
            service_charge: number_field(map, "service_charge"),
            reading_type: reading_type_field(map, "reading_type"),
            amount_due: number_field(map, "amount_due"),
            tariff_split,
            notes,
        }
    }
}

/// Exact key first, then a case-insensitive match (`kwh_usage` and friends).
fn lookup<'a>(map: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    map.get(key).or_else(|| {
        map.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

fn text_field(map: &Map<String, Value>, key: &str) -> String {
    match lookup(map, key) {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn number_field(map: &Map<String, Value>, key: &str) -> Option<f64> {
    match lookup(map, key)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) if s.trim().is_empty() => None,
        Value::String(s) => {
            let parsed = parse_amount(s);
            if parsed.is_none() {
                warn!(field = key, value = %s, "Unparseable number, leaving blank");
            }
            parsed
        }
        _ => None,
    }
}

/// Parse a money/usage figure as written on a bill: `R 59,670.31`,
/// `1 234,56`, `512 kWh`, `R2.3459/kWh`.
pub fn parse_amount(raw: &str) -> Option<f64> {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, ',' | '.' | '-'))
        .collect();
    let kept = kept.trim_matches(|c| c == '.' || c == ',');
    if kept.is_empty() {
        return None;
    }

    let last_comma = kept.rfind(',');
    let last_dot = kept.rfind('.');
    let normalized = match (last_comma, last_dot) {
        // 1.234,56: dots group thousands, comma is the decimal mark
        (Some(c), Some(d)) if c > d => kept.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => kept.replace(',', ""),
        (Some(c), None) => {
            let single = kept.matches(',').count() == 1;
            let decimals = kept.len() - c - 1;
            if single && decimals != 3 {
                kept.replace(',', ".")
            } else {
                kept.replace(',', "")
            }
        }
        // 1.234.567: only grouping dots
        (None, Some(_)) if kept.matches('.').count() > 1 => kept.replace('.', ""),
        (None, _) => kept.to_string(),
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn date_field(map: &Map<String, Value>, key: &str) -> Option<NaiveDate> {
    let Some(Value::String(s)) = lookup(map, key) else {
        return None;
    };
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let parsed = parse_date(s);
    if parsed.is_none() {
        warn!(field = key, value = %s, "Unparseable date, leaving blank");
    }
    parsed
}

pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    // 2024-01-01T00:00:00 and friends
    let raw = match raw.split_once('T') {
        Some((date, time)) if time.starts_with(|c: char| c.is_ascii_digit()) => date,
        _ => raw,
    };
    DATE_FORMATS.iter().find_map(|fmt| {
        NaiveDate::parse_from_str(raw, fmt)
            .ok()
            .filter(|d| YEARS.contains(&d.year()))
    })
}

fn bool_field(map: &Map<String, Value>, key: &str) -> bool {
    match lookup(map, key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|v| v != 0.0),
        Some(Value::String(s)) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "true" | "yes" | "y" | "ja" | "1"
        ),
        _ => false,
    }
}

fn reading_type_field(map: &Map<String, Value>, key: &str) -> Option<ReadingType> {
    let raw = text_field(map, key);
    match raw.to_lowercase().as_str() {
        "" => None,
        "actual" | "a" | "werklik" | "werklike" => Some(ReadingType::Actual),
        "estimated" | "estimate" | "e" | "beraam" | "beraamde" | "geskat" | "geskatte" => {
            Some(ReadingType::Estimated)
        }
        _ => {
            warn!(value = %raw, "Unknown reading type, leaving blank");
            None
        }
    }
}
