//! Per-source field extraction from collector JSON.
//!
//! Each submodule returns an [`Extracted`] whose `canonical` list is the fixed,
//! ordered field list for that source type.

pub mod market;
pub mod paper;
pub mod post;
pub mod repository;

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;

/// Collectors write naive timestamps in UTC+8.
pub const COLLECTOR_UTC_OFFSET_HOURS: i32 = 8;

/// Sector names shared by the post and market collectors.
pub const SECTORS: [&str; 7] = [
    "Politics",
    "Geopolitics",
    "Science",
    "Tech",
    "Finance",
    "Crypto",
    "Economy",
];

#[derive(Debug, Clone, Default)]
pub struct Extracted {
    pub canonical: Vec<(&'static str, String)>,
    pub dedup_key: Option<String>,
    pub topic_id: Option<String>,
    pub metrics: BTreeMap<String, f64>,
    pub tags: Vec<String>,
    pub category: String,
    pub author: String,
    pub timestamp: Option<DateTime<Utc>>,
}

/// Non-empty trimmed string field.
pub(crate) fn str_field(v: &Value, key: &str) -> Option<String> {
    match v.get(key)? {
        Value::String(s) => {
            let s = s.trim();
            (!s.is_empty()).then(|| s.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Numeric field tolerant of `"1,234"`, `"$5.2"`, `"12%"`. Missing or unparseable is 0.
pub(crate) fn num_field(v: &Value, key: &str) -> f64 {
    v.get(key).map(number).unwrap_or(0.0)
}

pub(crate) fn number(v: &Value) -> f64 {
    match v {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => parse_num(s),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

pub(crate) fn parse_num(s: &str) -> f64 {
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '%') && !c.is_whitespace())
        .collect();
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite()).unwrap_or(0.0)
}

pub(crate) fn string_list(v: &Value, key: &str) -> Vec<String> {
    match v.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|i| i.as_str())
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        // Some collectors store arrays as JSON text.
        Some(Value::String(s)) => serde_json::from_str::<Vec<String>>(s).unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Render a number without a trailing `.0` for whole values.
pub(crate) fn fmt_num(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

/// Parse the timestamp shapes collectors produce: RFC 3339, naive ISO
/// (collector-local UTC+8) and the Twitter `Wed Oct 10 20:19:24 +0000 2018` form.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y") {
        return Some(dt.with_timezone(&Utc));
    }
    let collector_zone = FixedOffset::east_opt(COLLECTOR_UTC_OFFSET_HOURS * 3600)?;
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .and_then(|naive| collector_zone.from_local_datetime(&naive).single())
        .map(|dt| dt.with_timezone(&Utc))
}
