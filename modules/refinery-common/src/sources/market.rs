use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use super::{fmt_num, num_field, parse_timestamp, str_field, string_list, Extracted};
use crate::error::RefineryError;
use crate::ingest::BatchContext;

static RE_WIN_RATE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:yes|up):\s*([0-9]+(?:\.[0-9]+)?)\s*%").expect("valid win-rate regex")
});

/// Prediction-market quote.
///
/// Canonical fields: title, question, prices, liquidity. Volume, 24h volume and
/// day change are volatile and only land in metrics.
pub fn extract(raw: &Value, ctx: &BatchContext) -> Result<Extracted, RefineryError> {
    let title = str_field(raw, "eventTitle").or_else(|| str_field(raw, "title"));
    let question = str_field(raw, "question");
    if title.is_none() && question.is_none() {
        return Err(RefineryError::validation(
            "market record has neither eventTitle nor question",
        ));
    }

    let prices = match raw.get("prices") {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };
    let liquidity = num_field(raw, "liquidity");

    let slug = str_field(raw, "slug");
    let event_key = slug
        .clone()
        .or_else(|| title.as_deref().map(str::to_lowercase))
        .unwrap_or_default();
    let question_key = question.clone().unwrap_or_default();

    let engine = if ctx.is_sniper_batch() { "sniper" } else { "radar" };
    let mut tags = string_list(raw, "strategy_tags");
    tags.push(format!("engine:{engine}"));

    let mut ex = Extracted {
        canonical: vec![
            ("title", title.unwrap_or_default()),
            ("question", question.unwrap_or_default()),
            ("prices", prices.clone()),
            ("liquidity", fmt_num(liquidity)),
        ],
        dedup_key: Some(format!("market:{event_key}:{question_key}")),
        topic_id: Some(format!("market:{event_key}")),
        tags,
        category: sector_for(str_field(raw, "category").as_deref()),
        author: event_key,
        timestamp: str_field(raw, "updatedAt").as_deref().and_then(parse_timestamp),
        ..Extracted::default()
    };

    ex.metrics.insert("liquidity".into(), liquidity);
    ex.metrics.insert("volume".into(), num_field(raw, "volume"));
    ex.metrics.insert("vol24h".into(), num_field(raw, "vol24h"));
    let day_change = match raw.get("dayChange") {
        Some(v) if !v.is_null() => super::number(v),
        _ => num_field(raw, "day_change"),
    };
    ex.metrics.insert("day_change".into(), day_change);
    if let Some(rate) = win_rate(&prices) {
        ex.metrics.insert("win_rate".into(), rate);
    }

    Ok(ex)
}

/// Implied "Yes"/"Up" probability in percent, from a price string like `Yes: 82.5% | No: 17.5%`.
pub fn win_rate(prices: &str) -> Option<f64> {
    RE_WIN_RATE
        .captures(prices)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Map collector category codes onto the shared sector names.
fn sector_for(category: Option<&str>) -> String {
    let Some(code) = category else {
        return "Other".to_string();
    };
    super::SECTORS
        .iter()
        .find(|s| s.eq_ignore_ascii_case(code))
        .map(|s| s.to_string())
        .unwrap_or_else(|| "Other".to_string())
}
