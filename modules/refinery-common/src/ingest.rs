//! Ingestion gateway: raw collector JSON → canonical [`Signal`].
//!
//! Each source type extracts a fixed, ordered list of canonical fields (see
//! [`crate::sources`]). Volatile counters never enter the canonical text, so
//! re-ingesting the same logical item yields the same fingerprint.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::RefineryError;
use crate::fingerprint::Fingerprint;
use crate::sources::{self, parse_timestamp, Extracted};
use crate::types::{Signal, SourceType};

/// Minimum number of content characters (labels excluded) in a canonical text.
pub const MIN_CANONICAL_CHARS: usize = 8;

/// Per-file context shared by every item of one collector batch.
#[derive(Debug, Clone, Default)]
pub struct BatchContext {
    /// Inbox-relative path of the batch file. Some collectors encode the engine in it.
    pub path: Option<String>,
    /// Batch-level scan time (`meta.scanned_at_bj`).
    pub scanned_at: Option<DateTime<Utc>>,
    /// Fallback when neither the item nor the batch carries a time.
    pub ingested_at: Option<DateTime<Utc>>,
}

impl BatchContext {
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn with_ingested_at(mut self, at: DateTime<Utc>) -> Self {
        self.ingested_at = Some(at);
        self
    }

    fn path_contains(&self, needle: &str) -> bool {
        self.path
            .as_deref()
            .map(|p| p.to_lowercase().contains(needle))
            .unwrap_or(false)
    }

    pub(crate) fn is_sniper_batch(&self) -> bool {
        self.path_contains("sniper")
    }
}

/// Split a raw collector payload into items plus its batch context.
///
/// Collectors emit either a bare list, a `{meta, items}` envelope, or a single object.
pub fn split_batch(raw: &Value) -> (Vec<Value>, BatchContext) {
    match raw {
        Value::Array(items) => (items.clone(), BatchContext::default()),
        Value::Object(map) if map.contains_key("items") => {
            let items = match map.get("items") {
                Some(Value::Array(items)) => items.clone(),
                _ => Vec::new(),
            };
            let scanned_at = map
                .get("meta")
                .and_then(|m| m.get("scanned_at_bj"))
                .and_then(Value::as_str)
                .and_then(parse_timestamp);
            (
                items,
                BatchContext {
                    scanned_at,
                    ..BatchContext::default()
                },
            )
        }
        Value::Object(_) => (vec![raw.clone()], BatchContext::default()),
        _ => (Vec::new(), BatchContext::default()),
    }
}

/// Normalize one raw item with no batch context.
pub fn normalize(raw: &Value, source_type: SourceType) -> Result<Signal, RefineryError> {
    normalize_with(raw, source_type, &BatchContext::default())
}

/// Normalize one raw item. Fails with `Validation` when required fields are
/// missing or the canonical content is too short; such records are dropped.
pub fn normalize_with(
    raw: &Value,
    source_type: SourceType,
    ctx: &BatchContext,
) -> Result<Signal, RefineryError> {
    if !raw.is_object() {
        return Err(RefineryError::validation(format!(
            "{source_type} record is not a JSON object"
        )));
    }

    let extracted = match source_type {
        SourceType::Market => sources::market::extract(raw, ctx)?,
        SourceType::Post => sources::post::extract(raw)?,
        SourceType::Repository => sources::repository::extract(raw)?,
        SourceType::Paper => sources::paper::extract(raw)?,
    };

    build_signal(source_type, extracted, raw, ctx)
}

fn build_signal(
    source_type: SourceType,
    extracted: Extracted,
    raw: &Value,
    ctx: &BatchContext,
) -> Result<Signal, RefineryError> {
    let (canonical_text, content_chars) = canonical_text(&extracted.canonical);
    if content_chars < MIN_CANONICAL_CHARS {
        return Err(RefineryError::validation(format!(
            "{source_type} canonical text too short ({content_chars} < {MIN_CANONICAL_CHARS} chars)"
        )));
    }

    let fingerprint = Fingerprint::of_text(&canonical_text);
    let dedup_key = extracted
        .dedup_key
        .unwrap_or_else(|| format!("{source_type}:{fingerprint}"));
    let topic_id = extracted.topic_id.unwrap_or_else(|| dedup_key.clone());
    let timestamp = extracted
        .timestamp
        .or(ctx.scanned_at)
        .or(ctx.ingested_at)
        .unwrap_or_else(Utc::now);

    Ok(Signal {
        source_type,
        dedup_key,
        topic_id,
        canonical_text,
        fingerprint,
        metrics: extracted.metrics,
        tags: extracted.tags,
        category: extracted.category,
        author: extracted.author,
        timestamp,
        raw_payload: raw.clone(),
    })
}

/// `label=value` lines in field order, skipping empty values.
/// Returns the text and the number of content characters it carries.
fn canonical_text(fields: &[(&'static str, String)]) -> (String, usize) {
    let mut lines = Vec::with_capacity(fields.len());
    let mut content_chars = 0;
    for (label, value) in fields {
        let value = collapse_whitespace(value);
        if value.is_empty() {
            continue;
        }
        content_chars += value.chars().count();
        lines.push(format!("{label}={value}"));
    }
    (lines.join("\n"), content_chars)
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_text_skips_empty_and_collapses_whitespace() {
        let fields = vec![
            ("title", "  Fed  decision ".to_string()),
            ("question", String::new()),
            ("prices", "Yes: 80%".to_string()),
        ];
        let (text, chars) = canonical_text(&fields);
        assert_eq!(text, "title=Fed decision\nprices=Yes: 80%");
        assert_eq!(chars, "Fed decision".len() + "Yes: 80%".len());
    }

    #[test]
    fn split_batch_handles_envelope_list_and_single() {
        let envelope = json!({
            "meta": {"scanned_at_bj": "2026-03-01T10:00:00+08:00"},
            "items": [{"name": "a"}, {"name": "b"}]
        });
        let (items, ctx) = split_batch(&envelope);
        assert_eq!(items.len(), 2);
        assert_eq!(
            ctx.scanned_at.unwrap().to_rfc3339(),
            "2026-03-01T02:00:00+00:00"
        );

        let (items, ctx) = split_batch(&json!([{"a": 1}]));
        assert_eq!(items.len(), 1);
        assert!(ctx.scanned_at.is_none());

        let (items, _) = split_batch(&json!({"fullText": "x"}));
        assert_eq!(items.len(), 1);

        let (items, _) = split_batch(&json!("nope"));
        assert!(items.is_empty());
    }

    #[test]
    fn non_object_is_validation_error() {
        let err = normalize(&json!(42), SourceType::Post).unwrap_err();
        assert!(matches!(err, RefineryError::Validation(_)));
    }

    #[test]
    fn batch_time_is_fallback_timestamp() {
        let scanned = parse_timestamp("2026-03-01T10:00:00+08:00").unwrap();
        let ctx = BatchContext {
            scanned_at: Some(scanned),
            ..Default::default()
        };
        let raw = json!({"name": "tokio-rs/tokio", "stars": 100, "reason": "async runtime"});
        let signal = normalize_with(&raw, SourceType::Repository, &ctx).unwrap();
        assert_eq!(signal.timestamp, scanned);
    }
}
