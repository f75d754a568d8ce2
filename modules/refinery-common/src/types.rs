use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::RefineryError;
use crate::fingerprint::Fingerprint;

// --- Source types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceType {
    Post,
    Repository,
    Paper,
    Market,
}

impl SourceType {
    pub const ALL: [SourceType; 4] = [
        SourceType::Post,
        SourceType::Repository,
        SourceType::Paper,
        SourceType::Market,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Post => "post",
            SourceType::Repository => "repository",
            SourceType::Paper => "paper",
            SourceType::Market => "market",
        }
    }

    /// Map a collector folder name (first inbox path component) to a source type.
    pub fn from_folder(folder: &str) -> Option<Self> {
        match folder.to_ascii_lowercase().as_str() {
            "twitter" | "posts" | "post" => Some(SourceType::Post),
            "github" | "repositories" | "repository" => Some(SourceType::Repository),
            "papers" | "paper" => Some(SourceType::Paper),
            "polymarket" | "markets" | "market" => Some(SourceType::Market),
            _ => None,
        }
    }
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceType {
    type Err = RefineryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(SourceType::Post),
            "repository" => Ok(SourceType::Repository),
            "paper" => Ok(SourceType::Paper),
            "market" => Ok(SourceType::Market),
            other => Err(RefineryError::validation(format!(
                "unknown source type: {other}"
            ))),
        }
    }
}

// --- Signal ---

/// One normalized unit of external content. Read-only once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub source_type: SourceType,
    /// Explicit identity of the logical item; instances sharing it collapse during admission.
    pub dedup_key: String,
    /// Subject the evaluators hold opinions on across runs.
    pub topic_id: String,
    pub canonical_text: String,
    pub fingerprint: Fingerprint,
    pub metrics: BTreeMap<String, f64>,
    pub tags: Vec<String>,
    pub category: String,
    /// Diversity sub-grouping key (account, event slug, journal, ...).
    pub author: String,
    pub timestamp: DateTime<Utc>,
    pub raw_payload: serde_json::Value,
}

impl Signal {
    pub fn new(
        source_type: SourceType,
        dedup_key: impl Into<String>,
        canonical_text: impl Into<String>,
    ) -> Self {
        let dedup_key = dedup_key.into();
        let canonical_text = canonical_text.into();
        Self {
            source_type,
            topic_id: dedup_key.clone(),
            fingerprint: Fingerprint::of_text(&canonical_text),
            dedup_key,
            canonical_text,
            metrics: BTreeMap::new(),
            tags: Vec::new(),
            category: "General".to_string(),
            author: String::new(),
            timestamp: Utc::now(),
            raw_payload: serde_json::Value::Null,
        }
    }

    pub fn with_topic(mut self, topic_id: impl Into<String>) -> Self {
        self.topic_id = topic_id.into();
        self
    }

    pub fn with_metric(mut self, name: impl Into<String>, value: f64) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_raw_payload(mut self, raw: serde_json::Value) -> Self {
        self.raw_payload = raw;
        self
    }

    /// Metric value, 0.0 when absent.
    pub fn metric(&self, name: &str) -> f64 {
        self.metrics.get(name).copied().unwrap_or(0.0)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t.eq_ignore_ascii_case(tag))
    }

    /// Quota bucket: categories are scoped per source type.
    pub fn quota_key(&self) -> String {
        format!("{}:{}", self.source_type, self.category)
    }

    /// Diversity bucket: a single author/forum within one source type.
    pub fn diversity_key(&self) -> String {
        format!("{}:{}", self.source_type, self.author.to_lowercase())
    }
}

// --- Audit records ---

/// One evaluator's opinion on one signal. Immutable once appended to the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub fingerprint: Fingerprint,
    pub topic_id: String,
    pub evaluator_id: String,
    pub source_type: SourceType,
    pub thought: String,
    pub output: String,
    pub drift_flag: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prior_output: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_type_serializes_lowercase() {
        let json = serde_json::to_string(&SourceType::Repository).unwrap();
        assert_eq!(json, "\"repository\"");
        let back: SourceType = serde_json::from_str("\"market\"").unwrap();
        assert_eq!(back, SourceType::Market);
    }

    #[test]
    fn folder_mapping_covers_collector_names() {
        assert_eq!(SourceType::from_folder("twitter"), Some(SourceType::Post));
        assert_eq!(SourceType::from_folder("GitHub"), Some(SourceType::Repository));
        assert_eq!(SourceType::from_folder("papers"), Some(SourceType::Paper));
        assert_eq!(SourceType::from_folder("polymarket"), Some(SourceType::Market));
        assert_eq!(SourceType::from_folder("reports"), None);
    }

    #[test]
    fn signal_fingerprint_tracks_canonical_text() {
        let a = Signal::new(SourceType::Post, "post:1", "text=hello world");
        let b = Signal::new(SourceType::Post, "post:2", "text=hello world");
        assert_eq!(a.fingerprint, b.fingerprint);
    }

    #[test]
    fn grouping_keys_are_scoped_by_source_type() {
        let s = Signal::new(SourceType::Market, "m", "question=x")
            .with_category("Crypto")
            .with_author("BTC-Weekly");
        assert_eq!(s.quota_key(), "market:Crypto");
        assert_eq!(s.diversity_key(), "market:btc-weekly");
    }

    #[test]
    fn audit_record_omits_missing_prior() {
        let record = AuditRecord {
            fingerprint: Fingerprint::of_text("x"),
            topic_id: "market:gold".into(),
            evaluator_id: "macro".into(),
            source_type: SourceType::Market,
            thought: String::new(),
            output: "bullish".into(),
            drift_flag: false,
            prior_output: None,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("prior_output").is_none());
        let back: AuditRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
