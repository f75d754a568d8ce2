use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::error::RefineryError;
use crate::types::SourceType;

/// TOML-backed tunables loaded from disk. Every section is optional and
/// defaulted; secrets (API keys, DB URL) stay as env vars.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub admission: AdmissionConfig,
    pub audit: AuditConfig,
    pub evaluators: Vec<EvaluatorConfig>,
    pub ledger: LedgerConfig,
    pub ingest: IngestConfig,
    pub retention: RetentionConfig,
    pub freshness: FreshnessConfig,
}

// --- Admission ---

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdmissionConfig {
    pub global_budget: usize,
    pub category_floor: usize,
    pub diversity_cap: usize,
    pub half_life_hours: f64,
    /// Cap applied to each individual boost factor.
    pub max_single_boost: f64,
    /// Clamp on the product of all boosts for one signal.
    pub max_total_boost: f64,
    /// Candidate window: signals newer than this many minutes are considered.
    pub window_minutes: i64,
    /// Per-source row limit when loading candidates from the store.
    pub candidate_limit: i64,
    pub market: MarketBoosts,
    pub post: PostBoosts,
    pub repository: RepositoryBoosts,
    pub paper: PaperBoosts,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            global_budget: 30,
            category_floor: 3,
            diversity_cap: 2,
            half_life_hours: 24.0,
            max_single_boost: 5.0,
            max_total_boost: 10.0,
            window_minutes: 70,
            candidate_limit: 1000,
            market: MarketBoosts::default(),
            post: PostBoosts::default(),
            repository: RepositoryBoosts::default(),
            paper: PaperBoosts::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MarketBoosts {
    /// Watch-list keywords matched against title and question.
    pub watch_keywords: Vec<String>,
    /// Any of these suppresses the watch-list boost.
    pub deny_keywords: Vec<String>,
    pub watch_boost: f64,
    /// Strategy tag → multiplier.
    pub tag_boosts: BTreeMap<String, f64>,
}

impl Default for MarketBoosts {
    fn default() -> Self {
        Self {
            watch_keywords: ["gold", "bitcoin", "btc", "fed", "federal reserve", "xau"]
                .map(String::from)
                .to_vec(),
            deny_keywords: vec!["warsh".to_string()],
            watch_boost: 5.0,
            tag_boosts: BTreeMap::from([
                ("TAIL_RISK".to_string(), 4.0),
                ("HIGH_CERTAINTY".to_string(), 3.0),
            ]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PostBoosts {
    /// Per-tag increment of the tag-richness factor `1 + k·|tags|`.
    pub tag_richness: f64,
    pub verified_authors: Vec<String>,
    pub verified_boost: f64,
}

impl Default for PostBoosts {
    fn default() -> Self {
        Self {
            tag_richness: 0.3,
            verified_authors: Vec::new(),
            verified_boost: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RepositoryBoosts {
    pub topic_allow: Vec<String>,
    pub topic_boost: f64,
}

impl Default for RepositoryBoosts {
    fn default() -> Self {
        Self {
            topic_allow: Vec::new(),
            topic_boost: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PaperBoosts {
    /// Paper kind (category) → multiplier.
    pub tier_boosts: BTreeMap<String, f64>,
}

impl Default for PaperBoosts {
    fn default() -> Self {
        Self {
            tier_boosts: BTreeMap::from([
                ("NUCLEAR".to_string(), 5.0),
                ("EARLY_SIGNAL".to_string(), 2.0),
            ]),
        }
    }
}

// --- Audit ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Claude,
    OpenRouter,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::Claude => f.write_str("claude"),
            Provider::OpenRouter => f.write_str("openrouter"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditConfig {
    pub pool_size: usize,
    pub batch_size: usize,
    pub call_timeout_secs: u64,
    pub provider: Provider,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            batch_size: 8,
            call_timeout_secs: 60,
            provider: Provider::Claude,
        }
    }
}

/// One `[[evaluators]]` entry.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvaluatorConfig {
    pub id: String,
    pub model: String,
    pub system_prompt: String,
    /// Restrict the evaluator to these source types. Empty means all.
    #[serde(default)]
    pub source_types: Vec<SourceType>,
}

// --- Ledger ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodGranularity {
    #[default]
    Daily,
    Monthly,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    /// Git working tree holding the ledger.
    pub root: PathBuf,
    /// Directory under `root` that holds the segments.
    pub segment_dir: String,
    /// Directory under `root` that receives expired raw signals before purge.
    pub archive_dir: String,
    pub period: PeriodGranularity,
    /// Fixed offset used to compute calendar buckets.
    pub utc_offset_hours: i32,
    pub sync: bool,
    pub remote: String,
    pub branch: String,
    pub git_timeout_secs: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("ledger"),
            segment_dir: "audits".to_string(),
            archive_dir: "archive".to_string(),
            period: PeriodGranularity::Daily,
            utc_offset_hours: 8,
            sync: true,
            remote: "origin".to_string(),
            branch: "main".to_string(),
            git_timeout_secs: 60,
        }
    }
}

// --- Ingest / retention / freshness ---

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    pub inbox: PathBuf,
    pub chunk_size: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            inbox: PathBuf::from("inbox"),
            chunk_size: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetentionConfig {
    pub days: i64,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { days: 7 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FreshnessConfig {
    pub fresh_minutes: i64,
    pub skip_minutes: i64,
}

impl Default for FreshnessConfig {
    fn default() -> Self {
        Self {
            fresh_minutes: 65,
            skip_minutes: 720,
        }
    }
}

impl FileConfig {
    /// Range checks shared by every command.
    pub fn validate(&self) -> Result<(), RefineryError> {
        let a = &self.admission;
        if a.global_budget == 0 {
            return Err(RefineryError::config("admission.global_budget must be > 0"));
        }
        if a.diversity_cap == 0 {
            return Err(RefineryError::config("admission.diversity_cap must be > 0"));
        }
        if a.half_life_hours <= 0.0 {
            return Err(RefineryError::config("admission.half_life_hours must be > 0"));
        }
        if a.max_single_boost < 1.0 || a.max_total_boost < 1.0 {
            return Err(RefineryError::config(
                "admission boost caps must be >= 1.0",
            ));
        }
        if self.audit.pool_size == 0 || self.audit.batch_size == 0 {
            return Err(RefineryError::config(
                "audit.pool_size and audit.batch_size must be > 0",
            ));
        }
        if self.audit.call_timeout_secs == 0 {
            return Err(RefineryError::config("audit.call_timeout_secs must be > 0"));
        }
        if !(-14..=14).contains(&self.ledger.utc_offset_hours) {
            return Err(RefineryError::config(format!(
                "ledger.utc_offset_hours {} is outside -14..=14",
                self.ledger.utc_offset_hours
            )));
        }
        if self.ingest.chunk_size == 0 {
            return Err(RefineryError::config("ingest.chunk_size must be > 0"));
        }
        if self.retention.days <= 0 {
            return Err(RefineryError::config("retention.days must be > 0"));
        }
        Ok(())
    }

    /// Additional checks for the audit cycle.
    pub fn validate_for_run(&self) -> Result<(), RefineryError> {
        self.validate()?;
        if self.evaluators.is_empty() {
            return Err(RefineryError::config(
                "at least one [[evaluators]] entry is required",
            ));
        }
        Ok(())
    }
}

/// Load and parse a TOML config file.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: FileConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
    Ok(config)
}
