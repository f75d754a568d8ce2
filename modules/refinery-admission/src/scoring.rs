//! Per-source scoring policies.
//!
//! Every policy computes `base × boosts × decay`. Boost factors are capped
//! individually and their product is clamped, so no single signal can buy the
//! whole budget through boosts.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use refinery_common::{
    AdmissionConfig, MarketBoosts, PaperBoosts, PostBoosts, RepositoryBoosts, Signal, SourceType,
};

/// Scores one source type's signals. Higher is better.
pub trait ScoringPolicy: Send + Sync {
    fn source_type(&self) -> SourceType;
    fn score(&self, signal: &Signal, now: DateTime<Utc>) -> f64;
}

// --- Shared pieces ---

#[derive(Debug, Clone, Copy)]
pub struct BoostLimits {
    pub max_single: f64,
    pub max_total: f64,
    pub half_life_hours: f64,
}

impl BoostLimits {
    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self {
            max_single: config.max_single_boost,
            max_total: config.max_total_boost,
            half_life_hours: config.half_life_hours,
        }
    }
}

impl Default for BoostLimits {
    fn default() -> Self {
        Self::from_config(&AdmissionConfig::default())
    }
}

/// Multiplicative boost accumulator.
#[derive(Debug, Clone, Copy)]
pub struct Boosts {
    product: f64,
    limits: BoostLimits,
}

impl Boosts {
    pub fn new(limits: BoostLimits) -> Self {
        Self {
            product: 1.0,
            limits,
        }
    }

    pub fn apply(&mut self, factor: f64) {
        if factor.is_finite() {
            self.product *= factor.clamp(0.0, self.limits.max_single);
        }
    }

    pub fn total(&self) -> f64 {
        self.product.min(self.limits.max_total)
    }
}

/// `0.5^(age / half_life)`. Future timestamps count as age zero.
pub fn recency_decay(timestamp: DateTime<Utc>, now: DateTime<Utc>, half_life_hours: f64) -> f64 {
    let age_hours = ((now - timestamp).num_seconds().max(0) as f64) / 3600.0;
    0.5_f64.powf(age_hours / half_life_hours)
}

fn finish(base: f64, boosts: &Boosts, signal: &Signal, now: DateTime<Utc>) -> f64 {
    let decay = recency_decay(signal.timestamp, now, boosts.limits.half_life_hours);
    let score = base.max(0.0) * boosts.total() * decay;
    if score.is_finite() {
        score
    } else {
        0.0
    }
}

/// Word-boundary match of a (possibly multi-word) keyword in free text.
fn mentions(text: &str, keyword: &str) -> bool {
    let padded = |s: &str| {
        let words: Vec<String> = s
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
            .collect();
        format!(" {} ", words.join(" "))
    };
    let needle = padded(keyword);
    !needle.trim().is_empty() && padded(text).contains(&needle)
}

// --- Market ---

pub struct MarketPolicy {
    boosts: MarketBoosts,
    limits: BoostLimits,
}

impl MarketPolicy {
    pub fn new(boosts: MarketBoosts, limits: BoostLimits) -> Self {
        Self { boosts, limits }
    }

    fn on_watch_list(&self, text: &str) -> bool {
        let denied = self.boosts.deny_keywords.iter().any(|k| mentions(text, k));
        !denied && self.boosts.watch_keywords.iter().any(|k| mentions(text, k))
    }
}

impl ScoringPolicy for MarketPolicy {
    fn source_type(&self) -> SourceType {
        SourceType::Market
    }

    fn score(&self, signal: &Signal, now: DateTime<Utc>) -> f64 {
        let base = signal.metric("vol24h") * (signal.metric("day_change").abs() + 1.0);

        let mut boosts = Boosts::new(self.limits);
        if self.on_watch_list(&signal.canonical_text) {
            boosts.apply(self.boosts.watch_boost);
        }
        for (tag, factor) in &self.boosts.tag_boosts {
            if signal.has_tag(tag) {
                boosts.apply(*factor);
            }
        }
        finish(base, &boosts, signal, now)
    }
}

// --- Post ---

pub struct PostPolicy {
    boosts: PostBoosts,
    limits: BoostLimits,
}

impl PostPolicy {
    pub fn new(boosts: PostBoosts, limits: BoostLimits) -> Self {
        Self { boosts, limits }
    }
}

impl ScoringPolicy for PostPolicy {
    fn source_type(&self) -> SourceType {
        SourceType::Post
    }

    fn score(&self, signal: &Signal, now: DateTime<Utc>) -> f64 {
        let m = |name: &str| signal.metric(name);
        let engagement =
            m("retweets") * 8.0 + m("quotes") * 12.0 + m("replies") * 5.0 + m("bookmarks") * 10.0;
        let growth =
            m("growth_likes") * 15.0 + m("growth_retweets") * 25.0 + m("growth_replies") * 10.0;

        let mut boosts = Boosts::new(self.limits);
        boosts.apply(1.0 + self.boosts.tag_richness * signal.tags.len() as f64);
        if self
            .boosts
            .verified_authors
            .iter()
            .any(|a| a.eq_ignore_ascii_case(&signal.author))
        {
            boosts.apply(self.boosts.verified_boost);
        }
        finish(engagement + growth, &boosts, signal, now)
    }
}

// --- Repository ---

pub struct RepositoryPolicy {
    boosts: RepositoryBoosts,
    limits: BoostLimits,
}

impl RepositoryPolicy {
    pub fn new(boosts: RepositoryBoosts, limits: BoostLimits) -> Self {
        Self { boosts, limits }
    }
}

impl ScoringPolicy for RepositoryPolicy {
    fn source_type(&self) -> SourceType {
        SourceType::Repository
    }

    fn score(&self, signal: &Signal, now: DateTime<Utc>) -> f64 {
        let mut boosts = Boosts::new(self.limits);
        if self.boosts.topic_allow.iter().any(|t| signal.has_tag(t)) {
            boosts.apply(self.boosts.topic_boost);
        }
        finish(signal.metric("stars"), &boosts, signal, now)
    }
}

// --- Paper ---

pub struct PaperPolicy {
    boosts: PaperBoosts,
    limits: BoostLimits,
}

impl PaperPolicy {
    pub fn new(boosts: PaperBoosts, limits: BoostLimits) -> Self {
        Self { boosts, limits }
    }
}

impl ScoringPolicy for PaperPolicy {
    fn source_type(&self) -> SourceType {
        SourceType::Paper
    }

    fn score(&self, signal: &Signal, now: DateTime<Utc>) -> f64 {
        let base = signal.metric("citations") + signal.metric("impact_factor") * 10.0;

        let mut boosts = Boosts::new(self.limits);
        let tier = self
            .boosts
            .tier_boosts
            .iter()
            .find(|(kind, _)| kind.eq_ignore_ascii_case(&signal.category));
        if let Some((_, factor)) = tier {
            boosts.apply(*factor);
        }
        finish(base, &boosts, signal, now)
    }
}

// --- Policy set ---

/// One policy per source type. Signals without a policy score zero.
pub struct PolicySet {
    policies: HashMap<SourceType, Box<dyn ScoringPolicy>>,
}

impl PolicySet {
    pub fn empty() -> Self {
        Self {
            policies: HashMap::new(),
        }
    }

    pub fn from_config(config: &AdmissionConfig) -> Self {
        let limits = BoostLimits::from_config(config);
        Self::empty()
            .with(MarketPolicy::new(config.market.clone(), limits))
            .with(PostPolicy::new(config.post.clone(), limits))
            .with(RepositoryPolicy::new(config.repository.clone(), limits))
            .with(PaperPolicy::new(config.paper.clone(), limits))
    }

    /// Register a policy, replacing any existing one for the same source type.
    pub fn with(mut self, policy: impl ScoringPolicy + 'static) -> Self {
        self.policies.insert(policy.source_type(), Box::new(policy));
        self
    }

    pub fn score(&self, signal: &Signal, now: DateTime<Utc>) -> f64 {
        self.policies
            .get(&signal.source_type)
            .map(|p| p.score(signal, now))
            .unwrap_or(0.0)
    }
}

impl Default for PolicySet {
    fn default() -> Self {
        Self::from_config(&AdmissionConfig::default())
    }
}
