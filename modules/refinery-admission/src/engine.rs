use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use refinery_common::{AdmissionConfig, Signal};
use serde::Serialize;
use tracing::{debug, info};

use crate::dedup::{dedup, diversity_cap, rank_order, ScoredSignal};
use crate::quota::allocate;
use crate::scoring::PolicySet;

#[derive(Debug, Clone, Copy)]
pub struct AdmissionParams {
    pub global_budget: usize,
    pub category_floor: usize,
    pub diversity_cap: usize,
}

impl AdmissionParams {
    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self {
            global_budget: config.global_budget,
            category_floor: config.category_floor,
            diversity_cap: config.diversity_cap,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AdmissionStats {
    pub candidates: usize,
    pub superseded: usize,
    pub diversity_dropped: usize,
    pub quota_dropped: usize,
    pub admitted: usize,
}

/// One cycle's admitted batch, in rank order.
#[derive(Debug, Clone, Default)]
pub struct AdmittedBatch {
    pub signals: Vec<ScoredSignal>,
    pub stats: AdmissionStats,
}

impl AdmittedBatch {
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn into_signals(self) -> Vec<Signal> {
        self.signals.into_iter().map(|s| s.signal).collect()
    }
}

/// Deterministic admission: same candidates, parameters and `now` give the same batch.
pub struct AdmissionEngine {
    policies: PolicySet,
    params: AdmissionParams,
}

impl AdmissionEngine {
    pub fn new(policies: PolicySet, params: AdmissionParams) -> Self {
        Self { policies, params }
    }

    pub fn from_config(config: &AdmissionConfig) -> Self {
        Self::new(PolicySet::from_config(config), AdmissionParams::from_config(config))
    }

    pub fn params(&self) -> AdmissionParams {
        self.params
    }

    /// Score, dedup, cap per author, allocate per category, merge.
    pub fn admit(&self, candidates: Vec<Signal>, now: DateTime<Utc>) -> AdmittedBatch {
        let mut stats = AdmissionStats {
            candidates: candidates.len(),
            ..AdmissionStats::default()
        };

        let scored: Vec<ScoredSignal> = candidates
            .into_iter()
            .map(|signal| {
                let score = self.policies.score(&signal, now);
                ScoredSignal::new(signal, score)
            })
            .collect();

        let (unique, superseded) = dedup(scored);
        stats.superseded = superseded;

        let (pool, diversity_dropped) = diversity_cap(unique, self.params.diversity_cap);
        stats.diversity_dropped = diversity_dropped;

        // Pool is rank-ordered, so each bucket is too and its first entry is its best.
        let mut buckets: BTreeMap<String, Vec<ScoredSignal>> = BTreeMap::new();
        for s in pool {
            buckets.entry(s.signal.quota_key()).or_default().push(s);
        }
        let available: BTreeMap<String, usize> =
            buckets.iter().map(|(c, v)| (c.clone(), v.len())).collect();
        let best: BTreeMap<String, f64> = buckets
            .iter()
            .map(|(c, v)| (c.clone(), v.first().map(|s| s.score).unwrap_or(0.0)))
            .collect();

        let quotas = allocate(
            &available,
            &best,
            self.params.global_budget,
            self.params.category_floor,
        );

        let mut admitted = Vec::new();
        for (category, mut items) in buckets {
            let quota = quotas.get(&category).copied().unwrap_or(0);
            debug!(category = %category, available = items.len(), quota, "Category quota");
            stats.quota_dropped += items.len().saturating_sub(quota);
            items.truncate(quota);
            admitted.extend(items);
        }

        admitted.sort_by(rank_order);
        if admitted.len() > self.params.global_budget {
            stats.quota_dropped += admitted.len() - self.params.global_budget;
            admitted.truncate(self.params.global_budget);
        }
        stats.admitted = admitted.len();

        info!(
            candidates = stats.candidates,
            superseded = stats.superseded,
            diversity_dropped = stats.diversity_dropped,
            quota_dropped = stats.quota_dropped,
            admitted = stats.admitted,
            "Admission complete"
        );

        AdmittedBatch {
            signals: admitted,
            stats,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::ScoringPolicy;
    use chrono::Duration;
    use refinery_common::SourceType;

    /// Scores a post by its `score` metric, no decay.
    struct FixedScore;

    impl ScoringPolicy for FixedScore {
        fn source_type(&self) -> SourceType {
            SourceType::Post
        }

        fn score(&self, signal: &Signal, _now: DateTime<Utc>) -> f64 {
            signal.metric("score")
        }
    }

    fn engine(budget: usize, floor: usize, cap: usize) -> AdmissionEngine {
        AdmissionEngine::new(
            PolicySet::empty().with(FixedScore),
            AdmissionParams {
                global_budget: budget,
                category_floor: floor,
                diversity_cap: cap,
            },
        )
    }

    fn post(key: &str, category: &str, author: &str, score: f64) -> Signal {
        Signal::new(SourceType::Post, key, format!("text={key}"))
            .with_category(category)
            .with_author(author)
            .with_metric("score", score)
            .with_timestamp(Utc::now() - Duration::minutes(5))
    }

    fn scores(batch: &AdmittedBatch) -> Vec<f64> {
        batch.signals.iter().map(|s| s.score).collect()
    }

    #[test]
    fn category_budget_keeps_the_best() {
        let batch = engine(2, 1, 10).admit(
            vec![
                post("a", "Tech", "x", 90.0),
                post("b", "Tech", "y", 40.0),
                post("c", "Tech", "z", 95.0),
            ],
            Utc::now(),
        );
        assert_eq!(scores(&batch), vec![95.0, 90.0]);
        assert_eq!(batch.stats.quota_dropped, 1);
    }

    #[test]
    fn floor_larger_than_budget_still_respects_budget() {
        let batch = engine(2, 3, 10).admit(
            vec![
                post("a", "Tech", "x", 90.0),
                post("b", "Tech", "y", 40.0),
                post("c", "Tech", "z", 95.0),
            ],
            Utc::now(),
        );
        assert_eq!(scores(&batch), vec![95.0, 90.0]);
    }

    #[test]
    fn duplicate_key_is_superseded() {
        let batch = engine(2, 1, 10).admit(
            vec![
                post("a", "Tech", "x", 90.0),
                post("b", "Tech", "y", 40.0),
                post("c", "Tech", "z", 95.0),
                Signal::new(SourceType::Post, "c", "text=c, reworded")
                    .with_category("Tech")
                    .with_author("w")
                    .with_metric("score", 70.0),
            ],
            Utc::now(),
        );
        assert_eq!(scores(&batch), vec![95.0, 90.0]);
        assert_eq!(batch.stats.superseded, 1);
        assert_eq!(batch.stats.candidates, 4);
    }

    #[test]
    fn diversity_cap_limits_one_author() {
        let candidates = (0..5)
            .map(|i| post(&format!("k{i}"), "Tech", "whale", 100.0 - i as f64))
            .chain([post("solo", "Tech", "minnow", 1.0)])
            .collect();
        let batch = engine(10, 1, 2).admit(candidates, Utc::now());
        assert_eq!(scores(&batch), vec![100.0, 99.0, 1.0]);
        assert_eq!(batch.stats.diversity_dropped, 3);
    }

    #[test]
    fn small_categories_get_their_floor() {
        let mut candidates: Vec<Signal> = (0..40)
            .map(|i| post(&format!("big{i}"), "Finance", &format!("a{i}"), 1000.0 + i as f64))
            .collect();
        candidates.extend((0..5).map(|i| post(&format!("small{i}"), "Science", &format!("s{i}"), i as f64)));

        let batch = engine(10, 3, 2).admit(candidates, Utc::now());
        let science = batch
            .signals
            .iter()
            .filter(|s| s.signal.category == "Science")
            .count();
        assert_eq!(batch.len(), 10);
        assert!(science >= 3);
    }

    #[test]
    fn admission_is_deterministic() {
        let now = Utc::now();
        let candidates: Vec<Signal> = (0..30)
            .map(|i| {
                let mut s = post(
                    &format!("k{}", i % 17),
                    ["Tech", "Crypto", "Politics"][i % 3],
                    &format!("author{}", i % 7),
                    ((i * 37) % 11) as f64,
                );
                s.canonical_text = format!("text=variant {i}");
                s.fingerprint = refinery_common::Fingerprint::of_text(&s.canonical_text);
                s.timestamp = now - Duration::minutes((i % 4) as i64);
                s
            })
            .collect();
        let mut reversed = candidates.clone();
        reversed.reverse();

        let a = engine(8, 2, 2).admit(candidates, now);
        let b = engine(8, 2, 2).admit(reversed, now);
        let keys = |batch: &AdmittedBatch| {
            batch
                .signals
                .iter()
                .map(|s| s.signal.fingerprint.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(keys(&a), keys(&b));
        assert_eq!(a.stats, b.stats);
        assert!(a.len() <= 8);
    }
}
