use std::cmp::Ordering;
use std::collections::HashMap;

use refinery_common::Signal;

/// A signal with its score for this cycle. Scores are computed once and reused.
#[derive(Debug, Clone)]
pub struct ScoredSignal {
    pub signal: Signal,
    pub score: f64,
}

impl ScoredSignal {
    pub fn new(signal: Signal, score: f64) -> Self {
        Self { signal, score }
    }
}

/// Batch order: score desc, timestamp desc, dedup_key asc, fingerprint asc.
pub fn rank_order(a: &ScoredSignal, b: &ScoredSignal) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| b.signal.timestamp.cmp(&a.signal.timestamp))
        .then_with(|| a.signal.dedup_key.cmp(&b.signal.dedup_key))
        .then_with(|| a.signal.fingerprint.cmp(&b.signal.fingerprint))
}

/// True when `a` should survive over `b` for the same dedup key.
fn supersedes(a: &ScoredSignal, b: &ScoredSignal) -> bool {
    let order = b
        .score
        .total_cmp(&a.score)
        .then_with(|| b.signal.timestamp.cmp(&a.signal.timestamp))
        .then_with(|| a.signal.fingerprint.cmp(&b.signal.fingerprint));
    order == Ordering::Less
}

/// Collapse instances sharing a dedup key to the best one.
/// Returns survivors in rank order and the number superseded.
pub fn dedup(candidates: Vec<ScoredSignal>) -> (Vec<ScoredSignal>, usize) {
    let total = candidates.len();
    let mut best: HashMap<String, ScoredSignal> = HashMap::with_capacity(total);

    for candidate in candidates {
        match best.get(&candidate.signal.dedup_key) {
            Some(current) if !supersedes(&candidate, current) => {}
            _ => {
                best.insert(candidate.signal.dedup_key.clone(), candidate);
            }
        }
    }

    let mut survivors: Vec<ScoredSignal> = best.into_values().collect();
    survivors.sort_by(rank_order);
    let superseded = total - survivors.len();
    (survivors, superseded)
}

/// Keep at most `cap` items per diversity key (source type + author), in rank order.
/// Input must already be rank-ordered. Returns survivors and the number dropped.
pub fn diversity_cap(ranked: Vec<ScoredSignal>, cap: usize) -> (Vec<ScoredSignal>, usize) {
    let mut seen: HashMap<String, usize> = HashMap::new();
    let before = ranked.len();
    let kept: Vec<ScoredSignal> = ranked
        .into_iter()
        .filter(|s| {
            let n = seen.entry(s.signal.diversity_key()).or_insert(0);
            *n += 1;
            *n <= cap
        })
        .collect();
    let dropped = before - kept.len();
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use refinery_common::SourceType;

    fn scored(key: &str, text: &str, score: f64, age_min: i64) -> ScoredSignal {
        let signal = Signal::new(SourceType::Post, key, text)
            .with_timestamp(Utc::now() - Duration::minutes(age_min));
        ScoredSignal::new(signal, score)
    }

    #[test]
    fn highest_score_survives() {
        let (out, superseded) = dedup(vec![
            scored("k", "a version", 70.0, 0),
            scored("k", "b version", 95.0, 10),
            scored("other", "c", 10.0, 0),
        ]);
        assert_eq!(superseded, 1);
        assert_eq!(out[0].signal.canonical_text, "b version");
        assert_eq!(out[1].signal.dedup_key, "other");
    }

    #[test]
    fn ties_prefer_newer_then_lower_fingerprint() {
        let (out, _) = dedup(vec![scored("k", "older", 50.0, 30), scored("k", "newer", 50.0, 1)]);
        assert_eq!(out[0].signal.canonical_text, "newer");

        let now = Utc::now();
        let mut a = scored("k", "alpha", 50.0, 0);
        let mut b = scored("k", "beta", 50.0, 0);
        a.signal.timestamp = now;
        b.signal.timestamp = now;
        let expected = a.signal.fingerprint.clone().min(b.signal.fingerprint.clone());
        let (one, _) = dedup(vec![a.clone(), b.clone()]);
        let (two, _) = dedup(vec![b, a]);
        assert_eq!(one[0].signal.fingerprint, expected);
        assert_eq!(two[0].signal.fingerprint, expected);
    }

    #[test]
    fn diversity_keeps_top_k_per_author() {
        let mut ranked: Vec<_> = (0..4)
            .map(|i| {
                let mut s = scored(&format!("k{i}"), &format!("text {i}"), 100.0 - i as f64, 0);
                s.signal.author = "Whale".into();
                s
            })
            .collect();
        ranked.push({
            let mut s = scored("solo", "solo text", 1.0, 0);
            s.signal.author = "minnow".into();
            s
        });

        let (kept, dropped) = diversity_cap(ranked, 2);
        assert_eq!(dropped, 2);
        let keys: Vec<_> = kept.iter().map(|s| s.signal.dedup_key.as_str()).collect();
        assert_eq!(keys, vec!["k0", "k1", "solo"]);
    }
}
