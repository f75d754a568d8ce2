//! In-memory [`SignalStore`] for tests and dry runs. Thread-safe.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use refinery_common::{Fingerprint, Signal, SourceType};

use crate::error::Result;
use crate::traits::{ProcessedBatch, SignalQuery, SignalStore};

#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

#[derive(Default)]
struct Inner {
    signals: BTreeMap<Fingerprint, Signal>,
    batches: HashMap<String, ProcessedBatch>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of processed batches (for test assertions).
    pub fn batches(&self) -> Vec<ProcessedBatch> {
        self.lock().batches.values().cloned().collect()
    }
}

#[async_trait]
impl SignalStore for MemoryStore {
    async fn insert_if_absent(&self, signal: &Signal) -> Result<bool> {
        let mut inner = self.lock();
        if inner.signals.contains_key(&signal.fingerprint) {
            return Ok(false);
        }
        inner
            .signals
            .insert(signal.fingerprint.clone(), signal.clone());
        Ok(true)
    }

    async fn query(&self, query: &SignalQuery) -> Result<Vec<Signal>> {
        let inner = self.lock();
        let mut matched: Vec<Signal> = inner
            .signals
            .values()
            .filter(|s| query.since.map_or(true, |since| s.timestamp >= since))
            .filter(|s| query.until.map_or(true, |until| s.timestamp < until))
            .filter(|s| query.source_type.map_or(true, |st| s.source_type == st))
            .filter(|s| query.category.as_ref().map_or(true, |c| &s.category == c))
            .cloned()
            .collect();

        matched.sort_by(|a, b| {
            let by_metric = match &query.order_by_metric {
                Some(m) => b.metric(m).total_cmp(&a.metric(m)),
                None => std::cmp::Ordering::Equal,
            };
            by_metric
                .then_with(|| b.timestamp.cmp(&a.timestamp))
                .then_with(|| a.fingerprint.cmp(&b.fingerprint))
        });
        matched.truncate(query.limit.max(0) as usize);
        Ok(matched)
    }

    async fn latest_timestamp(&self, source_type: SourceType) -> Result<Option<DateTime<Utc>>> {
        Ok(self
            .lock()
            .signals
            .values()
            .filter(|s| s.source_type == source_type)
            .map(|s| s.timestamp)
            .max())
    }

    async fn is_batch_processed(&self, sha: &str) -> Result<bool> {
        Ok(self.lock().batches.contains_key(sha))
    }

    async fn mark_batch_processed(
        &self,
        sha: &str,
        path: &str,
        source_type: SourceType,
        item_count: i64,
    ) -> Result<()> {
        self.lock()
            .batches
            .entry(sha.to_string())
            .or_insert_with(|| ProcessedBatch {
                sha: sha.to_string(),
                path: path.to_string(),
                source_type,
                item_count,
                processed_at: Utc::now(),
            });
        Ok(())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.lock();
        let before = inner.signals.len();
        inner.signals.retain(|_, s| s.timestamp >= cutoff);
        Ok((before - inner.signals.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn signal(text: &str, source_type: SourceType, age_hours: i64, stars: f64) -> Signal {
        Signal::new(source_type, format!("k:{text}"), text)
            .with_metric("stars", stars)
            .with_timestamp(Utc::now() - Duration::hours(age_hours))
    }

    #[tokio::test]
    async fn insert_is_idempotent_by_fingerprint() {
        let store = MemoryStore::new();
        let s = signal("tokio-rs/tokio", SourceType::Repository, 1, 10.0);
        assert!(store.insert_if_absent(&s).await.unwrap());
        assert!(!store.insert_if_absent(&s).await.unwrap());
        let n = store.insert_batch(&[s.clone(), s]).await.unwrap();
        assert_eq!(n, 0);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn query_filters_orders_and_limits() {
        let store = MemoryStore::new();
        store
            .insert_batch(&[
                signal("repo-a", SourceType::Repository, 1, 5.0),
                signal("repo-b", SourceType::Repository, 2, 50.0),
                signal("repo-c", SourceType::Repository, 30, 500.0),
                signal("post-a", SourceType::Post, 1, 0.0),
            ])
            .await
            .unwrap();

        let q = SignalQuery::builder()
            .since(Utc::now() - Duration::hours(24))
            .source_type(SourceType::Repository)
            .order_by_metric("stars")
            .limit(10)
            .build();
        let found = store.query(&q).await.unwrap();
        let texts: Vec<_> = found.iter().map(|s| s.canonical_text.as_str()).collect();
        assert_eq!(texts, vec!["repo-b", "repo-a"]);

        let newest = store
            .query(&SignalQuery::builder().limit(1).build())
            .await
            .unwrap();
        assert_eq!(newest.len(), 1);
        assert!(["repo-a", "post-a"].contains(&newest[0].canonical_text.as_str()));
    }

    #[tokio::test]
    async fn batches_and_purge() {
        let store = MemoryStore::new();
        assert!(!store.is_batch_processed("abc").await.unwrap());
        store
            .mark_batch_processed("abc", "github/day.json", SourceType::Repository, 2)
            .await
            .unwrap();
        assert!(store.is_batch_processed("abc").await.unwrap());

        store
            .insert_batch(&[
                signal("fresh item", SourceType::Paper, 1, 0.0),
                signal("stale item", SourceType::Paper, 24 * 10, 0.0),
            ])
            .await
            .unwrap();
        let cutoff = Utc::now() - Duration::days(7);
        let expired = store
            .query(&SignalQuery::builder().until(cutoff).build())
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].canonical_text, "stale item");

        let removed = store
            .purge_before(cutoff)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        let latest = store.latest_timestamp(SourceType::Paper).await.unwrap();
        assert!(latest.is_some());
        assert!(store.latest_timestamp(SourceType::Market).await.unwrap().is_none());
    }
}
