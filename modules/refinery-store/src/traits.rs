use async_trait::async_trait;
use chrono::{DateTime, Utc};
use refinery_common::{Signal, SourceType};
use typed_builder::TypedBuilder;

use crate::error::Result;

/// Candidate selection over stored signals.
///
/// Results are ordered by `order_by_metric` descending when set, otherwise by
/// timestamp descending; fingerprint ascending breaks ties.
#[derive(Debug, Clone, TypedBuilder)]
pub struct SignalQuery {
    #[builder(default, setter(strip_option))]
    pub since: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the signal timestamp.
    #[builder(default, setter(strip_option))]
    pub until: Option<DateTime<Utc>>,
    #[builder(default, setter(strip_option))]
    pub source_type: Option<SourceType>,
    #[builder(default, setter(strip_option, into))]
    pub category: Option<String>,
    #[builder(default, setter(strip_option, into))]
    pub order_by_metric: Option<String>,
    #[builder(default = 1000)]
    pub limit: i64,
}

/// A collector file that has already been ingested, keyed by content SHA-256.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedBatch {
    pub sha: String,
    pub path: String,
    pub source_type: SourceType,
    pub item_count: i64,
    pub processed_at: DateTime<Utc>,
}

/// Record store for normalized signals.
#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Insert unless a signal with the same fingerprint exists. Returns true when inserted.
    async fn insert_if_absent(&self, signal: &Signal) -> Result<bool>;

    /// Insert a chunk with insert-if-absent semantics. Returns the number inserted.
    async fn insert_batch(&self, signals: &[Signal]) -> Result<u64> {
        let mut inserted = 0;
        for signal in signals {
            if self.insert_if_absent(signal).await? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn query(&self, query: &SignalQuery) -> Result<Vec<Signal>>;

    /// Most recent signal timestamp for a source type, if any.
    async fn latest_timestamp(&self, source_type: SourceType) -> Result<Option<DateTime<Utc>>>;

    async fn is_batch_processed(&self, sha: &str) -> Result<bool>;

    async fn mark_batch_processed(
        &self,
        sha: &str,
        path: &str,
        source_type: SourceType,
        item_count: i64,
    ) -> Result<()>;

    /// Delete signals older than `cutoff`. Returns the number removed.
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;
}
