//! Postgres-backed [`SignalStore`].

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use refinery_common::{Fingerprint, Signal, SourceType};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{info, warn};

use crate::error::{Result, StoreError};
use crate::traits::{SignalQuery, SignalStore};

/// Rows deleted per statement during retention, to keep locks short.
const PURGE_CHUNK: i64 = 500;

const SIGNAL_COLUMNS: &str = "fingerprint, source_type, dedup_key, topic_id, canonical_text, \
                              metrics, tags, category, author, ts, raw_payload";

#[derive(Clone)]
pub struct PgSignalStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct SignalRow {
    fingerprint: String,
    source_type: String,
    dedup_key: String,
    topic_id: String,
    canonical_text: String,
    metrics: Json<BTreeMap<String, f64>>,
    tags: Json<Vec<String>>,
    category: String,
    author: String,
    ts: DateTime<Utc>,
    raw_payload: serde_json::Value,
}

impl TryFrom<SignalRow> for Signal {
    type Error = StoreError;

    fn try_from(row: SignalRow) -> Result<Self> {
        let corrupt = |reason: String| StoreError::Corrupt {
            fingerprint: row.fingerprint.clone(),
            reason,
        };
        let source_type: SourceType = row
            .source_type
            .parse()
            .map_err(|e: refinery_common::RefineryError| corrupt(e.to_string()))?;
        let fingerprint = Fingerprint::parse(&row.fingerprint)
            .ok_or_else(|| corrupt("fingerprint is not a sha-256 hex digest".to_string()))?;

        Ok(Signal {
            source_type,
            dedup_key: row.dedup_key,
            topic_id: row.topic_id,
            canonical_text: row.canonical_text,
            fingerprint,
            metrics: row.metrics.0,
            tags: row.tags.0,
            category: row.category,
            author: row.author,
            timestamp: row.ts,
            raw_payload: row.raw_payload,
        })
    }
}

impl PgSignalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect and run the embedded migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;
        let store = Self::new(pool);
        store.migrate().await?;
        info!("Signal store connected");
        Ok(store)
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl SignalStore for PgSignalStore {
    async fn insert_if_absent(&self, signal: &Signal) -> Result<bool> {
        let inserted = self.insert_batch(std::slice::from_ref(signal)).await?;
        Ok(inserted == 1)
    }

    async fn insert_batch(&self, signals: &[Signal]) -> Result<u64> {
        if signals.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("INSERT INTO raw_signals ({SIGNAL_COLUMNS}) "));
        qb.push_values(signals, |mut b, s| {
            b.push_bind(s.fingerprint.as_str())
                .push_bind(s.source_type.as_str())
                .push_bind(s.dedup_key.as_str())
                .push_bind(s.topic_id.as_str())
                .push_bind(s.canonical_text.as_str())
                .push_bind(Json(s.metrics.clone()))
                .push_bind(Json(s.tags.clone()))
                .push_bind(s.category.as_str())
                .push_bind(s.author.as_str())
                .push_bind(s.timestamp)
                .push_bind(&s.raw_payload);
        });
        qb.push(" ON CONFLICT (fingerprint) DO NOTHING");

        let result = qb.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn query(&self, query: &SignalQuery) -> Result<Vec<Signal>> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new(format!("SELECT {SIGNAL_COLUMNS} FROM raw_signals WHERE TRUE "));

        if let Some(since) = query.since {
            qb.push("AND ts >= ").push_bind(since).push(" ");
        }
        if let Some(until) = query.until {
            qb.push("AND ts < ").push_bind(until).push(" ");
        }
        if let Some(source_type) = query.source_type {
            qb.push("AND source_type = ")
                .push_bind(source_type.as_str())
                .push(" ");
        }
        if let Some(category) = &query.category {
            qb.push("AND category = ").push_bind(category.clone()).push(" ");
        }

        match &query.order_by_metric {
            Some(metric) => {
                qb.push("ORDER BY COALESCE((metrics->>")
                    .push_bind(metric.clone())
                    .push(")::float8, 0) DESC, ts DESC");
            }
            None => {
                qb.push("ORDER BY ts DESC");
            }
        }
        qb.push(", fingerprint ASC LIMIT ").push_bind(query.limit);

        let rows = qb
            .build_query_as::<SignalRow>()
            .fetch_all(&self.pool)
            .await?;

        let mut signals = Vec::with_capacity(rows.len());
        for row in rows {
            match Signal::try_from(row) {
                Ok(signal) => signals.push(signal),
                Err(e) => warn!(error = %e, "Skipping unreadable signal row"),
            }
        }
        Ok(signals)
    }

    async fn latest_timestamp(&self, source_type: SourceType) -> Result<Option<DateTime<Utc>>> {
        let latest = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(ts) FROM raw_signals WHERE source_type = $1",
        )
        .bind(source_type.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(latest)
    }

    async fn is_batch_processed(&self, sha: &str) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM processed_batches WHERE sha = $1)",
        )
        .bind(sha)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn mark_batch_processed(
        &self,
        sha: &str,
        path: &str,
        source_type: SourceType,
        item_count: i64,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO processed_batches (sha, path, source_type, item_count)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (sha) DO NOTHING
            "#,
        )
        .bind(sha)
        .bind(path)
        .bind(source_type.as_str())
        .bind(item_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut removed = 0;
        loop {
            let result = sqlx::query(
                "DELETE FROM raw_signals WHERE fingerprint IN \
                 (SELECT fingerprint FROM raw_signals WHERE ts < $1 LIMIT $2)",
            )
            .bind(cutoff)
            .bind(PURGE_CHUNK)
            .execute(&self.pool)
            .await?;
            removed += result.rows_affected();
            if result.rows_affected() < PURGE_CHUNK as u64 {
                return Ok(removed);
            }
        }
    }
}
