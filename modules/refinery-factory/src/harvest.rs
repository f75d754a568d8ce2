//! Retention: expired raw signals go to the ledger archive, then leave the store.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use refinery_common::RefineryError;
use refinery_ledger::{GitSync, SignalArchive};
use refinery_store::{SignalQuery, SignalStore};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct HarvestReport {
    pub cutoff: Option<DateTime<Utc>>,
    pub archived: usize,
    pub archive_path: Option<PathBuf>,
    /// `None` when no sync was attempted.
    pub synced: Option<bool>,
    pub removed: u64,
}

pub struct Harvester {
    store: Arc<dyn SignalStore>,
    archive: Option<Arc<SignalArchive>>,
    sync: Option<Arc<GitSync>>,
}

impl Harvester {
    pub fn new(store: Arc<dyn SignalStore>) -> Self {
        Self {
            store,
            archive: None,
            sync: None,
        }
    }

    pub fn with_archive(mut self, archive: Arc<SignalArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    pub fn with_sync(mut self, sync: Arc<GitSync>) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Archive then delete signals older than `days`.
    ///
    /// Nothing is deleted unless the archive write succeeded. A failed push
    /// leaves the archive committed locally for the next sync.
    pub async fn run(&self, days: i64, now: DateTime<Utc>) -> Result<HarvestReport, RefineryError> {
        if days <= 0 {
            return Err(RefineryError::config("retention days must be > 0"));
        }
        let cutoff = now - Duration::days(days);
        let mut report = HarvestReport {
            cutoff: Some(cutoff),
            ..HarvestReport::default()
        };

        if let Some(archive) = &self.archive {
            let expired = self
                .store
                .query(&SignalQuery::builder().until(cutoff).limit(i64::MAX).build())
                .await?;
            if !expired.is_empty() {
                let path = archive.archive(&expired, cutoff).await?;
                report.archived = expired.len();
                report.archive_path = Some(path);

                if let Some(sync) = &self.sync {
                    let message = format!(
                        "archive: {} raw signals before {}",
                        expired.len(),
                        cutoff.format("%Y-%m-%d")
                    );
                    let outcome = sync.sync(&message).await;
                    if !outcome.is_synced() {
                        warn!(state = ?outcome.final_state, "Archive not pushed, will go with the next sync");
                    }
                    report.synced = Some(outcome.is_synced());
                }
            }
        }

        report.removed = self.store.purge_before(cutoff).await?;
        info!(
            days,
            cutoff = %cutoff,
            archived = report.archived,
            removed = report.removed,
            "Retention sweep complete"
        );
        Ok(report)
    }
}
