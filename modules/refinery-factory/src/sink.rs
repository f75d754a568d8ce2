use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use refinery_audit::{AuditSink, FlushOutcome};
use refinery_common::{AuditRecord, RefineryError};
use refinery_ledger::{AppendLog, GitSync};
use tracing::warn;

/// Appends each audit batch to the local ledger, then publishes it when sync is on.
pub struct LedgerSink {
    log: Arc<AppendLog>,
    sync: Option<Arc<GitSync>>,
}

impl LedgerSink {
    pub fn new(log: Arc<AppendLog>, sync: Option<Arc<GitSync>>) -> Self {
        Self { log, sync }
    }
}

#[async_trait]
impl AuditSink for LedgerSink {
    async fn flush(&self, records: &[AuditRecord]) -> Result<FlushOutcome, RefineryError> {
        let path = self.log.append_batch(records).await?;

        let synced = match &self.sync {
            Some(sync) => {
                let message = format!(
                    "audit: {} records ({})",
                    records.len(),
                    Utc::now().format("%Y-%m-%d %H:%M UTC")
                );
                let report = sync.sync(&message).await;
                if !report.is_synced() {
                    warn!(
                        segment = %path.display(),
                        state = ?report.final_state,
                        "Ledger sync incomplete, records are kept locally"
                    );
                }
                Some(report.is_synced())
            }
            None => None,
        };

        Ok(FlushOutcome {
            appended: records.len(),
            synced,
        })
    }
}
