//! One refinery cycle: heal the ledger, rebuild memory, admit, audit.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use refinery_admission::{AdmissionEngine, AdmissionStats};
use refinery_audit::{AuditReport, Orchestrator};
use refinery_common::RefineryError;
use refinery_ledger::{AppendLog, GitSync};
use refinery_store::{SignalQuery, SignalStore};
use tracing::{info, warn};

use crate::sink::LedgerSink;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub candidates: usize,
    pub admission: Option<AdmissionStats>,
    pub audit: AuditReport,
}

pub struct Cycle {
    store: Arc<dyn SignalStore>,
    engine: AdmissionEngine,
    orchestrator: Orchestrator,
    log: Arc<AppendLog>,
    sync: Option<Arc<GitSync>>,
    window: Duration,
    candidate_limit: i64,
}

impl Cycle {
    pub fn new(
        store: Arc<dyn SignalStore>,
        engine: AdmissionEngine,
        orchestrator: Orchestrator,
        log: Arc<AppendLog>,
    ) -> Self {
        Self {
            store,
            engine,
            orchestrator,
            log,
            sync: None,
            window: Duration::minutes(70),
            candidate_limit: 1000,
        }
    }

    pub fn with_sync(mut self, sync: Arc<GitSync>) -> Self {
        self.sync = Some(sync);
        self
    }

    /// Candidates are signals newer than `now - window`, at most `limit` of them.
    pub fn with_window(mut self, window: Duration, limit: i64) -> Self {
        self.window = window;
        self.candidate_limit = limit;
        self
    }

    pub async fn run(&self, now: DateTime<Utc>) -> Result<CycleReport, RefineryError> {
        if let Some(sync) = &self.sync {
            if let Err(e) = sync.heal().await {
                warn!(error = %e, "Ledger heal failed, continuing with local append only");
            }
        }

        let mut memory = self.log.memory_at(now).await?;
        info!(
            seen = memory.seen.len(),
            topics = memory.topics.topics(),
            "Ledger memory rebuilt"
        );

        let query = SignalQuery::builder()
            .since(now - self.window)
            .limit(self.candidate_limit)
            .build();
        let candidates = self.store.query(&query).await?;
        let mut report = CycleReport {
            candidates: candidates.len(),
            ..CycleReport::default()
        };
        if candidates.is_empty() {
            info!(window_minutes = self.window.num_minutes(), "No fresh signals, nothing to audit");
            return Ok(report);
        }

        let admitted = self.engine.admit(candidates, now);
        report.admission = Some(admitted.stats);
        if admitted.is_empty() {
            return Ok(report);
        }

        let signals = admitted.into_signals();
        let sink = LedgerSink::new(self.log.clone(), self.sync.clone());
        report.audit = self.orchestrator.run(&signals, &mut memory, &sink).await;
        Ok(report)
    }
}
