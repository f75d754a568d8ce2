//! Bounded-concurrency dispatch of admitted signals to the evaluator panel.
//!
//! Signals are processed in batches. Within a batch, up to `pool_size` signals
//! are in flight at once and each signal's evaluators run one after another.
//! A batch's records are flushed before the next batch starts, and only then
//! are the seen set and topic memory updated.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use refinery_common::{AuditRecord, LedgerMemory, RefineryError, Signal};
use tracing::{error, info, warn};

use crate::context::EvaluationContext;
use crate::evaluator::EvaluatorRegistry;
use crate::model::ModelCaller;
use crate::verdict::is_drift;

/// Where a finished batch goes. Implemented by the ledger (append + sync).
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn flush(&self, records: &[AuditRecord]) -> Result<FlushOutcome, RefineryError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushOutcome {
    pub appended: usize,
    /// `None` when remote sync is disabled.
    pub synced: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditReport {
    pub batches: usize,
    /// (signal, evaluator) pairs sent to an evaluator.
    pub dispatched: usize,
    pub records: usize,
    /// Pairs skipped because the ledger already holds them.
    pub skipped_seen: usize,
    pub failures: usize,
    pub drifted: usize,
    pub flush_failures: usize,
    pub syncs_ok: usize,
    pub syncs_failed: usize,
}

#[derive(Default)]
struct SignalOutcome {
    records: Vec<AuditRecord>,
    failures: usize,
    skipped_seen: usize,
}

pub struct Orchestrator {
    registry: EvaluatorRegistry,
    model: Arc<dyn ModelCaller>,
    pool_size: usize,
    batch_size: usize,
}

impl Orchestrator {
    pub fn new(registry: EvaluatorRegistry, model: Arc<dyn ModelCaller>) -> Self {
        Self {
            registry,
            model,
            pool_size: 4,
            batch_size: 8,
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn registry(&self) -> &EvaluatorRegistry {
        &self.registry
    }

    /// Audit `signals` in order. Every applicable (signal, evaluator) pair not
    /// already in `memory` is dispatched once; failures are counted, not raised.
    pub async fn run(
        &self,
        signals: &[Signal],
        memory: &mut LedgerMemory,
        sink: &dyn AuditSink,
    ) -> AuditReport {
        let mut report = AuditReport::default();

        for (index, batch) in signals.chunks(self.batch_size).enumerate() {
            let pending = self.pending(batch, memory, &mut report);
            if pending.is_empty() {
                continue;
            }
            report.batches += 1;

            let snapshot: &LedgerMemory = memory;
            let mut outcomes: Vec<(usize, SignalOutcome)> =
                stream::iter(pending.iter().enumerate().map(|(i, signal)| async move {
                    (i, self.audit_signal(signal, snapshot).await)
                }))
                .buffer_unordered(self.pool_size)
                .collect()
                .await;
            outcomes.sort_by_key(|(i, _)| *i);

            let mut records = Vec::new();
            let mut failures = 0;
            for (_, outcome) in outcomes {
                failures += outcome.failures;
                report.skipped_seen += outcome.skipped_seen;
                records.extend(outcome.records);
            }
            report.failures += failures;
            report.dispatched += records.len() + failures;
            let drifted = records.iter().filter(|r| r.drift_flag).count();

            if records.is_empty() {
                warn!(batch = index, failures, "Audit batch produced no records");
                continue;
            }

            match sink.flush(&records).await {
                Ok(outcome) => {
                    memory.absorb(&records);
                    report.records += outcome.appended;
                    report.drifted += drifted;
                    match outcome.synced {
                        Some(true) => report.syncs_ok += 1,
                        Some(false) => report.syncs_failed += 1,
                        None => {}
                    }
                    info!(
                        batch = index,
                        signals = pending.len(),
                        records = outcome.appended,
                        failures,
                        drifted,
                        "Audit batch flushed"
                    );
                }
                Err(e) => {
                    error!(batch = index, records = records.len(), error = %e, "Failed to flush audit batch");
                    report.flush_failures += 1;
                }
            }
        }

        info!(
            batches = report.batches,
            dispatched = report.dispatched,
            records = report.records,
            skipped_seen = report.skipped_seen,
            failures = report.failures,
            drifted = report.drifted,
            "Audit complete"
        );
        report
    }

    /// Signals in `batch` with at least one applicable evaluator still to run.
    /// Fully-audited signals are counted as skipped; repeated fingerprints run once.
    fn pending<'s>(
        &self,
        batch: &'s [Signal],
        memory: &LedgerMemory,
        report: &mut AuditReport,
    ) -> Vec<&'s Signal> {
        let mut fingerprints = HashSet::new();
        let mut pending = Vec::new();
        for signal in batch {
            if !fingerprints.insert(&signal.fingerprint) {
                continue;
            }
            let applicable: Vec<_> = self.registry.applicable(signal.source_type).collect();
            let done = applicable
                .iter()
                .filter(|e| memory.seen.contains(&signal.fingerprint, e.id()))
                .count();
            if done == applicable.len() {
                report.skipped_seen += done;
            } else {
                pending.push(signal);
            }
        }
        pending
    }

    async fn audit_signal(&self, signal: &Signal, memory: &LedgerMemory) -> SignalOutcome {
        let mut outcome = SignalOutcome::default();

        for evaluator in self.registry.applicable(signal.source_type) {
            let evaluator_id = evaluator.id();
            if memory.seen.contains(&signal.fingerprint, evaluator_id) {
                outcome.skipped_seen += 1;
                continue;
            }

            let ctx = EvaluationContext::new(signal, &memory.topics, evaluator_id);
            match evaluator.audit(&ctx, self.model.as_ref()).await {
                Ok(verdict) => {
                    let drift_flag = is_drift(ctx.prior_output, &verdict.output);
                    outcome.records.push(AuditRecord {
                        fingerprint: signal.fingerprint.clone(),
                        topic_id: signal.topic_id.clone(),
                        evaluator_id: evaluator_id.to_string(),
                        source_type: signal.source_type,
                        thought: verdict.thought,
                        output: verdict.output,
                        drift_flag,
                        prior_output: ctx.prior_output.map(str::to_string),
                        timestamp: Utc::now(),
                    });
                }
                Err(e) => {
                    warn!(
                        evaluator = evaluator_id,
                        fingerprint = signal.fingerprint.short(),
                        error = %e,
                        "Evaluator failed"
                    );
                    outcome.failures += 1;
                }
            }
        }
        outcome
    }
}
