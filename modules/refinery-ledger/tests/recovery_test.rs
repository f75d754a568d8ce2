//! Restart behavior: what was appended locally is remembered, whatever sync did.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use refinery_common::{AuditRecord, Fingerprint, PeriodGranularity, SourceType};
use refinery_ledger::{AppendLog, GitOutput, GitRunner, GitSync, Partitioner, SyncState};

/// Every command fails, as if the remote were unreachable.
struct OfflineGit;

#[async_trait]
impl GitRunner for OfflineGit {
    async fn run(&self, _args: &[&str]) -> refinery_ledger::Result<GitOutput> {
        Ok(GitOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: "fatal: unable to access remote".into(),
        })
    }
}

fn record(text: &str, evaluator: &str) -> AuditRecord {
    AuditRecord {
        fingerprint: Fingerprint::of_text(text),
        topic_id: "post:https://x.com/a/1".into(),
        evaluator_id: evaluator.into(),
        source_type: SourceType::Post,
        thought: String::new(),
        output: "Neutral".into(),
        drift_flag: false,
        prior_output: None,
        timestamp: Utc::now(),
    }
}

fn open(dir: &std::path::Path) -> AppendLog {
    AppendLog::new(
        dir.join("audits"),
        Partitioner::new(PeriodGranularity::Daily, 8).unwrap(),
    )
}

#[tokio::test]
async fn flushed_but_unsynced_records_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let at = Utc.with_ymd_and_hms(2026, 5, 10, 3, 0, 0).unwrap();

    {
        let log = open(dir.path());
        log.append_batch_at(&[record("one", "skeptic"), record("one", "optimist")], at)
            .await
            .unwrap();
        let report = GitSync::new(Arc::new(OfflineGit), dir.path())
            .sync("audit: 2 records")
            .await;
        assert_eq!(report.final_state, SyncState::Failed);
        assert!(!report.pushed);
    }

    // Fresh process.
    let memory = open(dir.path()).memory_at(at).await.unwrap();
    let fp = Fingerprint::of_text("one");
    assert!(memory.seen.contains(&fp, "skeptic"));
    assert!(memory.seen.contains(&fp, "optimist"));
    assert!(!memory.seen.contains(&Fingerprint::of_text("two"), "skeptic"));
}

#[tokio::test]
async fn concurrent_appends_do_not_interleave() {
    let dir = tempfile::tempdir().unwrap();
    let log = Arc::new(open(dir.path()));
    let at = Utc.with_ymd_and_hms(2026, 5, 10, 3, 0, 0).unwrap();

    let mut handles = Vec::new();
    for i in 0..8 {
        let log = log.clone();
        handles.push(tokio::spawn(async move {
            let batch: Vec<_> = (0..20)
                .map(|j| record(&format!("{i}-{j}"), "skeptic"))
                .collect();
            log.append_batch_at(&batch, at).await.unwrap();
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let records = log.replay_at(at).await.unwrap();
    assert_eq!(records.len(), 160);
}
