//! Cold storage for raw signals leaving the record store.
//!
//! Expired signals are written as JSONL under `YYYY/MM/raw_signals_YYYYMMDD.jsonl`,
//! named by the retention cutoff, before the store deletes them. Re-running a
//! sweep with the same cutoff appends to the same file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use refinery_common::{LedgerConfig, Signal};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::Result;
use crate::log::append_durable;

pub struct SignalArchive {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl SignalArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        Self::new(Path::new(&config.root).join(&config.archive_dir))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, cutoff: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(cutoff.format("%Y/%m").to_string())
            .join(format!("raw_signals_{}.jsonl", cutoff.format("%Y%m%d")))
    }

    /// Durably write `signals` to the file for `cutoff`. Nothing is written for
    /// an empty slice.
    pub async fn archive(&self, signals: &[Signal], cutoff: DateTime<Utc>) -> Result<PathBuf> {
        let path = self.path_for(cutoff);
        let mut buf = Vec::with_capacity(signals.len() * 512);
        for signal in signals {
            serde_json::to_writer(&mut buf, signal)?;
            buf.push(b'\n');
        }
        if buf.is_empty() {
            return Ok(path);
        }

        let _guard = self.write_lock.lock().await;
        append_durable(&path, buf).await?;
        info!(path = %path.display(), signals = signals.len(), "Archived expired signals");
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use refinery_common::SourceType;

    #[tokio::test]
    async fn archive_is_named_by_cutoff_and_appends() {
        let dir = tempfile::tempdir().unwrap();
        let archive = SignalArchive::new(dir.path().join("archive"));
        let cutoff = Utc.with_ymd_and_hms(2026, 3, 7, 2, 0, 0).unwrap();
        let old = |text: &str| {
            Signal::new(SourceType::Post, format!("k:{text}"), text)
                .with_timestamp(cutoff - chrono::Duration::days(1))
        };

        let path = archive.archive(&[old("first")], cutoff).await.unwrap();
        archive.archive(&[old("second")], cutoff).await.unwrap();

        assert_eq!(path, dir.path().join("archive/2026/03/raw_signals_20260307.jsonl"));
        let lines: Vec<Signal> = std::fs::read_to_string(&path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        let texts: Vec<_> = lines.iter().map(|s| s.canonical_text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test]
    async fn empty_archive_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let archive = SignalArchive::new(dir.path());
        let path = archive.archive(&[], Utc::now()).await.unwrap();
        assert!(!path.exists());
    }
}
