//! Append-only JSONL segments, one per calendar period.
//!
//! Each flush writes the whole batch with a single write and an fsync. If the
//! write fails the segment is truncated back to its previous length, so a
//! batch is either fully on disk or absent. A crash mid-write can still leave
//! a torn final line; replay skips it.

use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use refinery_common::{AuditRecord, LedgerConfig, LedgerMemory};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::period::{Partitioner, PeriodKey};

pub struct AppendLog {
    segments: PathBuf,
    partitioner: Partitioner,
    write_lock: Mutex<()>,
}

impl AppendLog {
    pub fn new(segments: impl Into<PathBuf>, partitioner: Partitioner) -> Self {
        Self {
            segments: segments.into(),
            partitioner,
            write_lock: Mutex::new(()),
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Result<Self> {
        let partitioner = Partitioner::new(config.period, config.utc_offset_hours)?;
        Ok(Self::new(
            Path::new(&config.root).join(&config.segment_dir),
            partitioner,
        ))
    }

    /// Directory holding every segment.
    pub fn segment_dir(&self) -> &Path {
        &self.segments
    }

    pub fn partitioner(&self) -> &Partitioner {
        &self.partitioner
    }

    pub fn segment_path(&self, key: &PeriodKey) -> PathBuf {
        self.segments.join(key.relative_path())
    }

    /// Append to the segment of the current period.
    pub async fn append_batch(&self, records: &[AuditRecord]) -> Result<PathBuf> {
        self.append_batch_at(records, Utc::now()).await
    }

    /// Append to the segment of the period containing `at`. All or nothing.
    pub async fn append_batch_at(
        &self,
        records: &[AuditRecord],
        at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let path = self.segment_path(&self.partitioner.key_for(at));

        let mut buf = Vec::with_capacity(records.len() * 512);
        for record in records {
            serde_json::to_writer(&mut buf, record)?;
            buf.push(b'\n');
        }
        if buf.is_empty() {
            return Ok(path);
        }

        let bytes = buf.len();
        let _guard = self.write_lock.lock().await;
        append_durable(&path, buf).await?;

        debug!(path = %path.display(), records = records.len(), bytes, "Appended audit batch");
        Ok(path)
    }

    /// Records of one period in file order. A missing segment is an empty period.
    pub async fn replay(&self, key: PeriodKey) -> Result<Vec<AuditRecord>> {
        let path = self.segment_path(&key);
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let text = String::from_utf8_lossy(&bytes);
        let mut records = Vec::new();
        let mut skipped = 0usize;
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<AuditRecord>(line) {
                Ok(record) => records.push(record),
                Err(e) => {
                    skipped += 1;
                    warn!(
                        path = %path.display(),
                        line = index + 1,
                        error = %e,
                        "Skipping unreadable ledger line"
                    );
                }
            }
        }

        info!(period = %key, records = records.len(), skipped, "Ledger replayed");
        Ok(records)
    }

    pub async fn replay_at(&self, at: DateTime<Utc>) -> Result<Vec<AuditRecord>> {
        self.replay(self.partitioner.key_for(at)).await
    }

    /// Seen set and topic memory for the period containing `at`.
    pub async fn memory_at(&self, at: DateTime<Utc>) -> Result<LedgerMemory> {
        let records = self.replay_at(at).await?;
        Ok(LedgerMemory::from_records(&records))
    }
}

/// Append `buf` to `path` as one write followed by `sync_data`. On failure the
/// file is truncated back to its previous length. Callers serialize access.
pub(crate) async fn append_durable(path: &Path, mut buf: Vec<u8>) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
        .await?;
    let before = file.metadata().await?.len();

    // A torn tail from an earlier crash must not swallow the first new line.
    if before > 0 && !ends_with_newline(&mut file, before).await? {
        warn!(path = %path.display(), "File tail has no newline, starting batch on a fresh line");
        buf.insert(0, b'\n');
    }

    let written = async {
        file.write_all(&buf).await?;
        file.flush().await?;
        file.sync_data().await
    }
    .await;

    if let Err(e) = written {
        error!(path = %path.display(), bytes = buf.len(), error = %e, "Ledger append failed, truncating");
        if let Err(te) = file.set_len(before).await {
            error!(path = %path.display(), error = %te, "Failed to truncate after failed append");
        }
        return Err(e.into());
    }
    Ok(())
}

async fn ends_with_newline(file: &mut File, len: u64) -> Result<bool> {
    file.seek(SeekFrom::Start(len - 1)).await?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last).await?;
    Ok(last[0] == b'\n')
}
