//! Scanning the collector inbox into the record store.
//!
//! Layout: `<inbox>/<source folder>/**/*.json`. The folder name picks the
//! source type. Each file is identified by the SHA-256 of its bytes, so a
//! re-scan skips files already ingested even if they were moved.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use refinery_common::{normalize_with, split_batch, RefineryError, Signal, SourceType};
use refinery_store::SignalStore;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub files: usize,
    /// Files skipped because their content was already ingested.
    pub already_processed: usize,
    pub items: usize,
    pub inserted: u64,
    pub invalid: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub per_source: BTreeMap<SourceType, SourceCounts>,
    pub failed_files: usize,
    /// Files outside any known source folder.
    pub unrouted_files: usize,
}

impl IngestReport {
    pub fn inserted(&self) -> u64 {
        self.per_source.values().map(|c| c.inserted).sum()
    }
}

pub struct Ingestor {
    store: Arc<dyn SignalStore>,
    chunk_size: usize,
}

impl Ingestor {
    pub fn new(store: Arc<dyn SignalStore>) -> Self {
        Self {
            store,
            chunk_size: 500,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Ingest every unprocessed batch file under `inbox`. Per-file failures are
    /// logged and counted; they never stop the scan.
    pub async fn ingest_dir(&self, inbox: &Path) -> Result<IngestReport, RefineryError> {
        let mut report = IngestReport::default();
        let files = collect_json_files(inbox).await?;
        info!(inbox = %inbox.display(), files = files.len(), "Scanning inbox");

        for path in files {
            let relative = path.strip_prefix(inbox).unwrap_or(&path);
            let Some(source_type) = route(relative) else {
                debug!(path = %relative.display(), "No source folder, skipping");
                report.unrouted_files += 1;
                continue;
            };

            let counts = report.per_source.entry(source_type).or_default();
            counts.files += 1;
            match self.ingest_file(&path, relative, source_type, counts).await {
                Ok(()) => {}
                Err(e) => {
                    warn!(path = %relative.display(), error = %e, "Failed to ingest batch file");
                    report.failed_files += 1;
                }
            }
        }

        for (source, counts) in &report.per_source {
            info!(
                source = %source,
                files = counts.files,
                already_processed = counts.already_processed,
                items = counts.items,
                inserted = counts.inserted,
                invalid = counts.invalid,
                "Ingested source"
            );
        }
        Ok(report)
    }

    async fn ingest_file(
        &self,
        path: &Path,
        relative: &Path,
        source_type: SourceType,
        counts: &mut SourceCounts,
    ) -> Result<(), RefineryError> {
        let bytes = tokio::fs::read(path).await?;
        let sha = hex::encode(Sha256::digest(&bytes));
        if self.store.is_batch_processed(&sha).await? {
            counts.already_processed += 1;
            return Ok(());
        }

        let raw: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
            RefineryError::TransientIo(format!("{} is not valid JSON: {e}", relative.display()))
        })?;
        let relative_str = relative.to_string_lossy();
        let (items, ctx) = split_batch(&raw);
        let ctx = ctx
            .with_path(relative_str.as_ref())
            .with_ingested_at(Utc::now());

        let mut signals: Vec<Signal> = Vec::with_capacity(items.len());
        let mut invalid = 0;
        for item in &items {
            match normalize_with(item, source_type, &ctx) {
                Ok(signal) => signals.push(signal),
                Err(e) => {
                    debug!(path = %relative.display(), error = %e, "Dropping invalid record");
                    invalid += 1;
                }
            }
        }
        if invalid > 0 {
            warn!(path = %relative.display(), invalid, "Dropped invalid records");
        }

        let mut inserted = 0;
        for chunk in signals.chunks(self.chunk_size) {
            inserted += self.store.insert_batch(chunk).await?;
        }

        self.store
            .mark_batch_processed(&sha, &relative_str, source_type, items.len() as i64)
            .await?;

        counts.items += items.len();
        counts.invalid += invalid;
        counts.inserted += inserted;
        debug!(path = %relative.display(), items = items.len(), inserted, "Batch ingested");
        Ok(())
    }
}

/// Source type from the first path component under the inbox.
fn route(relative: &Path) -> Option<SourceType> {
    let first = relative.components().next()?;
    // A bare file at the inbox root has no source folder.
    if relative.components().count() < 2 {
        return None;
    }
    SourceType::from_folder(&first.as_os_str().to_string_lossy())
}

/// Every `*.json` under `root`, sorted for a stable scan order.
async fn collect_json_files(root: &Path) -> Result<Vec<PathBuf>, RefineryError> {
    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if dir == root => return Err(e.into()),
            Err(e) => {
                warn!(dir = %dir.display(), error = %e, "Cannot read inbox directory");
                continue;
            }
        };
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(path);
            } else if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
    }

    files.sort();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_by_first_folder() {
        assert_eq!(route(Path::new("twitter/2026/a.json")), Some(SourceType::Post));
        assert_eq!(route(Path::new("polymarket/sniper_1.json")), Some(SourceType::Market));
        assert_eq!(route(Path::new("github/trending.json")), Some(SourceType::Repository));
        assert_eq!(route(Path::new("papers/x.json")), Some(SourceType::Paper));
        assert_eq!(route(Path::new("misc/x.json")), None);
        assert_eq!(route(Path::new("loose.json")), None);
    }
}
