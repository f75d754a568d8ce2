//! Pushing ledger segments to the shared remote.
//!
//! Sync is a small state machine. Pulls run with `--autostash`, so segment
//! lines appended since the last commit ride along the rebase. A rebase
//! conflict ends the attempt in `Failed` after aborting the rebase, leaving any
//! local commit for the next sync to push. Nothing here returns an error: local append is
//! the source of truth and sync only publishes it.
//!
//! Segments are append-only JSONL, so concurrent runs appending to the same
//! segment are merged line-wise with git's `union` driver.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use refinery_common::{LedgerConfig, RefineryError};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::git::{CommandGit, GitOutput, GitRunner};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Clean,
    /// Leftover rebase directory or index lock from an interrupted run.
    StaleLock,
    Rebasing,
    Committed,
    Pushed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    pub final_state: SyncState,
    pub committed: bool,
    pub pushed: bool,
    /// States entered, in order.
    pub transitions: Vec<SyncState>,
}

impl Default for SyncReport {
    fn default() -> Self {
        Self {
            final_state: SyncState::Clean,
            committed: false,
            pushed: false,
            transitions: Vec::new(),
        }
    }
}

impl SyncReport {
    fn enter(&mut self, state: SyncState) {
        self.final_state = state;
        self.transitions.push(state);
    }

    /// Remote holds everything committed locally.
    pub fn is_synced(&self) -> bool {
        matches!(self.final_state, SyncState::Pushed | SyncState::Clean)
    }
}

pub struct GitSync {
    runner: Arc<dyn GitRunner>,
    repo: PathBuf,
    remote: String,
    branch: String,
    pathspecs: Vec<String>,
}

const UNION_MERGE: &str = "*.jsonl merge=union";

impl GitSync {
    pub fn new(runner: Arc<dyn GitRunner>, repo: impl Into<PathBuf>) -> Self {
        Self {
            runner,
            repo: repo.into(),
            remote: "origin".to_string(),
            branch: "main".to_string(),
            pathspecs: vec![".".to_string()],
        }
    }

    pub fn from_config(config: &LedgerConfig) -> Self {
        let runner = CommandGit::new(&config.root, Duration::from_secs(config.git_timeout_secs));
        Self::new(Arc::new(runner), &config.root)
            .with_remote(&config.remote, &config.branch)
            .with_pathspecs([config.segment_dir.clone(), config.archive_dir.clone()])
    }

    pub fn with_remote(mut self, remote: impl Into<String>, branch: impl Into<String>) -> Self {
        self.remote = remote.into();
        self.branch = branch.into();
        self
    }

    /// Paths staged on each sync, relative to the repository root. Paths that
    /// do not exist yet are skipped.
    pub fn with_pathspecs<I, S>(mut self, pathspecs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pathspecs = pathspecs.into_iter().map(Into::into).collect();
        self
    }

    pub fn repo(&self) -> &Path {
        &self.repo
    }

    /// Clear what an interrupted run left behind. Call once at startup.
    pub async fn heal(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        let git_dir = self.repo.join(".git");
        self.ensure_union_merge().await?;

        let mut rebase_dirs = Vec::new();
        for name in ["rebase-merge", "rebase-apply"] {
            let dir = git_dir.join(name);
            if tokio::fs::try_exists(&dir).await? {
                rebase_dirs.push(dir);
            }
        }
        let index_lock = git_dir.join("index.lock");
        let locked = tokio::fs::try_exists(&index_lock).await?;

        if rebase_dirs.is_empty() && !locked {
            return Ok(report);
        }
        report.enter(SyncState::StaleLock);
        warn!(
            repo = %self.repo.display(),
            rebase_in_progress = !rebase_dirs.is_empty(),
            index_locked = locked,
            "Stale git state found, healing"
        );

        if locked {
            tokio::fs::remove_file(&index_lock).await?;
        }

        if !rebase_dirs.is_empty() {
            let aborted = matches!(self.step(&["rebase", "--abort"]).await, Some(o) if o.success());
            if !aborted {
                warn!(repo = %self.repo.display(), "rebase --abort failed, removing rebase state directly");
            }
            for dir in &rebase_dirs {
                if tokio::fs::try_exists(dir).await? {
                    tokio::fs::remove_dir_all(dir).await?;
                }
            }
        }

        report.enter(SyncState::Clean);
        info!(repo = %self.repo.display(), "Ledger repository healed");
        Ok(report)
    }

    /// Rebase onto the remote, commit new segment lines, rebase again, push.
    ///
    /// Both pulls autostash, so uncommitted appends never block the rebase.
    pub async fn sync(&self, message: &str) -> SyncReport {
        let mut report = SyncReport::default();
        if let Err(e) = self.ensure_union_merge().await {
            warn!(error = %e, "Could not install union merge for segments");
        }

        // Staged, a new segment is autostashed too, so a remote copy of the
        // same file can be checked out over it.
        let paths = self.existing_pathspecs().await;
        if !self.stage(&paths).await {
            report.enter(SyncState::Failed);
            return report;
        }

        report.enter(SyncState::Rebasing);
        if !self.pull_rebase().await {
            report.enter(SyncState::Failed);
            return report;
        }
        report.enter(SyncState::Clean);

        if !paths.is_empty() {
            if !self.stage(&paths).await {
                report.enter(SyncState::Failed);
                return report;
            }
            match self.step(&["diff", "--cached", "--quiet"]).await {
                Some(o) if o.code == Some(0) => {}
                Some(o) if o.code == Some(1) => match self.step(&["commit", "-m", message]).await {
                    Some(o) if o.success() => {
                        report.committed = true;
                        report.enter(SyncState::Committed);
                    }
                    other => {
                        warn!(stderr = stderr_of(&other), "git commit failed");
                        report.enter(SyncState::Failed);
                        return report;
                    }
                },
                other => {
                    warn!(stderr = stderr_of(&other), "git diff --cached failed");
                    report.enter(SyncState::Failed);
                    return report;
                }
            }
        }

        if !report.committed && !self.is_ahead().await {
            info!("Ledger already in sync, nothing to commit");
            return report;
        }

        report.enter(SyncState::Rebasing);
        if !self.pull_rebase().await {
            report.enter(SyncState::Failed);
            return report;
        }

        let refspec = format!("HEAD:{}", self.branch);
        match self
            .step(&["push", self.remote.as_str(), refspec.as_str()])
            .await
        {
            Some(o) if o.success() => {
                report.pushed = true;
                report.enter(SyncState::Pushed);
                info!(committed = report.committed, "Ledger pushed");
            }
            other => {
                let conflict = RefineryError::Conflict(format!("push rejected: {}", stderr_of(&other)));
                warn!(error = %conflict, "git push failed, will retry on next sync");
                report.enter(SyncState::Failed);
            }
        }
        report
    }

    /// `pull --rebase`; on failure the rebase is aborted so the tree stays usable.
    /// A remote branch that does not exist yet has nothing to rebase onto.
    async fn pull_rebase(&self) -> bool {
        let pull = self
            .step(&[
                "pull",
                "--rebase",
                "--autostash",
                self.remote.as_str(),
                self.branch.as_str(),
            ])
            .await;
        match pull {
            Some(o) if o.success() => true,
            Some(o) if o.stderr.contains("couldn't find remote ref") => {
                info!(branch = %self.branch, "Remote branch missing, pushing it fresh");
                true
            }
            other => {
                let conflict = RefineryError::Conflict(format!("pull --rebase: {}", stderr_of(&other)));
                warn!(error = %conflict, "Rebase onto remote failed, aborting");
                if let Some(abort) = self.step(&["rebase", "--abort"]).await {
                    if !abort.success() {
                        warn!(stderr = abort.stderr.trim(), "git rebase --abort failed");
                    }
                }
                false
            }
        }
    }

    async fn stage(&self, paths: &[String]) -> bool {
        if paths.is_empty() {
            return true;
        }
        let mut add = vec!["add", "--"];
        add.extend(paths.iter().map(String::as_str));
        match self.step(&add).await {
            Some(o) if o.success() => true,
            other => {
                warn!(stderr = stderr_of(&other), "git add failed");
                false
            }
        }
    }

    /// Local commits not yet on the remote branch, left by an earlier failed push.
    async fn is_ahead(&self) -> bool {
        let range = format!("{}/{}..HEAD", self.remote, self.branch);
        match self.step(&["rev-list", "--count", range.as_str()]).await {
            Some(o) if o.success() => o.stdout.trim().parse::<u64>().is_ok_and(|n| n > 0),
            _ => false,
        }
    }

    async fn existing_pathspecs(&self) -> Vec<String> {
        let mut existing = Vec::new();
        for path in &self.pathspecs {
            if tokio::fs::try_exists(self.repo.join(path)).await.unwrap_or(false) {
                existing.push(path.clone());
            }
        }
        existing
    }

    /// Register the `union` merge driver for segments in `.git/info/attributes`.
    /// Local to the clone, so nothing extra is committed.
    async fn ensure_union_merge(&self) -> Result<()> {
        let git_dir = self.repo.join(".git");
        if !tokio::fs::try_exists(&git_dir).await? {
            return Ok(());
        }
        let info_dir = git_dir.join("info");
        let attributes = info_dir.join("attributes");
        let current = match tokio::fs::read_to_string(&attributes).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(e) => return Err(e.into()),
        };
        if current.lines().any(|l| l.trim() == UNION_MERGE) {
            return Ok(());
        }

        tokio::fs::create_dir_all(&info_dir).await?;
        let mut updated = current;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(UNION_MERGE);
        updated.push('\n');
        tokio::fs::write(&attributes, updated).await?;
        debug!(repo = %self.repo.display(), "Installed union merge for segments");
        Ok(())
    }

    /// Run one git step. `None` when git itself could not be run.
    async fn step(&self, args: &[&str]) -> Option<GitOutput> {
        match self.runner.run(args).await {
            Ok(output) => Some(output),
            Err(e) => {
                warn!(command = %args.join(" "), error = %e, "git step could not run");
                None
            }
        }
    }
}

fn stderr_of(output: &Option<GitOutput>) -> &str {
    output.as_ref().map(|o| o.stderr.trim()).unwrap_or("")
}
