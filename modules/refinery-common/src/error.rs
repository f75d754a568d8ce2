use thiserror::Error;

/// Failure taxonomy shared by every stage of a refinery run.
///
/// Only `Config` is fatal. Everything else is contained at the granularity
/// where it happened (record, file, evaluator call, sync attempt).
#[derive(Error, Debug)]
pub enum RefineryError {
    /// Empty or malformed canonical signal. Dropped, never retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Store, API, network or file failure. Retried on the next scheduled cycle.
    #[error("Transient I/O error: {0}")]
    TransientIo(String),

    /// Remote ledger rebase/push conflict.
    #[error("Sync conflict: {0}")]
    Conflict(String),

    /// Evaluator error or timeout for a single (signal, evaluator) pair.
    #[error("Evaluator {evaluator} failed: {reason}")]
    Evaluator { evaluator: String, reason: String },

    /// Missing credentials or invalid required configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl RefineryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<std::io::Error> for RefineryError {
    fn from(e: std::io::Error) -> Self {
        Self::TransientIo(e.to_string())
    }
}
