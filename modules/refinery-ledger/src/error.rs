use refinery_common::RefineryError;

pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Ledger I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Invalid UTC offset: {0}h")]
    InvalidOffset(i32),

    #[error("git {command} failed: {message}")]
    Git { command: String, message: String },
}

impl From<LedgerError> for RefineryError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InvalidOffset(_) => RefineryError::Config(e.to_string()),
            other => RefineryError::TransientIo(other.to_string()),
        }
    }
}
