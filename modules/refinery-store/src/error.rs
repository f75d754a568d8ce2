use refinery_common::RefineryError;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    /// A stored row no longer maps onto a [`Signal`](refinery_common::Signal).
    #[error("Corrupt row {fingerprint}: {reason}")]
    Corrupt { fingerprint: String, reason: String },
}

impl From<StoreError> for RefineryError {
    fn from(e: StoreError) -> Self {
        RefineryError::TransientIo(e.to_string())
    }
}
