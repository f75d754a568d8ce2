pub mod config;
pub mod error;
pub mod file_config;
pub mod fingerprint;
pub mod ingest;
pub mod memory;
pub mod sources;
pub mod types;

pub use config::Secrets;
pub use error::RefineryError;
pub use file_config::{
    load_config, AdmissionConfig, AuditConfig, EvaluatorConfig, FileConfig, FreshnessConfig,
    IngestConfig, LedgerConfig, MarketBoosts, PaperBoosts, PeriodGranularity, PostBoosts, Provider,
    RepositoryBoosts, RetentionConfig,
};
pub use fingerprint::Fingerprint;
pub use ingest::{normalize, normalize_with, split_batch, BatchContext, MIN_CANONICAL_CHARS};
pub use memory::{LedgerMemory, SeenSet, TopicMemory};
pub use types::*;
