pub mod archive;
pub mod error;
pub mod git;
pub mod log;
pub mod period;
pub mod sync;

pub use archive::SignalArchive;
pub use error::{LedgerError, Result};
pub use git::{CommandGit, GitOutput, GitRunner};
pub use log::AppendLog;
pub use period::{Partitioner, PeriodKey};
pub use sync::{GitSync, SyncReport, SyncState};
