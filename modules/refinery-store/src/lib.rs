pub mod error;
pub mod memory;
pub mod postgres;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use postgres::PgSignalStore;
pub use traits::{ProcessedBatch, SignalQuery, SignalStore};
