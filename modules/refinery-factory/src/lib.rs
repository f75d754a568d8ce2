//! Wiring for the `refinery` binary: inbox ingestion, the audit cycle,
//! freshness and retention.

pub mod cycle;
pub mod freshness;
pub mod harvest;
pub mod inbox;
pub mod sink;

pub use cycle::{Cycle, CycleReport};
pub use freshness::{freshness_report, Freshness, SourceFreshness};
pub use harvest::{HarvestReport, Harvester};
pub use inbox::{IngestReport, Ingestor, SourceCounts};
pub use sink::LedgerSink;
