//! Calendar partitioning of ledger segments in a fixed UTC offset.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, Utc};
use refinery_common::PeriodGranularity;

use crate::error::{LedgerError, Result};

/// One calendar period: a day or a month in the ledger's local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeriodKey {
    date: NaiveDate,
    granularity: PeriodGranularity,
}

impl PeriodKey {
    /// Segment path relative to the segment directory.
    ///
    /// Daily: `YYYY/MM/YYYY-MM-DD.jsonl`. Monthly: `YYYY/YYYY-MM.jsonl`.
    pub fn relative_path(&self) -> PathBuf {
        let year = format!("{:04}", self.date.year());
        match self.granularity {
            PeriodGranularity::Daily => PathBuf::from(year)
                .join(format!("{:02}", self.date.month()))
                .join(format!("{self}.jsonl")),
            PeriodGranularity::Monthly => PathBuf::from(year).join(format!("{self}.jsonl")),
        }
    }
}

impl fmt::Display for PeriodKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.granularity {
            PeriodGranularity::Daily => write!(f, "{}", self.date.format("%Y-%m-%d")),
            PeriodGranularity::Monthly => write!(f, "{}", self.date.format("%Y-%m")),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Partitioner {
    offset: FixedOffset,
    granularity: PeriodGranularity,
}

impl Partitioner {
    pub fn new(granularity: PeriodGranularity, utc_offset_hours: i32) -> Result<Self> {
        if utc_offset_hours.abs() > 14 {
            return Err(LedgerError::InvalidOffset(utc_offset_hours));
        }
        let offset = FixedOffset::east_opt(utc_offset_hours * 3600)
            .ok_or(LedgerError::InvalidOffset(utc_offset_hours))?;
        Ok(Self {
            offset,
            granularity,
        })
    }

    pub fn key_for(&self, at: DateTime<Utc>) -> PeriodKey {
        let local = at.with_timezone(&self.offset).date_naive();
        let date = match self.granularity {
            PeriodGranularity::Daily => local,
            PeriodGranularity::Monthly => local.with_day(1).unwrap_or(local),
        };
        PeriodKey {
            date,
            granularity: self.granularity,
        }
    }
}
