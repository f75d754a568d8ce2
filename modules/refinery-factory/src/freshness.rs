use chrono::{DateTime, Utc};
use refinery_common::{FreshnessConfig, RefineryError, SourceType};
use refinery_store::SignalStore;
use serde::Serialize;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Freshness {
    Fresh,
    /// Lagging but still usable.
    Stale,
    /// Too old to report on.
    Skipped,
    /// No data at all.
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceFreshness {
    pub source_type: SourceType,
    pub status: Freshness,
    pub last_seen: Option<DateTime<Utc>>,
    pub minutes_ago: Option<i64>,
}

pub fn classify(
    last_seen: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    config: &FreshnessConfig,
) -> (Freshness, Option<i64>) {
    let Some(last) = last_seen else {
        return (Freshness::Empty, None);
    };
    let minutes = (now - last).num_minutes().max(0);
    let status = if minutes <= config.fresh_minutes {
        Freshness::Fresh
    } else if minutes <= config.skip_minutes {
        Freshness::Stale
    } else {
        Freshness::Skipped
    };
    (status, Some(minutes))
}

/// Staleness of every source type, from the newest stored signal of each.
pub async fn freshness_report(
    store: &dyn SignalStore,
    config: &FreshnessConfig,
    now: DateTime<Utc>,
) -> Result<Vec<SourceFreshness>, RefineryError> {
    let mut report = Vec::with_capacity(SourceType::ALL.len());
    for source_type in SourceType::ALL {
        let last_seen = store.latest_timestamp(source_type).await?;
        let (status, minutes_ago) = classify(last_seen, now, config);
        match status {
            Freshness::Fresh => info!(source = %source_type, minutes_ago, "Source fresh"),
            Freshness::Stale => warn!(source = %source_type, minutes_ago, "Source lagging"),
            Freshness::Skipped => warn!(source = %source_type, minutes_ago, "Source too old, skipped"),
            Freshness::Empty => warn!(source = %source_type, "Source has no data"),
        }
        report.push(SourceFreshness {
            source_type,
            status,
            last_seen,
            minutes_ago,
        });
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn thresholds_are_inclusive() {
        let now = Utc::now();
        let config = FreshnessConfig::default();
        let at = |m: i64| classify(Some(now - Duration::minutes(m)), now, &config).0;

        assert_eq!(at(0), Freshness::Fresh);
        assert_eq!(at(65), Freshness::Fresh);
        assert_eq!(at(66), Freshness::Stale);
        assert_eq!(at(720), Freshness::Stale);
        assert_eq!(at(721), Freshness::Skipped);
        assert_eq!(classify(None, now, &config), (Freshness::Empty, None));
    }

    #[test]
    fn future_timestamps_count_as_fresh() {
        let now = Utc::now();
        let (status, minutes) =
            classify(Some(now + Duration::minutes(10)), now, &FreshnessConfig::default());
        assert_eq!(status, Freshness::Fresh);
        assert_eq!(minutes, Some(0));
    }
}
