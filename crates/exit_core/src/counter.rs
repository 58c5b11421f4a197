//! crates/exit_core/src/counter.rs
//!
//! Day counting for the no-contact streak and the rules for picking which
//! stored start instant wins.

use crate::domain::StartSource;
use chrono::{DateTime, SecondsFormat, Utc};

pub const MS_PER_DAY: i64 = 86_400_000;

/// How often a live counter should be recomputed.
pub const REFRESH_INTERVAL_SECS: u64 = 60;

/// Whole days between `start` and `now`.
///
/// Uses the absolute difference, so a start instant in the future (clock
/// rollback, skewed device) yields a positive count instead of failing.
pub fn elapsed_days(start: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    (now - start).num_milliseconds().abs() / MS_PER_DAY
}

/// The outcome of start-instant resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedStart {
    pub start: DateTime<Utc>,
    pub source: StartSource,
}

/// Picks the remote record first, then the device record, then `now`.
pub fn resolve_start(
    remote: Option<DateTime<Utc>>,
    local: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> ResolvedStart {
    match (remote, local) {
        (Some(start), _) => ResolvedStart {
            start,
            source: StartSource::Remote,
        },
        (None, Some(start)) => ResolvedStart {
            start,
            source: StartSource::Local,
        },
        (None, None) => ResolvedStart {
            start: now,
            source: StartSource::Fresh,
        },
    }
}

/// Parses a device-stored start date. Anything unparseable counts as missing.
pub fn parse_local_start(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw.trim())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Formats a start date the way devices store it (`2024-01-31T09:15:00.000Z`).
pub fn format_local_start(start: DateTime<Utc>) -> String {
    start.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 14, 12, 0, 0).unwrap()
    }

    #[test]
    fn day_boundaries() {
        let now = now();
        assert_eq!(elapsed_days(now, now), 0);
        assert_eq!(elapsed_days(now - Duration::milliseconds(86_399_999), now), 0);
        assert_eq!(elapsed_days(now - Duration::milliseconds(86_400_001), now), 1);
        assert_eq!(elapsed_days(now - Duration::days(45), now), 45);
    }

    #[test]
    fn future_start_counts_magnitude() {
        let now = now();
        assert_eq!(elapsed_days(now + Duration::days(3), now), 3);
    }

    #[test]
    fn remote_wins_over_local() {
        let now = now();
        let remote = now - Duration::days(10);
        let local = now - Duration::days(2);

        let resolved = resolve_start(Some(remote), Some(local), now);
        assert_eq!(resolved.start, remote);
        assert_eq!(resolved.source, StartSource::Remote);

        let resolved = resolve_start(None, Some(local), now);
        assert_eq!(resolved.start, local);
        assert_eq!(resolved.source, StartSource::Local);

        let resolved = resolve_start(None, None, now);
        assert_eq!(resolved.start, now);
        assert_eq!(resolved.source, StartSource::Fresh);
    }

    #[test]
    fn local_format_matches_device_storage() {
        let formatted = format_local_start(now());
        assert_eq!(formatted, "2025-03-14T12:00:00.000Z");
        assert_eq!(parse_local_start(&formatted), Some(now()));
        assert_eq!(parse_local_start("not a date"), None);
    }
}
