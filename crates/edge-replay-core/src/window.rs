//! Replay window and its storage day prefixes
//!
//! Raw edge objects are stored under UTC day prefixes (`YYYYMMDD/...`) and
//! carry a last-modified time that can drift from the event times inside
//! them. The window is therefore widened by [`WINDOW_MARGIN_HOURS`] on both
//! sides whenever it is used to pick objects.

use chrono::{DateTime, NaiveDateTime, TimeDelta, TimeZone, Utc};
use chrono_tz::Tz;
use edge_replay_warehouse::sql::RowWindow;
use std::fmt;

use crate::error::{ReplayError, Result};

/// Input format of window bounds
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Zone window bounds are interpreted in unless configured otherwise
pub const DEFAULT_TIMEZONE: &str = "US/Pacific";

/// Skew allowance between object timestamps and event timestamps
pub const WINDOW_MARGIN_HOURS: i64 = 1;

fn margin() -> TimeDelta {
    TimeDelta::hours(WINDOW_MARGIN_HOURS)
}

/// Parse an IANA zone name
pub fn parse_timezone(name: &str) -> Result<Tz> {
    name.parse::<Tz>()
        .map_err(|e| ReplayError::config(format!("unknown timezone '{}': {}", name, e)))
}

/// Half-open `[start, end)` request in a local zone
///
/// Construction guarantees `start < end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayWindow {
    start: DateTime<Tz>,
    end: DateTime<Tz>,
}

impl ReplayWindow {
    /// Create a window, rejecting `end <= start`
    pub fn new(start: DateTime<Tz>, end: DateTime<Tz>) -> Result<Self> {
        if end <= start {
            return Err(ReplayError::InvalidRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self { start, end })
    }

    /// Parse two `YYYY-MM-DD HH:MM:SS` local timestamps in `tz`
    pub fn parse(start: &str, end: &str, tz: Tz) -> Result<Self> {
        Self::new(parse_local(start, tz)?, parse_local(end, tz)?)
    }

    /// Local start
    pub fn start(&self) -> DateTime<Tz> {
        self.start
    }

    /// Local end
    pub fn end(&self) -> DateTime<Tz> {
        self.end
    }

    /// Zone the window was expressed in
    pub fn timezone(&self) -> Tz {
        self.start.timezone()
    }

    /// Absolute start
    pub fn start_utc(&self) -> DateTime<Utc> {
        self.start.with_timezone(&Utc)
    }

    /// Absolute end
    pub fn end_utc(&self) -> DateTime<Utc> {
        self.end.with_timezone(&Utc)
    }

    /// UTC calendar days touched by `[start - margin, end + margin]`, as `YYYYMMDD`
    pub fn day_prefixes(&self) -> Vec<String> {
        let first = (self.start_utc() - margin()).date_naive();
        let last = (self.end_utc() + margin()).date_naive();
        first
            .iter_days()
            .take_while(|day| *day <= last)
            .map(|day| day.format("%Y%m%d").to_string())
            .collect()
    }

    /// Whether an object modified at `last_modified` may hold in-window events
    ///
    /// Accepts `start <= last_modified < end + margin`.
    pub fn admits_object(&self, last_modified: &DateTime<Utc>) -> bool {
        *last_modified >= self.start_utc() && *last_modified < self.end_utc() + margin()
    }

    /// Inclusive row predicate bounds for the warehouse reload
    pub fn row_window(&self) -> RowWindow {
        RowWindow::new(self.start.fixed_offset(), self.end.fixed_offset())
    }
}

impl fmt::Display for ReplayWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start, self.end)
    }
}

/// Interpret a naive local timestamp in `tz`
///
/// A fall-back hour resolves to its later, standard-time occurrence. A
/// spring-forward gap does not exist on the clock and is rejected.
pub fn parse_local(value: &str, tz: Tz) -> Result<DateTime<Tz>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), TIMESTAMP_FORMAT).map_err(|e| {
        ReplayError::InvalidTimestamp(format!(
            "'{}' does not match {}: {}",
            value, TIMESTAMP_FORMAT, e
        ))
    })?;

    match tz.from_local_datetime(&naive) {
        chrono::LocalResult::Single(ts) => Ok(ts),
        chrono::LocalResult::Ambiguous(_, later) => Ok(later),
        chrono::LocalResult::None => Err(ReplayError::InvalidTimestamp(format!(
            "'{}' does not exist in {}",
            value,
            tz.name()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pt() -> Tz {
        parse_timezone(DEFAULT_TIMEZONE).unwrap()
    }

    fn window(start: &str, end: &str) -> ReplayWindow {
        ReplayWindow::parse(start, end, pt()).unwrap()
    }

    #[test]
    fn test_rejects_empty_and_inverted_ranges() {
        let err = ReplayWindow::parse("2024-01-01 01:00:00", "2024-01-01 00:00:00", pt())
            .unwrap_err();
        assert!(matches!(err, ReplayError::InvalidRange { .. }));

        let err = ReplayWindow::parse("2024-01-01 01:00:00", "2024-01-01 01:00:00", pt())
            .unwrap_err();
        assert!(matches!(err, ReplayError::InvalidRange { .. }));
    }

    #[test]
    fn test_rejects_malformed_timestamp() {
        let err = ReplayWindow::parse("2024-01-01T00:00:00", "2024-01-01 01:00:00", pt())
            .unwrap_err();
        assert!(matches!(err, ReplayError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_single_day_prefix() {
        // 23:00 PST .. 02:00 PST is 07:00 .. 10:00 UTC on Jan 1
        let w = window("2024-01-01 00:00:00", "2024-01-01 01:00:00");
        assert_eq!(w.day_prefixes(), vec!["20240101"]);
    }

    #[test]
    fn test_margin_crosses_utc_midnight() {
        // end + 1h is 18:00 PST, which is 02:00 UTC on Jan 2
        let w = window("2024-01-01 15:00:00", "2024-01-01 17:00:00");
        assert_eq!(w.day_prefixes(), vec!["20240101", "20240102"]);
    }

    #[test]
    fn test_start_margin_reaches_previous_day() {
        let utc = parse_timezone("UTC").unwrap();
        let w = ReplayWindow::parse("2024-03-05 00:30:00", "2024-03-05 02:00:00", utc).unwrap();
        assert_eq!(w.day_prefixes(), vec!["20240304", "20240305"]);
    }

    #[test]
    fn test_multi_day_prefixes_have_no_gaps() {
        let w = window("2023-12-30 12:00:00", "2024-01-02 12:00:00");
        assert_eq!(
            w.day_prefixes(),
            vec!["20231230", "20231231", "20240101", "20240102"]
        );
    }

    #[test]
    fn test_admits_object_bounds() {
        let w = window("2024-01-01 00:00:00", "2024-01-01 01:00:00");
        let start = w.start_utc();
        let end = w.end_utc();

        assert!(w.admits_object(&start));
        assert!(!w.admits_object(&(start - TimeDelta::seconds(1))));
        assert!(w.admits_object(&(end + TimeDelta::minutes(59))));
        assert!(!w.admits_object(&(end + TimeDelta::hours(1))));
    }

    #[test]
    fn test_ambiguous_local_time_takes_standard_offset() {
        // 01:30 happens twice on 2024-11-03 in US/Pacific
        let ts = parse_local("2024-11-03 01:30:00", pt()).unwrap();
        assert_eq!(ts.fixed_offset().offset().local_minus_utc(), -8 * 3600);
    }

    #[test]
    fn test_nonexistent_local_time_rejected() {
        let err = parse_local("2024-03-10 02:30:00", pt()).unwrap_err();
        assert!(matches!(err, ReplayError::InvalidTimestamp(_)));
    }

    #[test]
    fn test_row_window_keeps_local_offset() {
        let w = window("2024-07-01 00:00:00", "2024-07-01 01:00:00");
        let rows = w.row_window();
        assert_eq!(rows.start.to_rfc3339(), "2024-07-01T00:00:00-07:00");
        assert_eq!(rows.end.to_rfc3339(), "2024-07-01T01:00:00-07:00");
    }

    #[test]
    fn test_unknown_timezone() {
        assert!(parse_timezone("Mars/Olympus").is_err());
    }
}
