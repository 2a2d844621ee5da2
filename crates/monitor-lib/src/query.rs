//! Query filters shared by the collector, detector and optimizer

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use tracing::warn;

use crate::error::FilterParseError;

/// Inclusive time window; an unset bound is a wildcard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    pub fn since(start: DateTime<Utc>) -> Self {
        Self {
            start: Some(start),
            end: None,
        }
    }

    /// Everything from `span` before `now` onwards
    pub fn trailing(now: DateTime<Utc>, span: Duration) -> Self {
        Self::since(cutoff(now, span))
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| ts >= s) && self.end.map_or(true, |e| ts <= e)
    }

    /// Parse externally supplied bounds; a malformed bound is logged and dropped
    pub fn parse_lenient(start: Option<&str>, end: Option<&str>) -> Self {
        Self {
            start: parse_bound("start_time", start),
            end: parse_bound("end_time", end),
        }
    }
}

/// `now - span`, saturating at the earliest representable instant
pub fn cutoff(now: DateTime<Utc>, span: Duration) -> DateTime<Utc> {
    now.checked_sub_signed(span)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Parse an ISO-8601 timestamp. Offsets are honoured; naive values are UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, FilterParseError> {
    let trimmed = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(ts.with_timezone(&Utc));
    }

    const NAIVE_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            chrono::NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|naive| naive.and_utc())
        .ok_or_else(|| FilterParseError::InvalidTimestamp(raw.to_string()))
}

fn parse_bound(name: &str, raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw.filter(|r| !r.trim().is_empty())?;
    match parse_timestamp(raw) {
        Ok(ts) => Some(ts),
        Err(e) => {
            warn!(bound = name, error = %e, "Ignoring invalid time filter");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_parse_rfc3339_with_offset() {
        let ts = parse_timestamp("2024-03-01T12:00:00+02:00").unwrap();
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_naive_as_utc() {
        let ts = parse_timestamp("2024-03-01T12:30:15.250").unwrap();
        assert_eq!(ts.timestamp(), Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 15).unwrap().timestamp());
        assert!(parse_timestamp("2024-03-01").is_ok());
    }

    #[test]
    fn test_malformed_bound_becomes_unset() {
        let range = TimeRange::parse_lenient(Some("yesterday"), Some("2024-03-01T00:00:00Z"));
        assert_eq!(range.start, None);
        assert!(range.end.is_some());
    }

    #[test]
    fn test_contains_is_inclusive() {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        let range = TimeRange::new(Some(t0), Some(t1));
        assert!(range.contains(t0));
        assert!(range.contains(t1));
        assert!(!range.contains(t1 + chrono::Duration::seconds(1)));
        assert!(TimeRange::default().contains(t0));
    }

    #[test]
    fn test_cutoff_saturates_on_huge_span() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let huge = chrono::Duration::seconds(i64::MAX / 1000);
        assert_eq!(cutoff(now, huge), DateTime::<Utc>::MIN_UTC);
        assert!(TimeRange::trailing(now, huge).contains(now));
        assert_eq!(
            cutoff(now, chrono::Duration::hours(1)),
            now - chrono::Duration::hours(1)
        );
    }
}
