//! Timestamp helpers shared by records, backups and the query interpreter.
//!
//! Datetimes are stored as `YYYY-MM-DDTHH:MM:SS.ffffff` text so that lexical
//! and chronological order agree; dates are stored as `YYYY-MM-DD`.

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// Parse an ISO 8601 date (`YYYY-MM-DD`).
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).ok()
}

/// Parse an ISO 8601 datetime with optional fractional seconds and trailing `Z`.
pub fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    let trimmed = trimmed.strip_suffix('Z').unwrap_or(trimmed);
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn format_datetime(datetime: NaiveDateTime) -> String {
    datetime.format(DATETIME_FORMAT).to_string()
}

/// The current time in storage format.
pub fn now() -> String {
    format_datetime(Utc::now().naive_utc())
}

/// A modification timestamp strictly greater than `previous`.
///
/// Two mutations inside the same microsecond would otherwise share a value.
pub fn next_modified(previous: &str) -> String {
    let current = Utc::now().naive_utc();
    match parse_datetime(previous) {
        Some(prev) if prev >= current => format_datetime(prev + Duration::microseconds(1)),
        _ => format_datetime(current),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_date() {
        assert!(parse_date("2012-03-01").is_some());
        assert!(parse_date("2012-13-01").is_none());
        assert!(parse_date("01/03/2012").is_none());
        assert!(parse_date("").is_none());
    }

    #[test]
    fn test_parse_datetime_variants() {
        assert!(parse_datetime("2012-03-01T10:20:30").is_some());
        assert!(parse_datetime("2012-03-01T10:20:30.123456").is_some());
        assert!(parse_datetime("2012-03-01T10:20:30Z").is_some());
        assert!(parse_datetime("2012-03-01").is_none());
        assert!(parse_datetime("yesterday").is_none());
    }

    #[test]
    fn test_storage_format_round_trips() {
        let parsed = parse_datetime("2012-03-01T10:20:30.5").unwrap();
        assert_eq!(format_datetime(parsed), "2012-03-01T10:20:30.500000");
    }

    #[test]
    fn test_next_modified_is_strictly_increasing() {
        let far_future = "2999-01-01T00:00:00.000000";
        assert_eq!(next_modified(far_future), "2999-01-01T00:00:00.000001");

        let past = "2000-01-01T00:00:00.000000";
        assert!(next_modified(past).as_str() > past);
    }
}
