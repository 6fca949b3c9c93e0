//! Directory timestamp parsing

use std::fmt::Write;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::warn;

use crate::error::{DirectoryError, DirectoryResult};

/// Default wire format, e.g. `20240131235959.123Z`.
pub const DEFAULT_FORMAT: &str = "%Y%m%d%H%M%S%.3fZ";

/// Generalized time with an optional fraction.
const GENERALIZED_TIME: &str = "%Y%m%d%H%M%S%.fZ";

/// Generalized time with an explicit offset.
const GENERALIZED_TIME_OFFSET: &str = "%Y%m%d%H%M%S%.f%z";

/// 1900-01-01T00:00:00Z, returned for absent or unparsable timestamps.
pub fn sentinel_timestamp() -> DateTime<Utc> {
    DateTime::from_timestamp(-2_208_988_800, 0).unwrap_or_default()
}

/// Check that `format` contains only known `chrono` specifiers.
pub fn is_valid_format(format: &str) -> bool {
    !StrftimeItems::new(format).any(|item| matches!(item, Item::Error))
}

/// Parse a directory timestamp with `format`, falling back to plain
/// generalized time. Never fails.
pub fn parse_timestamp(value: Option<&str>, format: &str) -> DateTime<Utc> {
    let Some(value) = value.map(str::trim).filter(|v| !v.is_empty()) else {
        return sentinel_timestamp();
    };

    match try_parse(value, format) {
        Some(timestamp) => timestamp,
        None => {
            warn!(value, format, "Unparsable directory timestamp");
            sentinel_timestamp()
        }
    }
}

fn try_parse(value: &str, format: &str) -> Option<DateTime<Utc>> {
    [format, GENERALIZED_TIME]
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(value, f).ok())
        .map(|naive| naive.and_utc())
        .or_else(|| {
            DateTime::parse_from_str(value, GENERALIZED_TIME_OFFSET)
                .ok()
                .map(|ts| ts.with_timezone(&Utc))
        })
}

/// Render a timestamp in `format`.
pub fn format_timestamp(timestamp: &DateTime<Utc>, format: &str) -> DirectoryResult<String> {
    if !is_valid_format(format) {
        return Err(DirectoryError::invalid_configuration(format!(
            "invalid timestamp format '{format}'"
        )));
    }
    let mut out = String::new();
    write!(out, "{}", timestamp.format(format)).map_err(|_| {
        DirectoryError::invalid_configuration(format!("cannot render timestamp with '{format}'"))
    })?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn test_parse_default_format() {
        let ts = parse_timestamp(Some("20240131235959.123Z"), DEFAULT_FORMAT);
        assert_eq!(ts.year(), 2024);
        assert_eq!(ts.month(), 1);
        assert_eq!(ts.day(), 31);
        assert_eq!(ts.hour(), 23);
        assert_eq!(ts.timestamp_subsec_millis(), 123);
    }

    #[test]
    fn test_parse_generalized_time_without_fraction() {
        let ts = parse_timestamp(Some("20240131120000Z"), DEFAULT_FORMAT);
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 31, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_parse_with_offset() {
        let ts = parse_timestamp(Some("20240131120000+0100"), DEFAULT_FORMAT);
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 31, 11, 0, 0).unwrap());
    }

    #[test]
    fn test_absent_and_unparsable_resolve_to_sentinel() {
        let sentinel = Utc.with_ymd_and_hms(1900, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(sentinel_timestamp(), sentinel);
        assert_eq!(parse_timestamp(None, DEFAULT_FORMAT), sentinel);
        assert_eq!(parse_timestamp(Some(""), DEFAULT_FORMAT), sentinel);
        assert_eq!(parse_timestamp(Some("yesterday"), DEFAULT_FORMAT), sentinel);
    }

    #[test]
    fn test_custom_format() {
        let ts = parse_timestamp(Some("2024-01-31 08:30:00"), "%Y-%m-%d %H:%M:%S");
        assert_eq!(ts, Utc.with_ymd_and_hms(2024, 1, 31, 8, 30, 0).unwrap());
    }

    #[test]
    fn test_format_round_trip() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 31, 8, 30, 0).unwrap();
        let rendered = format_timestamp(&ts, DEFAULT_FORMAT).unwrap();
        assert_eq!(rendered, "20240131083000.000Z");
        assert_eq!(parse_timestamp(Some(&rendered), DEFAULT_FORMAT), ts);
    }

    #[test]
    fn test_invalid_format_is_rejected() {
        assert!(!is_valid_format("%Q"));
        assert!(is_valid_format(DEFAULT_FORMAT));
        let ts = Utc.with_ymd_and_hms(2024, 1, 31, 8, 30, 0).unwrap();
        assert!(format_timestamp(&ts, "%Q").is_err());
    }
}
