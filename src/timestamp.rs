use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::error::TimestampError;

/// Middleware export formats, tried in order before the ISO-8601 fallback.
pub const TIME_FORMATS: [&str; 2] = ["%d/%m/%Y %H:%M", "%Y-%m-%d %H:%M"];

const ISO_DATETIME_FORMATS: [&str; 3] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

pub fn parse_timestamp(value: &str) -> Result<NaiveDateTime, TimestampError> {
    let trimmed = value.trim();

    TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(trimmed, format).ok())
        .or_else(|| parse_iso8601(trimmed))
        .ok_or_else(|| TimestampError(value.to_string()))
}

fn parse_iso8601(value: &str) -> Option<NaiveDateTime> {
    if let Some(parsed) = ISO_DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
    {
        return Some(parsed);
    }

    // Offsets are folded into UTC; the rest of the batch is zone-less wall time.
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.naive_utc());
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}
