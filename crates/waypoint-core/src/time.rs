//! Timestamp helpers.
//!
//! Event timestamps are UTC RFC 3339 strings with millisecond precision and a
//! `Z` suffix, so lexicographic order equals chronological order.

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, Utc};

/// Format a UTC instant the way events store it.
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Current time as an event timestamp.
pub fn now_timestamp() -> String {
    format_timestamp(Utc::now())
}

/// Parse an ISO 8601 timestamp, with or without fractional seconds.
///
/// Accepts an explicit offset (`Z`, `+02:00`) or none at all, in which case
/// the value is taken as UTC. Returns `None` for anything else.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Identifier of the device's local time zone.
///
/// Uses `TZ` when set, otherwise the current UTC offset (e.g. `+02:00`).
pub fn local_timezone() -> String {
    match std::env::var("TZ") {
        Ok(tz) if !tz.trim().is_empty() => tz,
        _ => Local::now().format("%:z").to_string(),
    }
}
