//! Time handling for raw records.
//!
//! Collectors stamp their records with ISO-8601 strings in whatever form the
//! underlying library hands back: with or without an offset, with a trailing
//! `Z`, with a `T` or a space between date and time. Everything downstream of
//! the normalizer works in epoch milliseconds, UTC.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::error;
use std::fmt;
use std::time::{Duration, Instant};

const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
];

const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Failure to turn a timestamp string into epoch milliseconds.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseError {
    /// The string matched none of the accepted ISO-8601 layouts.
    Unrecognized(String),
    /// The string parsed but lies before the epoch.
    BeforeEpoch(String),
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ParseError::Unrecognized(ref s) => {
                write!(f, "unrecognized ISO-8601 timestamp {:?}", s)
            }
            ParseError::BeforeEpoch(ref s) => {
                write!(f, "timestamp {:?} lies before the epoch", s)
            }
        }
    }
}

impl error::Error for ParseError {}

fn naive_utc(s: &str) -> Option<NaiveDateTime> {
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn parse_utc(s: &str) -> Option<DateTime<Utc>> {
    if let Some(stripped) = s.strip_suffix('Z').or_else(|| s.strip_suffix('z')) {
        return naive_utc(stripped).map(|n| Utc.from_utc_datetime(&n));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(s, fmt) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    naive_utc(s).map(|n| Utc.from_utc_datetime(&n))
}

/// Parse an ISO-8601 timestamp into epoch milliseconds, UTC.
///
/// A string with no offset is taken to already be UTC. A string with an
/// offset is converted to UTC. Sub-millisecond precision is truncated.
/// Timestamps before the epoch are rejected, samples carry non-negative
/// times only.
pub fn parse_timestamp_ms(raw: &str) -> Result<i64, ParseError> {
    let s = raw.trim();
    match parse_utc(s) {
        Some(dt) => {
            let ms = dt.timestamp_millis();
            if ms < 0 {
                Err(ParseError::BeforeEpoch(raw.to_string()))
            } else {
                Ok(ms)
            }
        }
        None => Err(ParseError::Unrecognized(raw.to_string())),
    }
}

/// Time left until `deadline`, zero if it has passed.
pub fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}
