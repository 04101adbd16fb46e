//! Capture timestamps.
//!
//! Captures are indexed by 14-digit `YYYYMMDDHHMMSS` strings in UTC. Targets
//! supplied by callers may also use ISO-8601 with optional fractional seconds
//! and a trailing `Z`.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

const COMPACT_LEN: usize = 14;
const ISO_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M:%SZ"];

/// Timestamp parsing failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error("expected 14 digits (YYYYMMDDHHMMSS), got {0:?}")]
    NotCompact(String),

    #[error("{0:?} is not a valid calendar instant")]
    OutOfRange(String),

    #[error("unrecognised timestamp {0:?}: expected YYYYMMDDHHMMSS or YYYY-MM-DDTHH:MM:SS[.f]Z")]
    Unrecognised(String),
}

impl From<TimestampError> for Error {
    fn from(err: TimestampError) -> Self {
        Error::InvalidTimestamp(err.to_string())
    }
}

/// A validated 14-digit capture timestamp.
///
/// Ordering follows the instant, which is also the lexical order of the
/// digit form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    /// Parse a strict 14-digit timestamp.
    pub fn parse(s: &str) -> Result<Self, TimestampError> {
        parse_compact(s.trim()).map(Self)
    }

    /// Truncate an instant to whole seconds.
    pub fn from_naive(instant: NaiveDateTime) -> Self {
        Self(instant.with_nanosecond(0).unwrap_or(instant))
    }

    pub fn now() -> Self {
        Self::from_naive(Utc::now().naive_utc())
    }

    pub fn naive(&self) -> NaiveDateTime {
        self.0
    }

    pub fn to_utc(&self) -> DateTime<Utc> {
        self.0.and_utc()
    }

    /// The 14 digits.
    pub fn digits(&self) -> String {
        self.0.format("%Y%m%d%H%M%S").to_string()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.digits())
    }
}

impl FromStr for Timestamp {
    type Err = TimestampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Timestamp {
    type Error = TimestampError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Timestamp> for String {
    fn from(ts: Timestamp) -> Self {
        ts.digits()
    }
}

/// Parse a caller-supplied target in either compact or ISO-8601 form.
pub fn parse_target(s: &str) -> Result<NaiveDateTime, TimestampError> {
    let s = s.trim();
    if is_compact(s) {
        return parse_compact(s);
    }

    ISO_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| TimestampError::Unrecognised(s.to_string()))
}

fn is_compact(s: &str) -> bool {
    s.len() == COMPACT_LEN && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_compact(s: &str) -> Result<NaiveDateTime, TimestampError> {
    if !is_compact(s) {
        return Err(TimestampError::NotCompact(s.to_string()));
    }

    let digits: Vec<u32> = s.bytes().map(|b| u32::from(b - b'0')).collect();
    let field = |from: usize, to: usize| digits[from..to].iter().fold(0u32, |acc, d| acc * 10 + d);

    NaiveDate::from_ymd_opt(field(0, 4) as i32, field(4, 6), field(6, 8))
        .and_then(|date| date.and_hms_opt(field(8, 10), field(10, 12), field(12, 14)))
        .ok_or_else(|| TimestampError::OutOfRange(s.to_string()))
}
