//! Batch identity: the execution timestamp shared by every artifact of a run.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::constants::{BATCH_KEY_FORMAT, BATCH_KEY_LEN};
use crate::error::Error;

/// Execution timestamp of one pipeline run, at second precision.
///
/// Renders as `YYYY-MM-DD_HH-MM-SS`. The derived ordering is chronological
/// and agrees with lexicographic ordering of the rendered key, which is what
/// "most recent batch" selection relies on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchIdentity(NaiveDateTime);

impl BatchIdentity {
    /// Captures the current local wall-clock time.
    pub fn now() -> Self {
        Self::from_datetime(Local::now().naive_local())
    }

    /// Builds an identity, dropping sub-second precision.
    pub fn from_datetime(datetime: NaiveDateTime) -> Self {
        let truncated = datetime.with_nanosecond(0).unwrap_or(datetime);
        Self(truncated)
    }

    /// Parses a batch key (`YYYY-MM-DD_HH-MM-SS`).
    ///
    /// Only the exact canonical form is accepted, so a parsed key always
    /// renders back to the same string.
    pub fn parse_key(key: &str) -> Option<Self> {
        if key.len() != BATCH_KEY_LEN {
            return None;
        }
        let datetime = NaiveDateTime::parse_from_str(key, BATCH_KEY_FORMAT).ok()?;
        let identity = Self(datetime);
        (identity.key() == key).then_some(identity)
    }

    /// Parses an ISO-8601 timestamp as produced by warehouses and operators.
    ///
    /// Accepts a `T` or space separator, optional fractional seconds
    /// (truncated), an optional `Z` or UTC offset (converted to UTC), and the
    /// batch key form itself.
    pub fn parse_iso(input: &str) -> Option<Self> {
        let input = input.trim();
        if let Some(identity) = Self::parse_key(input) {
            return Some(identity);
        }
        if let Ok(datetime) = DateTime::parse_from_rfc3339(input) {
            return Some(Self::from_datetime(datetime.naive_utc()));
        }
        if let Some(stripped) = input.strip_suffix('Z').or_else(|| input.strip_suffix(" UTC")) {
            return Self::parse_naive(stripped);
        }
        if let Ok(datetime) = DateTime::parse_from_str(input, "%Y-%m-%d %H:%M:%S%.f%:z") {
            return Some(Self::from_datetime(datetime.naive_utc()));
        }
        Self::parse_naive(input)
    }

    fn parse_naive(input: &str) -> Option<Self> {
        const LAYOUTS: [&str; 4] = [
            "%Y-%m-%dT%H:%M:%S%.f",
            "%Y-%m-%d %H:%M:%S%.f",
            "%Y-%m-%dT%H:%M",
            "%Y-%m-%d %H:%M",
        ];
        LAYOUTS
            .iter()
            .find_map(|layout| NaiveDateTime::parse_from_str(input, layout).ok())
            .map(Self::from_datetime)
    }

    /// Canonical batch key, e.g. `2024-12-05_10-30-00`.
    pub fn key(&self) -> String {
        self.0.format(BATCH_KEY_FORMAT).to_string()
    }

    /// Year-month partition, e.g. `2024-12`.
    pub fn year_month(&self) -> String {
        self.0.format("%Y-%m").to_string()
    }

    /// Calendar date, e.g. `2024-12-05`.
    pub fn date_str(&self) -> String {
        self.0.format("%Y-%m-%d").to_string()
    }

    /// SQL timestamp literal body, e.g. `2024-12-05 10:30:00`.
    pub fn sql_timestamp(&self) -> String {
        self.0.format("%Y-%m-%d %H:%M:%S").to_string()
    }

    /// ISO-8601 rendering, e.g. `2024-12-05T10:30:00`.
    pub fn iso(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%S").to_string()
    }

    pub fn date(&self) -> NaiveDate {
        self.0.date()
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for BatchIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format(BATCH_KEY_FORMAT))
    }
}

impl FromStr for BatchIdentity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_key(s)
            .or_else(|| Self::parse_iso(s))
            .ok_or_else(|| {
                Error::invalid_hint(s, "expected YYYY-MM-DD_HH-MM-SS or an ISO-8601 timestamp")
            })
    }
}

impl Serialize for BatchIdentity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.key())
    }
}

impl<'de> Deserialize<'de> for BatchIdentity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = String::deserialize(deserializer)?;
        Self::parse_key(&key)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid batch key: {key}")))
    }
}

/// Validates a `YYYY-MM-DD` date hint.
///
/// # Errors
///
/// Returns [`Error::InvalidHint`] if the hint is not a canonical calendar date.
pub fn parse_date_hint(hint: &str) -> crate::Result<NaiveDate> {
    let date = NaiveDate::parse_from_str(hint, "%Y-%m-%d")
        .map_err(|e| Error::invalid_hint(hint, e.to_string()))?;
    if date.format("%Y-%m-%d").to_string() != hint {
        return Err(Error::invalid_hint(hint, "expected YYYY-MM-DD"));
    }
    Ok(date)
}

/// Validates a `YYYY-MM` month hint.
///
/// # Errors
///
/// Returns [`Error::InvalidHint`] if the hint is not a canonical year-month.
pub fn parse_month_hint(hint: &str) -> crate::Result<String> {
    let first_day = format!("{hint}-01");
    parse_date_hint(&first_day).map_err(|_| Error::invalid_hint(hint, "expected YYYY-MM"))?;
    Ok(hint.to_string())
}
