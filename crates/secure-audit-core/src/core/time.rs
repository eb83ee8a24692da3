// crates/secure-audit-core/src/core/time.rs
// ============================================================================
// Module: SecureAudit Time
// Description: Millisecond-precision UTC timestamps.
// Purpose: Give records and logs a single RFC 3339 time representation.
// Dependencies: serde, time
// ============================================================================

//! ## Overview
//! [`Timestamp`] wraps a UTC [`OffsetDateTime`] truncated to milliseconds. It
//! serializes as an RFC 3339 string so JSON payloads and log lines agree, and
//! converts to and from unix milliseconds for the SQLite store.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use serde::Deserialize;
use serde::Deserializer;
use serde::Serialize;
use serde::Serializer;
use time::Date;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

// ============================================================================
// SECTION: Timestamp
// ============================================================================

/// UTC wall-clock timestamp with millisecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(OffsetDateTime);

impl Timestamp {
    /// Returns the current UTC time truncated to milliseconds.
    #[must_use]
    pub fn now() -> Self {
        Self::from_datetime(OffsetDateTime::now_utc())
    }

    /// Wraps a datetime, normalizing to UTC and truncating sub-millisecond
    /// precision.
    #[must_use]
    pub fn from_datetime(value: OffsetDateTime) -> Self {
        let utc = value.to_offset(time::UtcOffset::UTC);
        let millis = utc.millisecond();
        let truncated = utc.replace_millisecond(millis).unwrap_or(utc);
        Self(truncated)
    }

    /// Builds a timestamp from unix milliseconds. Returns `None` when the value
    /// is out of range.
    #[must_use]
    pub fn from_unix_millis(millis: i64) -> Option<Self> {
        let nanos = i128::from(millis) * 1_000_000;
        OffsetDateTime::from_unix_timestamp_nanos(nanos).ok().map(Self)
    }

    /// Returns the timestamp as unix milliseconds.
    #[must_use]
    pub fn unix_millis(&self) -> i64 {
        let millis = self.0.unix_timestamp_nanos() / 1_000_000;
        i64::try_from(millis).unwrap_or(i64::MAX)
    }

    /// Parses an RFC 3339 timestamp.
    ///
    /// # Errors
    ///
    /// Returns [`time::error::Parse`] when the input is not RFC 3339.
    pub fn parse_rfc3339(value: &str) -> Result<Self, time::error::Parse> {
        OffsetDateTime::parse(value, &Rfc3339).map(Self::from_datetime)
    }

    /// Formats the timestamp as RFC 3339.
    #[must_use]
    pub fn to_rfc3339(&self) -> String {
        self.0.format(&Rfc3339).unwrap_or_else(|_| self.unix_millis().to_string())
    }

    /// Returns the calendar date portion.
    #[must_use]
    pub fn date(&self) -> Date {
        self.0.date()
    }

    /// Returns `YYYY-MM` for monthly bucketing.
    #[must_use]
    pub fn year_month(&self) -> String {
        format!("{:04}-{:02}", self.0.year(), u8::from(self.0.month()))
    }

    /// Returns the timestamp shifted back by whole days.
    #[must_use]
    pub fn minus_days(&self, days: i64) -> Self {
        Self(self.0 - time::Duration::days(days))
    }

    /// Returns the inner datetime.
    #[must_use]
    pub const fn as_datetime(&self) -> OffsetDateTime {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_rfc3339())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_rfc3339())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse_rfc3339(&raw).map_err(serde::de::Error::custom)
    }
}
