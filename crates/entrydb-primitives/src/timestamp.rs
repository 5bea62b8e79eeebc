use chrono::{DateTime, SecondsFormat, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use thiserror::Error as ThisError;

///
/// TimestampParseError
///

#[derive(Debug, ThisError)]
pub enum TimestampParseError {
    #[error("timestamp parse error: {0}")]
    Format(String),

    #[error("timestamp out of range: {0}")]
    OutOfRange(i64),
}

///
/// Timestamp
/// (in milliseconds since the Unix epoch)
///

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Display,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[repr(transparent)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub const EPOCH: Self = Self(0);
    pub const MIN: Self = Self(i64::MIN);
    pub const MAX: Self = Self(i64::MAX);

    /// Construct from milliseconds.
    #[must_use]
    pub const fn from_millis(ms: i64) -> Self {
        Self(ms)
    }

    /// Construct from seconds.
    #[must_use]
    pub const fn from_seconds(secs: i64) -> Self {
        Self(secs * 1_000)
    }

    #[must_use]
    pub const fn as_millis(self) -> i64 {
        self.0
    }

    /// Parse an RFC 3339 datetime string.
    pub fn parse_rfc3339(s: &str) -> Result<Self, TimestampParseError> {
        let dt = DateTime::parse_from_rfc3339(s)
            .map_err(|e| TimestampParseError::Format(e.to_string()))?;

        Ok(Self(dt.timestamp_millis()))
    }

    /// Parse either integer milliseconds or an RFC 3339 string.
    pub fn parse_flexible(s: &str) -> Result<Self, TimestampParseError> {
        if let Ok(n) = s.parse::<i64>() {
            return Ok(Self(n));
        }

        Self::parse_rfc3339(s)
    }

    #[must_use]
    /// Current wall-clock timestamp.
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Render as RFC 3339 with millisecond precision.
    pub fn to_rfc3339(self) -> Result<String, TimestampParseError> {
        let dt = DateTime::<Utc>::from_timestamp_millis(self.0)
            .ok_or(TimestampParseError::OutOfRange(self.0))?;

        Ok(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }
}

impl From<i64> for Timestamp {
    fn from(ms: i64) -> Self {
        Self(ms)
    }
}

impl From<Timestamp> for i64 {
    fn from(ts: Timestamp) -> Self {
        ts.0
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rfc3339_round_trip() {
        let ts = Timestamp::parse_rfc3339("2024-05-01T12:30:00.250Z").unwrap();
        let rendered = ts.to_rfc3339().unwrap();
        let back = Timestamp::parse_rfc3339(&rendered).unwrap();

        assert_eq!(ts, back, "rfc3339 round trip changed the instant");
    }

    #[test]
    fn flexible_accepts_integer_millis() {
        let ts = Timestamp::parse_flexible("1714566600250").unwrap();
        assert_eq!(ts.as_millis(), 1_714_566_600_250);
    }

    #[test]
    fn flexible_rejects_garbage() {
        assert!(Timestamp::parse_flexible("not-a-time").is_err());
    }

    #[test]
    fn now_is_after_epoch() {
        assert!(Timestamp::now() > Timestamp::EPOCH);
    }
}
