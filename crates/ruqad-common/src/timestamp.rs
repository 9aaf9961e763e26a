//! Timestamp parsing
//!
//! The repository API reports creation times either as RFC 3339
//! (`2024-10-01T02:34:42.484312+00:00`) or with a space separator
//! (`2024-10-01 02:34:42.484312+00:00`). Both parse to UTC.

use crate::error::{Result, RuqadError};
use chrono::{DateTime, Utc};

const SPACE_SEPARATED: &str = "%Y-%m-%d %H:%M:%S%.f%:z";

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    let value = value.trim();
    DateTime::parse_from_rfc3339(value)
        .or_else(|_| DateTime::parse_from_str(value, SPACE_SEPARATED))
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RuqadError::InvalidTimestamp {
            value: value.to_string(),
            reason: e.to_string(),
        })
}

/// Serde adapter for timestamps in either accepted format
pub mod serde_flexible {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> std::result::Result<DateTime<Utc>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        super::parse_timestamp(&raw).map_err(serde::de::Error::custom)
    }
}
