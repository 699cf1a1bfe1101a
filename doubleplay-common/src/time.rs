//! Timestamp utilities

use crate::{Error, Result};
use chrono::{DateTime, Utc};

/// Parse an RFC 3339 instant into UTC
pub fn parse_instant(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::InvalidInput(format!("invalid timestamp '{}': {}", value, e)))
}

/// Length of `[start, end]` in whole seconds, zero when inverted
pub fn span_seconds(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (end - start).num_seconds().max(0)
}
