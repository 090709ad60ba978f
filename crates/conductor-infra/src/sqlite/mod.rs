//! SQLite repository implementations.
//!
//! All repositories share a `DatabasePool` (split reader/writer, WAL mode).
//! Rows use TEXT UUIDs, RFC3339 timestamps, JSON TEXT payload columns, and
//! snake_case status strings matching the serde wire format of the domain
//! enums.

pub mod artifact;
pub mod checkpoint;
pub mod plan;
pub mod pool;
pub mod queue;
pub mod request;

#[cfg(test)]
mod integration;

use chrono::{DateTime, SecondsFormat, Utc};
use conductor_types::error::RepositoryError;
use serde::Serialize;
use serde::de::DeserializeOwned;
use uuid::Uuid;

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, RepositoryError> {
    s.parse::<Uuid>()
        .map_err(|e| RepositoryError::Query(format!("invalid UUID: {e}")))
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

/// Fixed-width RFC3339 so lexicographic ordering matches chronological.
pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Render a unit-variant enum to its snake_case wire string.
pub(crate) fn enum_str<T: Serialize>(value: &T) -> Result<String, RepositoryError> {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::String(s)) => Ok(s),
        Ok(other) => Err(RepositoryError::Query(format!(
            "expected string-serializable enum, got {other}"
        ))),
        Err(e) => Err(RepositoryError::Query(format!("serialize enum: {e}"))),
    }
}

/// Parse a snake_case wire string back into a unit-variant enum.
pub(crate) fn enum_from_str<T: DeserializeOwned>(s: &str) -> Result<T, RepositoryError> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| RepositoryError::Query(format!("invalid enum value: {s}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use conductor_types::queue::TaskStatus;

    #[test]
    fn test_enum_str_roundtrip() {
        let s = enum_str(&TaskStatus::Processing).unwrap();
        assert_eq!(s, "processing");
        let parsed: TaskStatus = enum_from_str(&s).unwrap();
        assert_eq!(parsed, TaskStatus::Processing);
    }

    #[test]
    fn test_format_datetime_fixed_width() {
        let dt = Utc::now();
        let s = format_datetime(&dt);
        assert!(s.ends_with('Z'));
        // Micros: always 6 fractional digits.
        assert_eq!(s.len(), "2026-01-01T00:00:00.000000Z".len());
        let parsed = parse_datetime(&s).unwrap();
        assert_eq!(format_datetime(&parsed), s);
    }
}
