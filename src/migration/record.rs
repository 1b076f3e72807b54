//! `MigrationRecord` - one row of the `forgedesk_schema_migrations` history table

use crate::executor::{column, DbError};
use chrono::{DateTime, NaiveDateTime, Utc};

/// A history row
///
/// History is an audit trail only. Whether a step runs is decided by probing
/// the schema, never by this table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationRecord {
    /// Migration version
    pub version: i64,

    /// Human-readable migration name
    pub name: String,

    /// `SHA-256` over the rendered SQL of every step
    pub checksum: String,

    /// First time the migration ran to completion
    pub applied_at: DateTime<Utc>,

    /// Most recent completed run
    pub last_run_at: DateTime<Utc>,

    /// Steps applied by the most recent run
    pub steps_applied: i32,

    /// Steps skipped by the most recent run because their target existed
    pub steps_skipped: i32,
}

impl MigrationRecord {
    /// Create a `MigrationRecord` for a run that just finished
    #[must_use]
    pub fn new(
        version: i64,
        name: String,
        checksum: String,
        steps_applied: i32,
        steps_skipped: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            version,
            name,
            checksum,
            applied_at: now,
            last_run_at: now,
            steps_applied,
            steps_skipped,
        }
    }

    /// Create a `MigrationRecord` from a row of
    /// [`SELECT_HISTORY_SQL`](crate::migration::state_table::SELECT_HISTORY_SQL)
    ///
    /// Timestamps are selected as UTC text and parsed here.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Parse` if a column is missing or a timestamp is malformed.
    pub fn from_row(row: &may_postgres::Row) -> Result<Self, DbError> {
        let applied_at: String = column(row, "applied_at")?;
        let last_run_at: String = column(row, "last_run_at")?;
        Ok(Self {
            version: column(row, "version")?,
            name: column(row, "name")?,
            checksum: column(row, "checksum")?,
            applied_at: parse_timestamp(&applied_at)?,
            last_run_at: parse_timestamp(&last_run_at)?,
            steps_applied: column(row, "steps_applied")?,
            steps_skipped: column(row, "steps_skipped")?,
        })
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, DbError> {
    const FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| {
            DbError::Parse(format!(
                "Failed to parse timestamp '{raw}': unrecognized format"
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};

    #[test]
    fn test_parse_timestamp_formats() {
        let ts = parse_timestamp("2024-03-05 14:07:09.123456").unwrap();
        assert_eq!((ts.year(), ts.month(), ts.day()), (2024, 3, 5));
        assert_eq!((ts.hour(), ts.minute(), ts.second()), (14, 7, 9));
        assert!(parse_timestamp("2024-03-05T14:07:09").is_ok());
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(err.to_string().contains("unrecognized format"));
    }

    #[test]
    fn test_new_record_uses_same_instant_for_both_timestamps() {
        let record = MigrationRecord::new(1, "configurator_tables".into(), "abc".into(), 16, 0);
        assert_eq!(record.applied_at, record.last_run_at);
    }
}
