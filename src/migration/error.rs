//! Migration-specific error types

use crate::executor::DbError;
use crate::migration::step::ConstraintKind;

/// Migration-specific errors
///
/// Every variant aborts the run. Steps that completed before the failure stay
/// committed; running again resumes from the first missing object.
#[derive(Debug)]
pub enum MigrationError {
    /// Database error outside any step (history table, status probes)
    Database(DbError),
    /// A step was rejected by the database
    StepFailed {
        version: i64,
        migration: String,
        /// Zero-based position of the step within its migration
        index: usize,
        step: String,
        source: DbError,
    },
    /// Strict mode: the column exists with a different type
    ColumnDrift {
        table: String,
        column: String,
        expected: String,
        found: String,
    },
    /// Strict mode: a constraint with this name exists but is of another kind
    ConstraintDrift {
        table: String,
        name: String,
        expected: ConstraintKind,
        found: ConstraintKind,
    },
    /// The declared migrations are malformed (duplicate versions, bad identifiers)
    InvalidPlan(String),
}

impl std::fmt::Display for MigrationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MigrationError::Database(e) => write!(f, "Database error: {e}"),
            MigrationError::StepFailed {
                version,
                migration,
                index,
                step,
                source,
            } => write!(
                f,
                "Migration '{migration}' (version {version}) failed at step {} ({step}): {source}\n\
                 Earlier steps remain applied; re-run once the cause is fixed.",
                index + 1
            ),
            MigrationError::ColumnDrift {
                table,
                column,
                expected,
                found,
            } => write!(
                f,
                "Column {table}.{column} exists with type '{found}' but is declared as '{expected}'"
            ),
            MigrationError::ConstraintDrift {
                table,
                name,
                expected,
                found,
            } => write!(
                f,
                "Constraint {name} on {table} exists as {found} but is declared as {expected}"
            ),
            MigrationError::InvalidPlan(msg) => write!(f, "Invalid migration plan: {msg}"),
        }
    }
}

impl std::error::Error for MigrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MigrationError::Database(e) | MigrationError::StepFailed { source: e, .. } => Some(e),
            _ => None,
        }
    }
}

impl From<DbError> for MigrationError {
    fn from(error: DbError) -> Self {
        MigrationError::Database(error)
    }
}
