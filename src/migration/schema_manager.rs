//! Schema sessions: where migration steps are probed and applied.

use crate::executor::{column, DbError, DbExecutor};
use crate::migration::record::MigrationRecord;
use crate::migration::state_table::{self, HISTORY_TABLE};
use crate::migration::step::{ConstraintKind, SchemaObject, SchemaStep};

/// A live view of one database schema, as the migrator sees it
///
/// [`SchemaManager`] is the PostgreSQL implementation. Tests use an in-memory
/// double that enforces the same ordering rules the database does.
pub trait SchemaSession {
    /// Whether `object` already exists
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the catalog query fails.
    fn object_exists(&self, object: &SchemaObject) -> Result<bool, DbError>;

    /// `udt_name` of an existing column, `None` when it does not exist
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the catalog query fails.
    fn column_type(&self, table: &str, column: &str) -> Result<Option<String>, DbError>;

    /// Kind of an existing constraint, `None` when it does not exist
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the catalog query fails.
    fn constraint_kind(&self, table: &str, name: &str) -> Result<Option<ConstraintKind>, DbError>;

    /// Execute one step. Commits on its own; there is no enclosing transaction.
    ///
    /// # Errors
    ///
    /// Returns whatever the database reports.
    fn apply(&self, step: &SchemaStep) -> Result<(), DbError>;

    /// Previously recorded runs, oldest version first
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the history table cannot be read.
    fn history(&self) -> Result<Vec<MigrationRecord>, DbError>;

    /// Upsert the history row for one migration
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the write fails.
    fn record(&self, record: &MigrationRecord) -> Result<(), DbError>;
}

const TABLE_EXISTS_SQL: &str = "SELECT EXISTS (
    SELECT 1 FROM information_schema.tables
    WHERE table_schema = current_schema() AND table_name = $1
)";

const COLUMN_TYPE_SQL: &str = "SELECT udt_name::text FROM information_schema.columns
    WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2";

const CONSTRAINT_KIND_SQL: &str = "SELECT c.contype::text
    FROM pg_constraint c
    JOIN pg_class t ON t.oid = c.conrelid
    JOIN pg_namespace n ON n.oid = t.relnamespace
    WHERE n.nspname = current_schema() AND t.relname = $1 AND c.conname = $2";

const INDEX_EXISTS_SQL: &str = "SELECT EXISTS (
    SELECT 1 FROM pg_indexes
    WHERE schemaname = current_schema() AND indexname = $1
)";

/// [`SchemaSession`] over a live PostgreSQL connection
///
/// Probes are scoped to `current_schema()`, so a session whose `search_path`
/// points at a scratch schema only ever sees that schema.
pub struct SchemaManager<'a> {
    executor: &'a dyn DbExecutor,
}

impl<'a> SchemaManager<'a> {
    /// Create a new `SchemaManager` with the given executor
    pub fn new(executor: &'a dyn DbExecutor) -> Self {
        Self { executor }
    }

    /// Get a reference to the underlying executor
    pub fn executor(&self) -> &dyn DbExecutor {
        self.executor
    }

    fn exists(&self, sql: &str, params: &[&dyn may_postgres::types::ToSql]) -> Result<bool, DbError> {
        let row = self.executor.query_one(sql, params)?;
        column::<bool>(&row, "exists")
    }
}

impl SchemaSession for SchemaManager<'_> {
    fn object_exists(&self, object: &SchemaObject) -> Result<bool, DbError> {
        match object {
            SchemaObject::Table { table } => self.exists(TABLE_EXISTS_SQL, &[&table.as_str()]),
            SchemaObject::Column { table, column } => {
                Ok(self.column_type(table, column)?.is_some())
            }
            SchemaObject::Constraint { table, name } => {
                Ok(self.constraint_kind(table, name)?.is_some())
            }
            SchemaObject::Index { name } => self.exists(INDEX_EXISTS_SQL, &[&name.as_str()]),
        }
    }

    fn column_type(&self, table: &str, column_name: &str) -> Result<Option<String>, DbError> {
        let rows = self
            .executor
            .query_all(COLUMN_TYPE_SQL, &[&table, &column_name])?;
        rows.first()
            .map(|row| column::<String>(row, "udt_name"))
            .transpose()
    }

    fn constraint_kind(&self, table: &str, name: &str) -> Result<Option<ConstraintKind>, DbError> {
        let rows = self.executor.query_all(CONSTRAINT_KIND_SQL, &[&table, &name])?;
        match rows.first() {
            Some(row) => {
                let code: String = column(row, "contype")?;
                ConstraintKind::from_code(&code)
                    .map(Some)
                    .ok_or_else(|| DbError::Parse(format!("unknown contype '{code}' for {name}")))
            }
            None => Ok(None),
        }
    }

    fn apply(&self, step: &SchemaStep) -> Result<(), DbError> {
        let sql = step.to_sql();
        log::debug!("{step}: {sql}");
        self.executor.execute(&sql, &[]).map(|_| ())
    }

    fn history(&self) -> Result<Vec<MigrationRecord>, DbError> {
        let present = self.object_exists(&SchemaObject::Table {
            table: HISTORY_TABLE.to_string(),
        })?;
        if !present {
            return Ok(Vec::new());
        }
        let rows = self.executor.query_all(state_table::SELECT_HISTORY_SQL, &[])?;
        rows.iter().map(MigrationRecord::from_row).collect()
    }

    fn record(&self, record: &MigrationRecord) -> Result<(), DbError> {
        self.executor
            .execute(
                state_table::UPSERT_HISTORY_SQL,
                &[
                    &record.version,
                    &record.name,
                    &record.checksum,
                    &record.steps_applied,
                    &record.steps_skipped,
                ],
            )
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use may_postgres::types::ToSql;
    use may_postgres::Row;
    use std::sync::{Arc, Mutex};

    /// Records statements; every query fails since we cannot build `Row`s
    struct RecordingExecutor {
        statements: Arc<Mutex<Vec<String>>>,
    }

    impl DbExecutor for RecordingExecutor {
        fn execute(&self, query: &str, _params: &[&dyn ToSql]) -> Result<u64, DbError> {
            self.statements.lock().unwrap().push(query.to_string());
            Ok(0)
        }

        fn query_one(&self, query: &str, _params: &[&dyn ToSql]) -> Result<Row, DbError> {
            Err(DbError::Query(format!("no rows for {query}")))
        }

        fn query_all(&self, _query: &str, _params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_apply_executes_rendered_sql() {
        let statements = Arc::new(Mutex::new(Vec::new()));
        let executor = RecordingExecutor {
            statements: statements.clone(),
        };
        let manager = SchemaManager::new(&executor);
        let step = SchemaStep::create_index_if_absent("idx_jobs_name", "jobs", &["name"], false);

        manager.apply(&step).unwrap();

        let executed = statements.lock().unwrap();
        assert_eq!(executed.len(), 1);
        assert_eq!(executed[0], step.to_sql());
    }

    #[test]
    fn test_missing_column_and_constraint_report_absent() {
        let executor = RecordingExecutor {
            statements: Arc::new(Mutex::new(Vec::new())),
        };
        let manager = SchemaManager::new(&executor);
        assert_eq!(manager.column_type("jobs", "name").unwrap(), None);
        assert_eq!(manager.constraint_kind("jobs", "jobs_pkey").unwrap(), None);
        assert!(!manager
            .object_exists(&SchemaObject::Column {
                table: "jobs".to_string(),
                column: "name".to_string()
            })
            .unwrap());
    }

    #[test]
    fn test_table_probe_errors_propagate() {
        let executor = RecordingExecutor {
            statements: Arc::new(Mutex::new(Vec::new())),
        };
        let manager = SchemaManager::new(&executor);
        let err = manager
            .object_exists(&SchemaObject::Table {
                table: "jobs".to_string(),
            })
            .unwrap_err();
        assert!(err.to_string().contains("no rows"));
    }

    #[test]
    fn test_record_upserts_history_row() {
        let statements = Arc::new(Mutex::new(Vec::new()));
        let executor = RecordingExecutor {
            statements: statements.clone(),
        };
        let manager = SchemaManager::new(&executor);
        let record = MigrationRecord::new(1, "configurator_tables".to_string(), "abc".to_string(), 14, 2);

        manager.record(&record).unwrap();

        let executed = statements.lock().unwrap();
        assert_eq!(executed.as_slice(), [state_table::UPSERT_HISTORY_SQL.to_string()]);
    }

    #[test]
    fn test_history_read_errors_propagate() {
        let executor = RecordingExecutor {
            statements: Arc::new(Mutex::new(Vec::new())),
        };
        let manager = SchemaManager::new(&executor);
        assert!(manager.history().is_err());
    }
}
