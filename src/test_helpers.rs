//! Helpers for tests that need a live PostgreSQL database.
//!
//! Set `FORGEDESK_TEST_DATABASE_URL` to a throwaway database. When it is not
//! set, [`TestDatabase::from_env`] returns `None` and callers skip.

use crate::connection::connect;
use crate::executor::{DbError, DbExecutor, PgExecutor};

/// Environment variable naming the scratch database
pub const TEST_DATABASE_URL_VAR: &str = "FORGEDESK_TEST_DATABASE_URL";

/// A connection to the scratch test database
pub struct TestDatabase {
    executor: PgExecutor,
}

impl TestDatabase {
    /// Connect to the database named by `FORGEDESK_TEST_DATABASE_URL`
    ///
    /// Returns `None` when the variable is unset.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the variable is set but the connection fails.
    pub fn from_env() -> Result<Option<Self>, DbError> {
        let Ok(url) = std::env::var(TEST_DATABASE_URL_VAR) else {
            eprintln!("{TEST_DATABASE_URL_VAR} not set, skipping database test");
            return Ok(None);
        };
        let client = connect(&url).map_err(|e| DbError::Other(format!("Connection error: {e}")))?;
        Ok(Some(Self {
            executor: PgExecutor::new(client),
        }))
    }

    /// The executor for this database
    pub fn executor(&self) -> &PgExecutor {
        &self.executor
    }

    /// Create a fresh schema and make it the session's `search_path`
    ///
    /// Everything the migrator creates afterwards lands in that schema, so
    /// tests do not see each other's tables.
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the schema cannot be created.
    pub fn isolate(&self, schema: &str) -> Result<(), DbError> {
        self.executor
            .execute(&format!("DROP SCHEMA IF EXISTS \"{schema}\" CASCADE"), &[])?;
        self.executor
            .execute(&format!("CREATE SCHEMA \"{schema}\""), &[])?;
        self.executor
            .execute(&format!("SET search_path TO \"{schema}\""), &[])?;
        Ok(())
    }

    /// Drop a schema created by [`isolate`](Self::isolate)
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the drop fails.
    pub fn drop_schema(&self, schema: &str) -> Result<(), DbError> {
        self.executor
            .execute(&format!("DROP SCHEMA IF EXISTS \"{schema}\" CASCADE"), &[])?;
        Ok(())
    }
}
