//! Migration history table

use crate::migration::step::{ColumnDefault, ColumnSpec, ColumnType, SchemaStep};

/// Name of the history table
pub const HISTORY_TABLE: &str = "forgedesk_schema_migrations";

/// The step that creates the history table
///
/// It goes through the same interpreter as every other step, so creating it
/// is idempotent in exactly the same way.
pub fn history_table_step() -> SchemaStep {
    SchemaStep::create_table_if_absent(
        HISTORY_TABLE,
        vec![
            ColumnSpec::new("version", ColumnType::BigInt).not_null().primary_key(),
            ColumnSpec::new("name", ColumnType::Varchar(255)).not_null(),
            ColumnSpec::new("checksum", ColumnType::Varchar(64)).not_null(),
            ColumnSpec::new("applied_at", ColumnType::TimestampTz)
                .not_null()
                .default(ColumnDefault::Now),
            ColumnSpec::new("last_run_at", ColumnType::TimestampTz)
                .not_null()
                .default(ColumnDefault::Now),
            ColumnSpec::new("steps_applied", ColumnType::Integer)
                .not_null()
                .default(ColumnDefault::Int(0)),
            ColumnSpec::new("steps_skipped", ColumnType::Integer)
                .not_null()
                .default(ColumnDefault::Int(0)),
        ],
        vec![],
        vec![],
    )
}

/// Insert or refresh one migration's row; `applied_at` keeps its first value
pub const UPSERT_HISTORY_SQL: &str = "INSERT INTO forgedesk_schema_migrations
        (version, name, checksum, steps_applied, steps_skipped)
    VALUES ($1, $2, $3, $4, $5)
    ON CONFLICT (version) DO UPDATE SET
        name = EXCLUDED.name,
        checksum = EXCLUDED.checksum,
        last_run_at = NOW(),
        steps_applied = EXCLUDED.steps_applied,
        steps_skipped = EXCLUDED.steps_skipped";

/// All history rows, timestamps rendered as UTC text
pub const SELECT_HISTORY_SQL: &str = "SELECT version, name, checksum,
        to_char(applied_at AT TIME ZONE 'UTC', 'YYYY-MM-DD HH24:MI:SS.US') AS applied_at,
        to_char(last_run_at AT TIME ZONE 'UTC', 'YYYY-MM-DD HH24:MI:SS.US') AS last_run_at,
        steps_applied, steps_skipped
    FROM forgedesk_schema_migrations
    ORDER BY version";
