//! Integration tests for the migrator against a live PostgreSQL database.
//!
//! Run with `FORGEDESK_TEST_DATABASE_URL` pointing at a throwaway database.
//! Each test works inside its own schema, created through `search_path`.
//!
//! Test flow:
//! 1. Create a scratch schema holding a minimal `inventory_items`
//! 2. Run the configurator migration
//! 3. Verify the created objects and the history table
//! 4. Run again and verify nothing changes

use forgedesk_admin::migration::state_table::SELECT_HISTORY_SQL;
use forgedesk_admin::migration::{
    ConstraintKind, MigrationError, MigrationRecord, SchemaManager, StepOutcome, HISTORY_TABLE,
};
use forgedesk_admin::migrations::{self, ConfiguratorTables};
use forgedesk_admin::test_helpers::TestDatabase;
use forgedesk_admin::{DbError, DbExecutor, Migrator, MigratorOptions};

const WAREHOUSE_DDL: &str =
    "CREATE TABLE inventory_items (id BIGSERIAL PRIMARY KEY, sku TEXT NOT NULL)";

fn open(schema: &str) -> Option<TestDatabase> {
    let db = TestDatabase::from_env().expect("failed to connect to test database")?;
    db.isolate(schema).expect("failed to create scratch schema");
    Some(db)
}

fn table_exists(executor: &dyn DbExecutor, table: &str) -> Result<bool, DbError> {
    let row = executor.query_one(
        "SELECT EXISTS (
            SELECT FROM information_schema.tables
            WHERE table_schema = current_schema() AND table_name = $1
        )",
        &[&table],
    )?;
    Ok(row.get(0))
}

fn column_type(executor: &dyn DbExecutor, table: &str, column: &str) -> Result<String, DbError> {
    let row = executor.query_one(
        "SELECT udt_name::text FROM information_schema.columns
         WHERE table_schema = current_schema() AND table_name = $1 AND column_name = $2",
        &[&table, &column],
    )?;
    Ok(row.get(0))
}

fn history(executor: &dyn DbExecutor) -> Result<Vec<MigrationRecord>, DbError> {
    let rows = executor.query_all(SELECT_HISTORY_SQL, &[])?;
    rows.iter().map(MigrationRecord::from_row).collect()
}

#[test]
fn test_configurator_migration_lifecycle() {
    let schema = "forgedesk_it_lifecycle";
    let Some(db) = open(schema) else {
        return;
    };
    let executor = db.executor();
    executor.execute(WAREHOUSE_DDL, &[]).unwrap();

    let session = SchemaManager::new(executor);
    let migrator = Migrator::new(migrations::all());

    let report = migrator.run(&session).expect("first run failed");
    assert_eq!(report.applied_count(), 14);
    for table in [
        "configurator_part_use_options",
        "configurator_part_profiles",
        "configurator_part_use_links",
        "configurator_part_requirements",
        "configurator_jobs",
        "configurator_configurations",
        "configurator_configuration_doors",
    ] {
        assert!(table_exists(executor, table).unwrap(), "{table} should exist");
    }
    assert_eq!(
        column_type(executor, "configurator_part_use_links", "id").unwrap(),
        "int8"
    );

    let records = history(executor).unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "configurator_tables");
    assert_eq!(records[0].steps_applied, 14);
    assert_eq!(records[0].checksum.len(), 64, "checksum should be SHA-256 hex");

    // Second run: every object is found, nothing executes.
    let report = migrator.run(&session).expect("second run failed");
    assert_eq!(report.applied_count(), 0);
    assert!(report.outcomes().iter().all(|o| *o == StepOutcome::Skipped));

    let rerun = history(executor).unwrap();
    assert_eq!(rerun[0].applied_at, records[0].applied_at);
    assert_eq!(rerun[0].steps_applied, 0);
    assert_eq!(rerun[0].steps_skipped, 16);

    let status = migrator.status(&session).unwrap();
    assert!(status.is_up_to_date());

    db.drop_schema(schema).unwrap();
}

#[test]
fn test_strict_mode_accepts_own_schema() {
    let schema = "forgedesk_it_strict";
    let Some(db) = open(schema) else {
        return;
    };
    let executor = db.executor();
    executor.execute(WAREHOUSE_DDL, &[]).unwrap();
    let session = SchemaManager::new(executor);

    Migrator::new(migrations::all()).run(&session).unwrap();
    let strict = Migrator::new(migrations::all()).with_options(MigratorOptions {
        strict_columns: true,
        record_history: true,
    });
    let report = strict.run(&session).expect("strict run should find no drift");
    assert_eq!(report.applied_count(), 0);

    db.drop_schema(schema).unwrap();
}

fn strict() -> Migrator {
    Migrator::new(migrations::all()).with_options(MigratorOptions {
        strict_columns: true,
        record_history: true,
    })
}

#[test]
fn test_strict_mode_reports_column_type_drift() {
    let schema = "forgedesk_it_column_drift";
    let Some(db) = open(schema) else {
        return;
    };
    let executor = db.executor();
    executor.execute(WAREHOUSE_DDL, &[]).unwrap();
    // Hand-made surrogate id, four bytes instead of eight.
    executor
        .execute(
            "CREATE TABLE configurator_part_use_links (
                id INTEGER,
                inventory_item_id BIGINT NOT NULL,
                use_option_id BIGINT NOT NULL,
                PRIMARY KEY (inventory_item_id, use_option_id)
            )",
            &[],
        )
        .unwrap();
    let session = SchemaManager::new(executor);

    match strict().run(&session).unwrap_err() {
        MigrationError::ColumnDrift {
            table,
            column,
            expected,
            found,
        } => {
            assert_eq!(table, "configurator_part_use_links");
            assert_eq!(column, "id");
            assert_eq!(expected, "int8");
            assert_eq!(found, "int4");
        }
        other => panic!("expected ColumnDrift, got {other}"),
    }

    // Existence is enough by default.
    Migrator::new(migrations::all())
        .run(&session)
        .expect("lenient run should accept the existing column");
    assert_eq!(
        column_type(executor, "configurator_part_use_links", "id").unwrap(),
        "int4"
    );

    db.drop_schema(schema).unwrap();
}

#[test]
fn test_strict_mode_reports_constraint_kind_drift() {
    let schema = "forgedesk_it_constraint_drift";
    let Some(db) = open(schema) else {
        return;
    };
    let executor = db.executor();
    executor.execute(WAREHOUSE_DDL, &[]).unwrap();
    // The quantity check name is taken by a unique constraint.
    executor
        .execute(
            "CREATE TABLE configurator_configurations (
                id BIGSERIAL PRIMARY KEY,
                job_id BIGINT,
                job_scope TEXT NOT NULL DEFAULT 'door_and_frame',
                quantity INTEGER NOT NULL DEFAULT 1,
                CONSTRAINT configurator_configurations_quantity_check UNIQUE (quantity)
            )",
            &[],
        )
        .unwrap();
    let session = SchemaManager::new(executor);

    match strict().run(&session).unwrap_err() {
        MigrationError::ConstraintDrift {
            table,
            name,
            expected,
            found,
        } => {
            assert_eq!(table, "configurator_configurations");
            assert_eq!(name, "configurator_configurations_quantity_check");
            assert_eq!(expected, ConstraintKind::Check);
            assert_eq!(found, ConstraintKind::Unique);
        }
        other => panic!("expected ConstraintDrift, got {other}"),
    }

    Migrator::new(migrations::all())
        .run(&session)
        .expect("lenient run should accept the existing constraint");
    assert!(table_exists(executor, "configurator_configuration_doors").unwrap());

    db.drop_schema(schema).unwrap();
}

#[test]
fn test_legacy_tables_gain_missing_columns() {
    let schema = "forgedesk_it_legacy";
    let Some(db) = open(schema) else {
        return;
    };
    let executor = db.executor();
    executor.execute(WAREHOUSE_DDL, &[]).unwrap();
    // A deployment from before the parent hierarchy and the surrogate link ids.
    for ddl in [
        "CREATE TABLE configurator_part_use_options (id BIGSERIAL PRIMARY KEY, name TEXT NOT NULL UNIQUE)",
        "CREATE TABLE configurator_part_use_links (
            inventory_item_id BIGINT NOT NULL,
            use_option_id BIGINT NOT NULL,
            PRIMARY KEY (inventory_item_id, use_option_id)
        )",
    ] {
        executor.execute(ddl, &[]).unwrap();
    }

    let session = SchemaManager::new(executor);
    Migrator::new(migrations::all()).run(&session).unwrap();

    assert_eq!(
        column_type(executor, "configurator_part_use_options", "parent_id").unwrap(),
        "int8"
    );
    assert_eq!(
        column_type(executor, "configurator_part_use_links", "id").unwrap(),
        "int8"
    );

    db.drop_schema(schema).unwrap();
}

#[test]
fn test_missing_warehouse_table_aborts_without_rollback() {
    let schema = "forgedesk_it_abort";
    let Some(db) = open(schema) else {
        return;
    };
    let executor = db.executor();
    let session = SchemaManager::new(executor);

    let err = Migrator::new(vec![Box::new(ConfiguratorTables)])
        .with_options(MigratorOptions {
            strict_columns: false,
            record_history: false,
        })
        .run(&session)
        .unwrap_err();
    match err {
        MigrationError::StepFailed { version, index, .. } => {
            assert_eq!(version, 1);
            assert_eq!(index, 1);
        }
        other => panic!("expected StepFailed, got {other}"),
    }
    // The steps before the failure stay applied.
    assert!(table_exists(executor, "configurator_part_use_options").unwrap());
    assert!(!table_exists(executor, "configurator_part_profiles").unwrap());
    assert!(!table_exists(executor, HISTORY_TABLE).unwrap());

    db.drop_schema(schema).unwrap();
}
