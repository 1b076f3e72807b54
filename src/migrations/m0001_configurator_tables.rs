//! Configurator tables: part profiles, use options, jobs and configurations.
//!
//! `inventory_items` belongs to the external warehouse system and must exist
//! before this migration runs.

use crate::migration::{
    ColumnDefault, ColumnSpec, ColumnType, ConstraintDef, Migration, OnDelete, SchemaStep,
    TableConstraint,
};

const USE_OPTIONS: &str = "configurator_part_use_options";
const PART_PROFILES: &str = "configurator_part_profiles";
const USE_LINKS: &str = "configurator_part_use_links";
const REQUIREMENTS: &str = "configurator_part_requirements";
const JOBS: &str = "configurator_jobs";
const CONFIGURATIONS: &str = "configurator_configurations";
const CONFIGURATION_DOORS: &str = "configurator_configuration_doors";

pub struct ConfiguratorTables;

impl Migration for ConfiguratorTables {
    fn name(&self) -> &str {
        "configurator_tables"
    }

    fn version(&self) -> i64 {
        1
    }

    fn steps(&self) -> Vec<SchemaStep> {
        vec![
            SchemaStep::create_table_if_absent(
                USE_OPTIONS,
                vec![
                    id(),
                    ColumnSpec::new("name", ColumnType::Text).not_null().unique(),
                    parent_id(),
                ],
                vec![],
                vec![],
            ),
            SchemaStep::create_table_if_absent(
                PART_PROFILES,
                vec![
                    ColumnSpec::new("inventory_item_id", ColumnType::BigInt)
                        .primary_key()
                        .references("inventory_items", "id", OnDelete::Cascade),
                    ColumnSpec::new("is_enabled", ColumnType::Boolean)
                        .not_null()
                        .default(ColumnDefault::Bool(false)),
                    ColumnSpec::new("part_type", ColumnType::Text).null(),
                    ColumnSpec::new("height_lz", measure()).null(),
                    ColumnSpec::new("depth_ly", measure()).null(),
                    created_at(),
                ],
                vec![
                    check(
                        "configurator_part_profiles_part_type_check",
                        "part_type IS NULL OR part_type IN ('door', 'frame', 'hardware', 'accessory')",
                    ),
                    check(
                        "configurator_part_profiles_height_lz_check",
                        "height_lz IS NULL OR height_lz > 0",
                    ),
                    check(
                        "configurator_part_profiles_depth_ly_check",
                        "depth_ly IS NULL OR depth_ly > 0",
                    ),
                ],
                vec![],
            ),
            SchemaStep::create_table_if_absent(
                USE_LINKS,
                vec![
                    item_ref("inventory_item_id"),
                    ColumnSpec::new("use_option_id", ColumnType::BigInt)
                        .not_null()
                        .references(USE_OPTIONS, "id", OnDelete::Cascade),
                ],
                vec![TableConstraint::PrimaryKey(vec![
                    "inventory_item_id".to_string(),
                    "use_option_id".to_string(),
                ])],
                vec![],
            ),
            SchemaStep::create_table_if_absent(
                REQUIREMENTS,
                vec![
                    item_ref("inventory_item_id"),
                    item_ref("required_inventory_item_id"),
                    quantity(),
                ],
                vec![TableConstraint::PrimaryKey(vec![
                    "inventory_item_id".to_string(),
                    "required_inventory_item_id".to_string(),
                ])],
                vec![],
            ),
            // Surrogate ids arrived after the composite keys.
            SchemaStep::add_column_if_absent(USE_LINKS, ColumnSpec::new("id", ColumnType::BigSerial)),
            SchemaStep::add_column_if_absent(REQUIREMENTS, ColumnSpec::new("id", ColumnType::BigSerial)),
            SchemaStep::add_column_if_absent(REQUIREMENTS, quantity()),
            SchemaStep::add_column_if_absent(USE_OPTIONS, parent_id()),
            SchemaStep::create_index_if_absent(
                "idx_configurator_part_use_options_parent_id",
                USE_OPTIONS,
                &["parent_id"],
                false,
            ),
            SchemaStep::create_index_if_absent(
                "idx_configurator_part_use_links_id",
                USE_LINKS,
                &["id"],
                true,
            ),
            SchemaStep::create_table_if_absent(
                JOBS,
                vec![
                    id(),
                    ColumnSpec::new("job_number", ColumnType::Text).not_null().unique(),
                    ColumnSpec::new("name", ColumnType::Text).not_null(),
                    created_at(),
                ],
                vec![],
                vec![],
            ),
            SchemaStep::create_table_if_absent(
                CONFIGURATIONS,
                vec![
                    id(),
                    ColumnSpec::new("name", ColumnType::Text).not_null(),
                    ColumnSpec::new("job_id", ColumnType::BigInt)
                        .null()
                        .references(JOBS, "id", OnDelete::SetNull),
                    ColumnSpec::new("job_scope", ColumnType::Text)
                        .not_null()
                        .default(ColumnDefault::Text("door_and_frame".to_string())),
                    quantity(),
                    ColumnSpec::new("status", ColumnType::Text)
                        .not_null()
                        .default(ColumnDefault::Text("draft".to_string())),
                    ColumnSpec::new("notes", ColumnType::Text).null(),
                    created_at(),
                    ColumnSpec::new("updated_at", ColumnType::TimestampTz)
                        .not_null()
                        .default(ColumnDefault::Now),
                ],
                vec![],
                vec![],
            ),
            SchemaStep::add_constraint_if_absent(
                CONFIGURATIONS,
                "configurator_configurations_quantity_check",
                ConstraintDef::Check("quantity > 0".to_string()),
            ),
            SchemaStep::add_constraint_if_absent(
                CONFIGURATIONS,
                "configurator_configurations_job_scope_check",
                ConstraintDef::Check(
                    "job_scope IN ('door_and_frame', 'frame_only', 'door_only')".to_string(),
                ),
            ),
            SchemaStep::create_index_if_absent(
                "idx_configurator_configurations_job_id",
                CONFIGURATIONS,
                &["job_id"],
                false,
            ),
            SchemaStep::create_table_if_absent(
                CONFIGURATION_DOORS,
                vec![
                    id(),
                    ColumnSpec::new("configuration_id", ColumnType::BigInt)
                        .not_null()
                        .references(CONFIGURATIONS, "id", OnDelete::Cascade),
                    ColumnSpec::new("door_tag", ColumnType::Text).not_null(),
                    created_at(),
                ],
                vec![TableConstraint::Unique(vec![
                    "configuration_id".to_string(),
                    "door_tag".to_string(),
                ])],
                vec![],
            ),
        ]
    }
}

fn id() -> ColumnSpec {
    ColumnSpec::new("id", ColumnType::BigSerial).primary_key()
}

fn parent_id() -> ColumnSpec {
    ColumnSpec::new("parent_id", ColumnType::BigInt)
        .null()
        .references(USE_OPTIONS, "id", OnDelete::SetNull)
}

fn item_ref(name: &str) -> ColumnSpec {
    ColumnSpec::new(name, ColumnType::BigInt)
        .not_null()
        .references("inventory_items", "id", OnDelete::Cascade)
}

fn quantity() -> ColumnSpec {
    ColumnSpec::new("quantity", ColumnType::Integer)
        .not_null()
        .default(ColumnDefault::Int(1))
}

fn created_at() -> ColumnSpec {
    ColumnSpec::new("created_at", ColumnType::TimestampTz)
        .not_null()
        .default(ColumnDefault::Now)
}

fn measure() -> ColumnType {
    ColumnType::Numeric {
        precision: 12,
        scale: 4,
    }
}

fn check(name: &str, predicate: &str) -> TableConstraint {
    TableConstraint::Check {
        name: name.to_string(),
        predicate: predicate.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::memory::MemorySchema;
    use crate::migration::{
        Migrator, MigratorOptions, SchemaObject, SchemaSession, StepOutcome,
    };

    fn warehouse() -> MemorySchema {
        MemorySchema::new().with_table("inventory_items", &[("id", "int8"), ("sku", "text")])
    }

    fn constraint(table: &str, name: &str) -> SchemaObject {
        SchemaObject::Constraint {
            table: table.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_declares_sixteen_valid_steps() {
        let steps = ConfiguratorTables.steps();
        assert_eq!(steps.len(), 16);
        for step in &steps {
            step.validate().unwrap();
        }
    }

    #[test]
    fn test_fresh_database_applies_everything() {
        let schema = warehouse();
        let report = Migrator::new(vec![Box::new(ConfiguratorTables)])
            .run(&schema)
            .unwrap();

        // The late id/quantity/parent_id columns already came with their tables,
        // except the two surrogate ids.
        let outcomes = report.outcomes();
        assert_eq!(outcomes[4], StepOutcome::Applied);
        assert_eq!(outcomes[5], StepOutcome::Applied);
        assert_eq!(outcomes[6], StepOutcome::Skipped);
        assert_eq!(outcomes[7], StepOutcome::Skipped);
        assert_eq!(report.applied_count(), 14);

        assert!(schema.has(&constraint(
            CONFIGURATIONS,
            "configurator_configurations_job_scope_check"
        )));
        assert!(schema.has(&constraint(
            PART_PROFILES,
            "configurator_part_profiles_height_lz_check"
        )));
        assert!(schema.has(&SchemaObject::Index {
            name: "idx_configurator_part_use_links_id".to_string()
        }));
        assert_eq!(
            schema.column_type(USE_LINKS, "id").unwrap().as_deref(),
            Some("int8")
        );
    }

    #[test]
    fn test_second_run_changes_nothing() {
        let schema = warehouse();
        let migrator = Migrator::new(vec![Box::new(ConfiguratorTables)]);

        migrator.run(&schema).unwrap();
        let executed = schema.executed().len();
        let snapshot = schema.snapshot();

        let second = migrator.run(&schema).unwrap();

        assert_eq!(second.applied_count(), 0);
        assert_eq!(second.skipped_count(), 16);
        assert_eq!(schema.executed().len(), executed);
        assert_eq!(schema.snapshot(), snapshot);
    }

    #[test]
    fn test_legacy_schema_gets_missing_ids_and_parent() {
        // A deployment from before the surrogate ids and the parent hierarchy.
        let schema = warehouse()
            .with_table(USE_OPTIONS, &[("id", "int8"), ("name", "text")])
            .with_table(USE_LINKS, &[("inventory_item_id", "int8"), ("use_option_id", "int8")])
            .with_table(
                REQUIREMENTS,
                &[("inventory_item_id", "int8"), ("required_inventory_item_id", "int8")],
            );

        let report = Migrator::new(vec![Box::new(ConfiguratorTables)])
            .run(&schema)
            .unwrap();

        let outcomes = report.outcomes();
        assert_eq!(outcomes[0], StepOutcome::Skipped);
        assert_eq!(outcomes[2], StepOutcome::Skipped);
        assert_eq!(outcomes[3], StepOutcome::Skipped);
        assert_eq!(&outcomes[4..8], &[StepOutcome::Applied; 4]);
        assert!(schema.has(&SchemaObject::Column {
            table: USE_OPTIONS.to_string(),
            column: "parent_id".to_string()
        }));
        assert!(schema.has(&constraint(USE_OPTIONS, "configurator_part_use_options_parent_id_fkey")));
    }

    #[test]
    fn test_missing_inventory_items_aborts_at_part_profiles() {
        let schema = MemorySchema::new();
        let err = Migrator::new(vec![Box::new(ConfiguratorTables)])
            .with_options(MigratorOptions {
                strict_columns: false,
                record_history: false,
            })
            .run(&schema)
            .unwrap_err();

        assert!(err.to_string().contains("failed at step 2"));
        assert!(schema.has(&SchemaObject::Table {
            table: USE_OPTIONS.to_string()
        }));
        assert!(!schema.has(&SchemaObject::Table {
            table: JOBS.to_string()
        }));
    }

    #[test]
    fn test_strict_mode_passes_on_own_schema() {
        let schema = warehouse();
        let migrator = Migrator::new(vec![Box::new(ConfiguratorTables)]).with_options(
            MigratorOptions {
                strict_columns: true,
                record_history: true,
            },
        );
        migrator.run(&schema).unwrap();
        assert_eq!(migrator.run(&schema).unwrap().applied_count(), 0);
    }

    #[test]
    fn test_rendered_sql_keeps_checks_inside_create_table() {
        let sql = ConfiguratorTables.steps()[1].to_sql();
        assert!(sql.starts_with("CREATE TABLE IF NOT EXISTS \"configurator_part_profiles\""));
        assert!(sql.contains("CONSTRAINT \"configurator_part_profiles_depth_ly_check\" CHECK"));
    }
}
