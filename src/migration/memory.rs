//! In-memory [`SchemaSession`] for unit tests.
//!
//! Mirrors the PostgreSQL rules a step can trip over: referenced tables and
//! columns must exist, `ADD CONSTRAINT` on an existing name fails, and the
//! `IF NOT EXISTS` forms are no-ops.

use crate::executor::DbError;
use crate::migration::record::MigrationRecord;
use crate::migration::schema_manager::SchemaSession;
use crate::migration::step::{
    ConstraintDef, ConstraintKind, ForeignKeyRef, SchemaObject, SchemaStep, TableConstraint,
};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

#[derive(Default)]
pub(crate) struct MemorySchema {
    objects: RefCell<HashSet<SchemaObject>>,
    column_types: RefCell<HashMap<(String, String), String>>,
    constraint_kinds: RefCell<HashMap<(String, String), ConstraintKind>>,
    history: RefCell<BTreeMap<i64, MigrationRecord>>,
    executed: RefCell<Vec<String>>,
    fail_on: Option<String>,
}

impl MemorySchema {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Seed a table owned by someone else, e.g. `inventory_items`
    pub(crate) fn with_table(self, table: &str, columns: &[(&str, &str)]) -> Self {
        self.objects.borrow_mut().insert(SchemaObject::Table {
            table: table.to_string(),
        });
        for (column, udt) in columns {
            self.objects.borrow_mut().insert(SchemaObject::Column {
                table: table.to_string(),
                column: column.to_string(),
            });
            self.column_types
                .borrow_mut()
                .insert((table.to_string(), column.to_string()), udt.to_string());
        }
        self
    }

    /// Seed a constraint
    pub(crate) fn with_constraint(self, table: &str, name: &str, kind: ConstraintKind) -> Self {
        self.objects.borrow_mut().insert(SchemaObject::Constraint {
            table: table.to_string(),
            name: name.to_string(),
        });
        self.constraint_kinds
            .borrow_mut()
            .insert((table.to_string(), name.to_string()), kind);
        self
    }

    /// Reject the step whose description is `step` as if the database refused it
    pub(crate) fn failing_on(mut self, step: &str) -> Self {
        self.fail_on = Some(step.to_string());
        self
    }

    /// Let the database accept the previously rejected step again
    pub(crate) fn clear_failure(&mut self) {
        self.fail_on = None;
    }

    /// Descriptions of executed steps, in order
    pub(crate) fn executed(&self) -> Vec<String> {
        self.executed.borrow().clone()
    }

    /// A sorted rendering of the whole schema, for before/after comparison
    pub(crate) fn snapshot(&self) -> BTreeSet<String> {
        let mut out: BTreeSet<String> = self.objects.borrow().iter().map(|o| o.to_string()).collect();
        for ((table, column), udt) in self.column_types.borrow().iter() {
            out.insert(format!("type {table}.{column} {udt}"));
        }
        out
    }

    pub(crate) fn has(&self, object: &SchemaObject) -> bool {
        self.objects.borrow().contains(object)
    }

    fn table_exists(&self, table: &str) -> bool {
        self.has(&SchemaObject::Table {
            table: table.to_string(),
        })
    }

    fn column_exists(&self, table: &str, column: &str) -> bool {
        self.has(&SchemaObject::Column {
            table: table.to_string(),
            column: column.to_string(),
        })
    }

    fn require_table(&self, table: &str) -> Result<(), DbError> {
        if self.table_exists(table) {
            Ok(())
        } else {
            Err(DbError::Query(format!("relation \"{table}\" does not exist")))
        }
    }

    fn require_column(&self, table: &str, column: &str) -> Result<(), DbError> {
        if self.column_exists(table, column) {
            Ok(())
        } else {
            Err(DbError::Query(format!(
                "column \"{column}\" of relation \"{table}\" does not exist"
            )))
        }
    }

    /// A reference from `table` is fine when it points at an existing column,
    /// or back into the table being created
    fn require_target(&self, table: &str, own_columns: &[&str], fk: &ForeignKeyRef) -> Result<(), DbError> {
        if fk.table == table && own_columns.contains(&fk.column.as_str()) {
            return Ok(());
        }
        self.require_table(&fk.table)?;
        self.require_column(&fk.table, &fk.column)
    }

    fn check_step(&self, step: &SchemaStep) -> Result<bool, DbError> {
        match step {
            SchemaStep::CreateTable {
                table,
                columns,
                constraints,
                foreign_keys,
            } => {
                if self.table_exists(table) {
                    return Ok(false);
                }
                let own: Vec<&str> = columns.iter().map(|c| c.name.as_str()).collect();
                for column in columns {
                    if let Some(fk) = &column.references {
                        self.require_target(table, &own, fk)?;
                    }
                }
                for fk in foreign_keys {
                    if !own.contains(&fk.column.as_str()) {
                        return Err(DbError::Query(format!(
                            "column \"{}\" named in key does not exist",
                            fk.column
                        )));
                    }
                    self.require_target(table, &own, &fk.references)?;
                }
                for constraint in constraints {
                    if let TableConstraint::PrimaryKey(cols) | TableConstraint::Unique(cols) = constraint {
                        if let Some(missing) = cols.iter().find(|c| !own.contains(&c.as_str())) {
                            return Err(DbError::Query(format!(
                                "column \"{missing}\" named in key does not exist"
                            )));
                        }
                    }
                }
                Ok(true)
            }
            SchemaStep::AddColumn { table, column } => {
                self.require_table(table)?;
                if self.column_exists(table, &column.name) {
                    return Ok(false);
                }
                if let Some(fk) = &column.references {
                    self.require_target(table, &[column.name.as_str()], fk)?;
                }
                Ok(true)
            }
            SchemaStep::AddConstraint {
                table,
                name,
                constraint,
            } => {
                self.require_table(table)?;
                if self.has(&step.target()) {
                    return Err(DbError::Query(format!(
                        "constraint \"{name}\" for relation \"{table}\" already exists"
                    )));
                }
                match constraint {
                    ConstraintDef::Check(_) => {}
                    ConstraintDef::Unique(cols) => {
                        for c in cols {
                            self.require_column(table, c)?;
                        }
                    }
                    ConstraintDef::ForeignKey { column, references } => {
                        self.require_column(table, column)?;
                        self.require_target(table, &[], references)?;
                    }
                }
                Ok(true)
            }
            SchemaStep::CreateIndex {
                table, columns, ..
            } => {
                self.require_table(table)?;
                if self.has(&step.target()) {
                    return Ok(false);
                }
                for c in columns {
                    self.require_column(table, c)?;
                }
                Ok(true)
            }
        }
    }

    fn record_types(&self, step: &SchemaStep) {
        let mut types = self.column_types.borrow_mut();
        match step {
            SchemaStep::CreateTable { table, columns, .. } => {
                for c in columns {
                    types.insert((table.clone(), c.name.clone()), c.column_type.udt_name().to_string());
                }
            }
            SchemaStep::AddColumn { table, column } => {
                types.insert(
                    (table.clone(), column.name.clone()),
                    column.column_type.udt_name().to_string(),
                );
            }
            _ => {}
        }
    }

    fn record_constraints(&self, step: &SchemaStep, created: &[SchemaObject]) {
        let mut kinds = self.constraint_kinds.borrow_mut();
        for object in created {
            if let SchemaObject::Constraint { table, name } = object {
                let kind = match step {
                    SchemaStep::AddConstraint { constraint, .. } => constraint.kind(),
                    _ if name.ends_with("_pkey") => ConstraintKind::PrimaryKey,
                    _ if name.ends_with("_fkey") => ConstraintKind::ForeignKey,
                    _ if name.ends_with("_key") => ConstraintKind::Unique,
                    _ => ConstraintKind::Check,
                };
                kinds.insert((table.clone(), name.clone()), kind);
            }
        }
    }
}

impl SchemaSession for MemorySchema {
    fn object_exists(&self, object: &SchemaObject) -> Result<bool, DbError> {
        Ok(self.has(object))
    }

    fn column_type(&self, table: &str, column: &str) -> Result<Option<String>, DbError> {
        Ok(self
            .column_types
            .borrow()
            .get(&(table.to_string(), column.to_string()))
            .cloned())
    }

    fn constraint_kind(&self, table: &str, name: &str) -> Result<Option<ConstraintKind>, DbError> {
        Ok(self
            .constraint_kinds
            .borrow()
            .get(&(table.to_string(), name.to_string()))
            .copied())
    }

    fn apply(&self, step: &SchemaStep) -> Result<(), DbError> {
        let description = step.to_string();
        if self.fail_on.as_deref() == Some(description.as_str()) {
            return Err(DbError::Query(format!("permission denied while trying to {description}")));
        }
        if !self.check_step(step)? {
            return Ok(());
        }
        let created = step.creates();
        self.record_types(step);
        self.record_constraints(step, &created);
        self.objects.borrow_mut().extend(created);
        self.executed.borrow_mut().push(description);
        Ok(())
    }

    fn history(&self) -> Result<Vec<MigrationRecord>, DbError> {
        Ok(self.history.borrow().values().cloned().collect())
    }

    fn record(&self, record: &MigrationRecord) -> Result<(), DbError> {
        let mut history = self.history.borrow_mut();
        let applied_at = history
            .get(&record.version)
            .map_or(record.applied_at, |existing| existing.applied_at);
        history.insert(
            record.version,
            MigrationRecord {
                applied_at,
                ..record.clone()
            },
        );
        Ok(())
    }
}
