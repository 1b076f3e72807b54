//! Typed schema-change steps.
//!
//! A migration is an ordered list of [`SchemaStep`]s. Each step names the one
//! object whose presence turns it into a no-op ([`SchemaStep::target`]), which
//! is what makes a run safe to repeat or resume.

use serde::Serialize;
use std::fmt;

/// PostgreSQL limits identifiers to 63 bytes and silently truncates longer ones
pub const MAX_IDENTIFIER_LEN: usize = 63;

/// Column types the migrator knows how to declare
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ColumnType {
    /// `BIGSERIAL`: `BIGINT` backed by an owned sequence
    BigSerial,
    BigInt,
    Integer,
    Boolean,
    Text,
    Varchar(u32),
    Numeric { precision: u32, scale: u32 },
    Date,
    /// `TIMESTAMP` without time zone
    Timestamp,
    TimestampTz,
    Jsonb,
}

impl ColumnType {
    /// The `udt_name` PostgreSQL reports in `information_schema.columns`
    pub fn udt_name(&self) -> &'static str {
        match self {
            ColumnType::BigSerial | ColumnType::BigInt => "int8",
            ColumnType::Integer => "int4",
            ColumnType::Boolean => "bool",
            ColumnType::Text => "text",
            ColumnType::Varchar(_) => "varchar",
            ColumnType::Numeric { .. } => "numeric",
            ColumnType::Date => "date",
            ColumnType::Timestamp => "timestamp",
            ColumnType::TimestampTz => "timestamptz",
            ColumnType::Jsonb => "jsonb",
        }
    }
}

/// Column default expression
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ColumnDefault {
    Bool(bool),
    Int(i64),
    Text(String),
    /// `NOW()`
    Now,
}

/// Foreign key deletion policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OnDelete {
    Cascade,
    SetNull,
    Restrict,
    NoAction,
}

impl OnDelete {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
            OnDelete::Restrict => "RESTRICT",
            OnDelete::NoAction => "NO ACTION",
        }
    }
}

/// Target of a foreign key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyRef {
    pub table: String,
    pub column: String,
    pub on_delete: OnDelete,
}

impl ForeignKeyRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>, on_delete: OnDelete) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            on_delete,
        }
    }
}

/// A column declaration
///
/// `nullable` is tri-state: `None` emits neither `NULL` nor `NOT NULL`, which
/// `BIGSERIAL` and primary key columns need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: Option<bool>,
    pub default: Option<ColumnDefault>,
    pub primary_key: bool,
    pub unique: bool,
    pub references: Option<ForeignKeyRef>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: None,
            default: None,
            primary_key: false,
            unique: false,
            references: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = Some(false);
        self
    }

    pub fn null(mut self) -> Self {
        self.nullable = Some(true);
        self
    }

    pub fn default(mut self, default: ColumnDefault) -> Self {
        self.default = Some(default);
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    /// Inline `REFERENCES table(column) ON DELETE ...`
    pub fn references(
        mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        on_delete: OnDelete,
    ) -> Self {
        self.references = Some(ForeignKeyRef::new(table, column, on_delete));
        self
    }
}

/// Table-level constraint inside `CREATE TABLE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TableConstraint {
    PrimaryKey(Vec<String>),
    Unique(Vec<String>),
    Check { name: String, predicate: String },
}

/// Table-level foreign key inside `CREATE TABLE`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableForeignKey {
    pub column: String,
    pub references: ForeignKeyRef,
}

impl TableForeignKey {
    pub fn new(column: impl Into<String>, references: ForeignKeyRef) -> Self {
        Self {
            column: column.into(),
            references,
        }
    }
}

/// Body of a standalone `ADD CONSTRAINT`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum ConstraintDef {
    Check(String),
    Unique(Vec<String>),
    ForeignKey { column: String, references: ForeignKeyRef },
}

impl ConstraintDef {
    pub fn kind(&self) -> ConstraintKind {
        match self {
            ConstraintDef::Check(_) => ConstraintKind::Check,
            ConstraintDef::Unique(_) => ConstraintKind::Unique,
            ConstraintDef::ForeignKey { .. } => ConstraintKind::ForeignKey,
        }
    }
}

/// `pg_constraint.contype`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ConstraintKind {
    Check,
    Unique,
    PrimaryKey,
    ForeignKey,
    Exclusion,
}

impl ConstraintKind {
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "c" => Some(ConstraintKind::Check),
            "u" => Some(ConstraintKind::Unique),
            "p" => Some(ConstraintKind::PrimaryKey),
            "f" => Some(ConstraintKind::ForeignKey),
            "x" => Some(ConstraintKind::Exclusion),
            _ => None,
        }
    }
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ConstraintKind::Check => "CHECK",
            ConstraintKind::Unique => "UNIQUE",
            ConstraintKind::PrimaryKey => "PRIMARY KEY",
            ConstraintKind::ForeignKey => "FOREIGN KEY",
            ConstraintKind::Exclusion => "EXCLUDE",
        };
        f.write_str(s)
    }
}

/// A schema object whose existence can be probed
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum SchemaObject {
    Table { table: String },
    Column { table: String, column: String },
    Constraint { table: String, name: String },
    Index { name: String },
}

impl fmt::Display for SchemaObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaObject::Table { table } => write!(f, "table {table}"),
            SchemaObject::Column { table, column } => write!(f, "column {table}.{column}"),
            SchemaObject::Constraint { table, name } => write!(f, "constraint {name} on {table}"),
            SchemaObject::Index { name } => write!(f, "index {name}"),
        }
    }
}

/// One idempotent schema change
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaStep {
    CreateTable {
        table: String,
        columns: Vec<ColumnSpec>,
        constraints: Vec<TableConstraint>,
        foreign_keys: Vec<TableForeignKey>,
    },
    AddColumn {
        table: String,
        column: ColumnSpec,
    },
    AddConstraint {
        table: String,
        name: String,
        constraint: ConstraintDef,
    },
    CreateIndex {
        name: String,
        table: String,
        columns: Vec<String>,
        unique: bool,
    },
}

impl SchemaStep {
    pub fn create_table_if_absent(
        table: impl Into<String>,
        columns: Vec<ColumnSpec>,
        constraints: Vec<TableConstraint>,
        foreign_keys: Vec<TableForeignKey>,
    ) -> Self {
        SchemaStep::CreateTable {
            table: table.into(),
            columns,
            constraints,
            foreign_keys,
        }
    }

    pub fn add_column_if_absent(table: impl Into<String>, column: ColumnSpec) -> Self {
        SchemaStep::AddColumn {
            table: table.into(),
            column,
        }
    }

    pub fn add_constraint_if_absent(
        table: impl Into<String>,
        name: impl Into<String>,
        constraint: ConstraintDef,
    ) -> Self {
        SchemaStep::AddConstraint {
            table: table.into(),
            name: name.into(),
            constraint,
        }
    }

    pub fn create_index_if_absent(
        name: impl Into<String>,
        table: impl Into<String>,
        columns: &[&str],
        unique: bool,
    ) -> Self {
        SchemaStep::CreateIndex {
            name: name.into(),
            table: table.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            unique,
        }
    }

    /// Table this step acts on
    pub fn table(&self) -> &str {
        match self {
            SchemaStep::CreateTable { table, .. }
            | SchemaStep::AddColumn { table, .. }
            | SchemaStep::AddConstraint { table, .. }
            | SchemaStep::CreateIndex { table, .. } => table,
        }
    }

    /// The object whose presence makes this step a no-op
    pub fn target(&self) -> SchemaObject {
        match self {
            SchemaStep::CreateTable { table, .. } => SchemaObject::Table {
                table: table.clone(),
            },
            SchemaStep::AddColumn { table, column } => SchemaObject::Column {
                table: table.clone(),
                column: column.name.clone(),
            },
            SchemaStep::AddConstraint { table, name, .. } => SchemaObject::Constraint {
                table: table.clone(),
                name: name.clone(),
            },
            SchemaStep::CreateIndex { name, .. } => SchemaObject::Index { name: name.clone() },
        }
    }

    /// Every object that exists once this step has been applied
    ///
    /// Constraint and index names PostgreSQL generates implicitly follow its
    /// default naming (`{table}_pkey`, `{table}_{cols}_key`, `{table}_{col}_fkey`).
    pub fn creates(&self) -> Vec<SchemaObject> {
        let mut out = vec![self.target()];
        match self {
            SchemaStep::CreateTable {
                table,
                columns,
                constraints,
                foreign_keys,
            } => {
                for column in columns {
                    out.push(SchemaObject::Column {
                        table: table.clone(),
                        column: column.name.clone(),
                    });
                    if column.primary_key {
                        push_keyed(&mut out, table, format!("{table}_pkey"));
                    }
                    if column.unique {
                        push_keyed(&mut out, table, format!("{table}_{}_key", column.name));
                    }
                    if column.references.is_some() {
                        out.push(constraint(table, format!("{table}_{}_fkey", column.name)));
                    }
                }
                for c in constraints {
                    match c {
                        TableConstraint::PrimaryKey(_) => {
                            push_keyed(&mut out, table, format!("{table}_pkey"));
                        }
                        TableConstraint::Unique(cols) => {
                            push_keyed(&mut out, table, format!("{table}_{}_key", cols.join("_")));
                        }
                        TableConstraint::Check { name, .. } => {
                            out.push(constraint(table, name.clone()));
                        }
                    }
                }
                for fk in foreign_keys {
                    out.push(constraint(table, format!("{table}_{}_fkey", fk.column)));
                }
            }
            SchemaStep::AddColumn { table, column } => {
                if column.references.is_some() {
                    out.push(constraint(table, format!("{table}_{}_fkey", column.name)));
                }
            }
            SchemaStep::AddConstraint {
                name,
                constraint: ConstraintDef::Unique(_),
                ..
            } => {
                out.push(SchemaObject::Index { name: name.clone() });
            }
            SchemaStep::AddConstraint { .. } | SchemaStep::CreateIndex { .. } => {}
        }
        out
    }

    /// Structural checks that do not need a database
    ///
    /// # Errors
    ///
    /// Returns a message naming the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        let mut names: Vec<&str> = vec![self.table()];
        match self {
            SchemaStep::CreateTable {
                columns,
                constraints,
                ..
            } => {
                if columns.is_empty() {
                    return Err(format!("{self}: a table needs at least one column"));
                }
                names.extend(columns.iter().map(|c| c.name.as_str()));
                for c in constraints {
                    if let TableConstraint::Check { name, predicate } = c {
                        names.push(name);
                        if predicate.trim().is_empty() {
                            return Err(format!("{self}: check {name} has an empty predicate"));
                        }
                    }
                }
            }
            SchemaStep::AddColumn { column, .. } => names.push(&column.name),
            SchemaStep::AddConstraint {
                name, constraint, ..
            } => {
                names.push(name);
                if let ConstraintDef::Check(predicate) = constraint {
                    if predicate.trim().is_empty() {
                        return Err(format!("{self}: empty check predicate"));
                    }
                }
            }
            SchemaStep::CreateIndex { name, columns, .. } => {
                names.push(name);
                if columns.is_empty() {
                    return Err(format!("{self}: an index needs at least one column"));
                }
            }
        }

        for name in names {
            if name.is_empty() {
                return Err(format!("{self}: empty identifier"));
            }
            if name.len() > MAX_IDENTIFIER_LEN {
                return Err(format!(
                    "{self}: identifier '{name}' is longer than {MAX_IDENTIFIER_LEN} bytes"
                ));
            }
        }
        Ok(())
    }
}

fn constraint(table: &str, name: String) -> SchemaObject {
    SchemaObject::Constraint {
        table: table.to_string(),
        name,
    }
}

// Primary keys and unique constraints are backed by an index of the same name.
fn push_keyed(out: &mut Vec<SchemaObject>, table: &str, name: String) {
    out.push(SchemaObject::Index { name: name.clone() });
    out.push(constraint(table, name));
}

impl fmt::Display for SchemaStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaStep::CreateTable { table, .. } => write!(f, "create table {table}"),
            SchemaStep::AddColumn { table, column } => {
                write!(f, "add column {table}.{}", column.name)
            }
            SchemaStep::AddConstraint { table, name, .. } => {
                write!(f, "add constraint {name} on {table}")
            }
            SchemaStep::CreateIndex {
                name,
                table,
                unique,
                ..
            } => {
                let kind = if *unique { "unique index" } else { "index" };
                write!(f, "create {kind} {name} on {table}")
            }
        }
    }
}
