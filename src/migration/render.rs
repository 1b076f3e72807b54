//! PostgreSQL rendering for [`SchemaStep`].
//!
//! Columns, `ALTER TABLE ... ADD COLUMN` and indexes go through SeaQuery.
//! Named table constraints have no SeaQuery builder, so they are rendered as
//! text and spliced into the same `CREATE TABLE` statement to keep the step
//! a single statement.

use crate::migration::step::{
    ColumnDefault, ColumnSpec, ColumnType, ConstraintDef, ForeignKeyRef, SchemaStep,
    TableConstraint, TableForeignKey,
};
use sea_query::{ColumnDef, Expr, Index, PostgresQueryBuilder, Table};

/// Double-quote an identifier, doubling embedded quotes
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn quote_list(idents: &[String]) -> String {
    idents
        .iter()
        .map(|i| quote_ident(i))
        .collect::<Vec<_>>()
        .join(", ")
}

fn references_clause(fk: &ForeignKeyRef) -> String {
    format!(
        "REFERENCES {} ({}) ON DELETE {}",
        quote_ident(&fk.table),
        quote_ident(&fk.column),
        fk.on_delete.as_sql()
    )
}

fn column_def(spec: &ColumnSpec) -> ColumnDef {
    let mut def = ColumnDef::new(spec.name.clone());
    match spec.column_type {
        ColumnType::BigSerial => {
            def.big_integer().auto_increment();
        }
        ColumnType::BigInt => {
            def.big_integer();
        }
        ColumnType::Integer => {
            def.integer();
        }
        ColumnType::Boolean => {
            def.boolean();
        }
        ColumnType::Text => {
            def.text();
        }
        ColumnType::Varchar(len) => {
            def.string_len(len);
        }
        ColumnType::Numeric { precision, scale } => {
            def.decimal_len(precision, scale);
        }
        ColumnType::Date => {
            def.date();
        }
        ColumnType::Timestamp => {
            def.timestamp();
        }
        ColumnType::TimestampTz => {
            def.timestamp_with_time_zone();
        }
        ColumnType::Jsonb => {
            def.json_binary();
        }
    }

    match spec.nullable {
        Some(true) => {
            def.null();
        }
        Some(false) => {
            def.not_null();
        }
        None => {}
    }

    match &spec.default {
        Some(ColumnDefault::Bool(b)) => {
            def.default(*b);
        }
        Some(ColumnDefault::Int(i)) => {
            def.default(*i);
        }
        Some(ColumnDefault::Text(s)) => {
            def.default(s.clone());
        }
        Some(ColumnDefault::Now) => {
            def.default(Expr::cust("NOW()"));
        }
        None => {}
    }

    if spec.primary_key {
        def.primary_key();
    }
    if spec.unique {
        def.unique_key();
    }
    if let Some(fk) = &spec.references {
        def.extra(references_clause(fk));
    }
    def
}

fn table_constraint_sql(constraint: &TableConstraint) -> String {
    match constraint {
        TableConstraint::PrimaryKey(cols) => format!("PRIMARY KEY ({})", quote_list(cols)),
        TableConstraint::Unique(cols) => format!("UNIQUE ({})", quote_list(cols)),
        TableConstraint::Check { name, predicate } => {
            format!("CONSTRAINT {} CHECK ({predicate})", quote_ident(name))
        }
    }
}

fn table_foreign_key_sql(fk: &TableForeignKey) -> String {
    format!(
        "FOREIGN KEY ({}) {}",
        quote_ident(&fk.column),
        references_clause(&fk.references)
    )
}

fn create_table_sql(
    table: &str,
    columns: &[ColumnSpec],
    constraints: &[TableConstraint],
    foreign_keys: &[TableForeignKey],
) -> String {
    let mut stmt = Table::create();
    stmt.table(table.to_string()).if_not_exists();
    for column in columns {
        let mut def = column_def(column);
        stmt.col(&mut def);
    }
    let sql = stmt.build(PostgresQueryBuilder);

    let extra: Vec<String> = constraints
        .iter()
        .map(table_constraint_sql)
        .chain(foreign_keys.iter().map(table_foreign_key_sql))
        .collect();
    if extra.is_empty() {
        return sql;
    }

    let trimmed = sql.trim_end();
    match trimmed.rfind(')') {
        Some(pos) => format!("{}, {} )", trimmed[..pos].trim_end(), extra.join(", ")),
        None => sql,
    }
}

fn add_constraint_sql(table: &str, name: &str, constraint: &ConstraintDef) -> String {
    let body = match constraint {
        ConstraintDef::Check(predicate) => format!("CHECK ({predicate})"),
        ConstraintDef::Unique(cols) => format!("UNIQUE ({})", quote_list(cols)),
        ConstraintDef::ForeignKey { column, references } => format!(
            "FOREIGN KEY ({}) {}",
            quote_ident(column),
            references_clause(references)
        ),
    };
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} {body}",
        quote_ident(table),
        quote_ident(name)
    )
}

impl SchemaStep {
    /// Render this step as a single PostgreSQL statement
    ///
    /// Tables, columns and indexes carry `IF NOT EXISTS`. PostgreSQL has no
    /// such clause for `ADD CONSTRAINT`, so that step relies entirely on the
    /// migrator's existence probe.
    pub fn to_sql(&self) -> String {
        match self {
            SchemaStep::CreateTable {
                table,
                columns,
                constraints,
                foreign_keys,
            } => create_table_sql(table, columns, constraints, foreign_keys),
            SchemaStep::AddColumn { table, column } => {
                let mut def = column_def(column);
                Table::alter()
                    .table(table.clone())
                    .add_column_if_not_exists(&mut def)
                    .to_owned()
                    .build(PostgresQueryBuilder)
            }
            SchemaStep::AddConstraint {
                table,
                name,
                constraint,
            } => add_constraint_sql(table, name, constraint),
            SchemaStep::CreateIndex {
                name,
                table,
                columns,
                unique,
            } => {
                let mut index = Index::create();
                index.if_not_exists().name(name.clone()).table(table.clone());
                for column in columns {
                    index.col(Expr::col(column.clone()));
                }
                if *unique {
                    index.unique();
                }
                index.build(PostgresQueryBuilder)
            }
        }
    }
}
