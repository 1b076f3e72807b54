//! Forward-only, idempotent schema migrations
//!
//! A [`Migration`] is an ordered list of [`SchemaStep`]s. Each step names the
//! object it creates; the [`Migrator`] probes for that object and executes the
//! step only when it is absent. Nothing is ever dropped or rolled back, so a
//! run interrupted halfway is repaired by running again.
//!
//! # Example
//!
//! ```rust,no_run
//! use forgedesk_admin::migration::{Migrator, SchemaManager};
//! use forgedesk_admin::{connect, migrations, PgExecutor};
//!
//! let client = connect("host=localhost user=postgres dbname=forge_desk_dev")?;
//! let executor = PgExecutor::new(client);
//! let report = Migrator::new(migrations::all()).run(&SchemaManager::new(&executor))?;
//! println!("{} step(s) applied", report.applied_count());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod checksum;
pub mod error;
pub mod migration;
pub mod migrator;
pub mod record;
pub mod render;
pub mod schema_manager;
pub mod state_table;
pub mod status;
pub mod step;

#[cfg(test)]
pub(crate) mod memory;

pub use checksum::migration_checksum;
pub use error::MigrationError;
pub use migration::Migration;
pub use migrator::{Migrator, MigratorOptions};
pub use record::MigrationRecord;
pub use render::quote_ident;
pub use schema_manager::{SchemaManager, SchemaSession};
pub use state_table::{history_table_step, HISTORY_TABLE};
pub use status::{
    MigrationReport, MigrationState, MigrationStatus, PlannedAction, PlannedStep, RunReport,
    StepOutcome, StepReport,
};
pub use step::{
    ColumnDefault, ColumnSpec, ColumnType, ConstraintDef, ConstraintKind, ForeignKeyRef, OnDelete,
    SchemaObject, SchemaStep, TableConstraint, TableForeignKey,
};
