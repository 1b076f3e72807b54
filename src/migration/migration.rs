//! Migration trait definition

use crate::migration::step::SchemaStep;

/// A forward-only, idempotent migration
///
/// There is no `down`: every step only ever adds, and re-running is always
/// safe, so recovery from a partial run is simply running again.
///
/// # Example
///
/// ```rust
/// use forgedesk_admin::migration::{ColumnSpec, ColumnType, Migration, SchemaStep};
///
/// pub struct AddJobNotes;
///
/// impl Migration for AddJobNotes {
///     fn name(&self) -> &str {
///         "add_job_notes"
///     }
///
///     fn version(&self) -> i64 {
///         2
///     }
///
///     fn steps(&self) -> Vec<SchemaStep> {
///         vec![SchemaStep::add_column_if_absent(
///             "configurator_jobs",
///             ColumnSpec::new("notes", ColumnType::Text).null(),
///         )]
///     }
/// }
/// ```
pub trait Migration {
    /// Human-readable migration name
    fn name(&self) -> &str;

    /// Version; migrations run in ascending version order
    fn version(&self) -> i64;

    /// Steps in the order they must be applied
    fn steps(&self) -> Vec<SchemaStep>;
}
