//! Migrator - interprets migrations against a [`SchemaSession`]

use crate::migration::checksum::migration_checksum;
use crate::migration::record::MigrationRecord;
use crate::migration::schema_manager::SchemaSession;
use crate::migration::state_table::history_table_step;
use crate::migration::status::{
    MigrationReport, MigrationState, MigrationStatus, PlannedAction, PlannedStep, RunReport,
    StepOutcome, StepReport,
};
use crate::migration::step::{SchemaObject, SchemaStep};
use crate::migration::{Migration, MigrationError};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

/// Knobs for [`Migrator`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigratorOptions {
    /// Fail when an existing column's type or an existing constraint's kind
    /// differs from its declaration. Off by default: presence is checked by
    /// name only, and drift is tolerated.
    pub strict_columns: bool,
    /// Maintain the `forgedesk_schema_migrations` history table
    pub record_history: bool,
}

impl Default for MigratorOptions {
    fn default() -> Self {
        Self {
            strict_columns: false,
            record_history: true,
        }
    }
}

/// Core migration execution engine
///
/// Runs every registered migration in ascending version order and every step
/// in declaration order. Each step probes for its target first: present means
/// skip, absent means execute. The first error aborts the run.
pub struct Migrator {
    migrations: Vec<Box<dyn Migration>>,
    options: MigratorOptions,
}

impl Migrator {
    /// Create a new Migrator over `migrations`, sorted by version
    pub fn new(mut migrations: Vec<Box<dyn Migration>>) -> Self {
        migrations.sort_by_key(|m| m.version());
        Self {
            migrations,
            options: MigratorOptions::default(),
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: MigratorOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> MigratorOptions {
        self.options
    }

    pub fn migrations(&self) -> &[Box<dyn Migration>] {
        &self.migrations
    }

    /// Check the declarations without touching a database
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::InvalidPlan` for duplicate versions, or for
    /// a step that fails [`SchemaStep::validate`].
    pub fn validate(&self) -> Result<(), MigrationError> {
        let mut seen: HashMap<i64, &str> = HashMap::new();
        for migration in &self.migrations {
            if let Some(other) = seen.insert(migration.version(), migration.name()) {
                return Err(MigrationError::InvalidPlan(format!(
                    "version {} is declared by both '{other}' and '{}'",
                    migration.version(),
                    migration.name()
                )));
            }
            for step in migration.steps() {
                step.validate().map_err(|msg| {
                    MigrationError::InvalidPlan(format!("{}: {msg}", migration.name()))
                })?;
            }
        }
        Ok(())
    }

    /// Apply every missing object
    ///
    /// # Arguments
    ///
    /// * `session` - The schema to migrate
    ///
    /// # Returns
    ///
    /// Returns a `RunReport` with the outcome of every step.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::StepFailed` for the first step the database
    /// rejects. Nothing after it is attempted and nothing before it is undone.
    /// In strict mode, drift is reported as `ColumnDrift` or `ConstraintDrift`.
    pub fn run(&self, session: &dyn SchemaSession) -> Result<RunReport, MigrationError> {
        self.validate()?;
        let started = Instant::now();

        let recorded: HashMap<i64, MigrationRecord> = if self.options.record_history {
            let step = history_table_step();
            self.apply_step(session, &step)
                .map_err(|e| self.history_failure(&step, e))?;
            session
                .history()?
                .into_iter()
                .map(|r| (r.version, r))
                .collect()
        } else {
            HashMap::new()
        };

        let mut report = RunReport::default();
        for migration in &self.migrations {
            let checksum = migration_checksum(migration.as_ref());
            if let Some(previous) = recorded.get(&migration.version()) {
                if previous.checksum != checksum {
                    log::warn!(
                        "Migration '{}' (version {}) changed since it was first applied (stored {}, current {})",
                        migration.name(),
                        migration.version(),
                        previous.checksum,
                        checksum
                    );
                }
            }

            let mut steps = Vec::new();
            for (index, step) in migration.steps().into_iter().enumerate() {
                let outcome = self.apply_step(session, &step).map_err(|e| match e {
                    StepError::Db(source) => MigrationError::StepFailed {
                        version: migration.version(),
                        migration: migration.name().to_string(),
                        index,
                        step: step.to_string(),
                        source,
                    },
                    StepError::Drift(drift) => drift,
                })?;
                match outcome {
                    StepOutcome::Applied => log::info!("applied: {step}"),
                    StepOutcome::Skipped => log::debug!("skipped, already present: {step}"),
                }
                steps.push(StepReport {
                    description: step.to_string(),
                    target: step.target(),
                    outcome,
                });
            }

            let migration_report = MigrationReport {
                version: migration.version(),
                name: migration.name().to_string(),
                checksum,
                steps,
            };

            if self.options.record_history {
                session.record(&MigrationRecord::new(
                    migration_report.version,
                    migration_report.name.clone(),
                    migration_report.checksum.clone(),
                    count_i32(migration_report.applied()),
                    count_i32(migration_report.skipped()),
                ))?;
            }
            report.migrations.push(migration_report);
        }

        log::info!(
            "migrations complete: {} step(s) applied, {} already present ({}ms)",
            report.applied_count(),
            report.skipped_count(),
            started.elapsed().as_millis()
        );
        Ok(report)
    }

    /// Dry run: what `run` would do against the current schema
    ///
    /// Objects created by an earlier pending step count as present for the
    /// steps after it, so the plan matches what a real run would execute.
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if a probe fails.
    pub fn plan(&self, session: &dyn SchemaSession) -> Result<Vec<PlannedStep>, MigrationError> {
        self.validate()?;
        let mut pending: HashSet<SchemaObject> = HashSet::new();
        let mut planned = Vec::new();

        for migration in &self.migrations {
            for step in migration.steps() {
                let target = step.target();
                let present = pending.contains(&target) || session.object_exists(&target)?;
                let action = if present {
                    PlannedAction::Skip
                } else {
                    pending.extend(step.creates());
                    PlannedAction::Apply
                };
                planned.push(PlannedStep {
                    version: migration.version(),
                    migration: migration.name().to_string(),
                    description: step.to_string(),
                    action,
                    sql: step.to_sql(),
                });
            }
        }
        Ok(planned)
    }

    /// Which declared objects are present
    ///
    /// # Errors
    ///
    /// Returns `MigrationError::Database` if a probe or the history read fails.
    pub fn status(&self, session: &dyn SchemaSession) -> Result<MigrationStatus, MigrationError> {
        let mut history: HashMap<i64, MigrationRecord> = session
            .history()?
            .into_iter()
            .map(|r| (r.version, r))
            .collect();

        let mut status = MigrationStatus::default();
        for migration in &self.migrations {
            let steps = migration.steps();
            let mut missing = Vec::new();
            for step in &steps {
                if !session.object_exists(&step.target())? {
                    missing.push(step.to_string());
                }
            }
            status.migrations.push(MigrationState {
                version: migration.version(),
                name: migration.name().to_string(),
                checksum: migration_checksum(migration.as_ref()),
                steps: steps.len(),
                missing,
                record: history.remove(&migration.version()),
            });
        }
        Ok(status)
    }

    fn apply_step(
        &self,
        session: &dyn SchemaSession,
        step: &SchemaStep,
    ) -> Result<StepOutcome, StepError> {
        if !session.object_exists(&step.target())? {
            session.apply(step)?;
            return Ok(StepOutcome::Applied);
        }
        if self.options.strict_columns {
            check_drift(session, step)?;
        }
        Ok(StepOutcome::Skipped)
    }

    fn history_failure(&self, step: &SchemaStep, error: StepError) -> MigrationError {
        match error {
            StepError::Db(source) => MigrationError::StepFailed {
                version: 0,
                migration: "history table".to_string(),
                index: 0,
                step: step.to_string(),
                source,
            },
            StepError::Drift(drift) => drift,
        }
    }
}

enum StepError {
    Db(crate::executor::DbError),
    Drift(MigrationError),
}

impl From<crate::executor::DbError> for StepError {
    fn from(e: crate::executor::DbError) -> Self {
        StepError::Db(e)
    }
}

fn check_drift(session: &dyn SchemaSession, step: &SchemaStep) -> Result<(), StepError> {
    match step {
        SchemaStep::AddColumn { table, column } => {
            let expected = column.column_type.udt_name();
            if let Some(found) = session.column_type(table, &column.name)? {
                if found != expected {
                    return Err(StepError::Drift(MigrationError::ColumnDrift {
                        table: table.clone(),
                        column: column.name.clone(),
                        expected: expected.to_string(),
                        found,
                    }));
                }
            }
        }
        SchemaStep::AddConstraint {
            table,
            name,
            constraint,
        } => {
            let expected = constraint.kind();
            if let Some(found) = session.constraint_kind(table, name)? {
                if found != expected {
                    return Err(StepError::Drift(MigrationError::ConstraintDrift {
                        table: table.clone(),
                        name: name.clone(),
                        expected,
                        found,
                    }));
                }
            }
        }
        SchemaStep::CreateTable { .. } | SchemaStep::CreateIndex { .. } => {}
    }
    Ok(())
}

fn count_i32(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}
