//! Migration status and run reporting

use crate::migration::record::MigrationRecord;
use crate::migration::step::SchemaObject;

/// Presence of one migration's declared objects
#[derive(Debug, Clone)]
pub struct MigrationState {
    pub version: i64,
    pub name: String,
    /// Checksum of the migration as currently declared
    pub checksum: String,
    /// Number of declared steps
    pub steps: usize,
    /// Descriptions of steps whose target is absent
    pub missing: Vec<String>,
    /// History row, when this migration has completed before
    pub record: Option<MigrationRecord>,
}

impl MigrationState {
    /// Every step's target is present
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty()
    }

    /// The stored checksum differs from the current declaration
    pub fn checksum_changed(&self) -> bool {
        self.record
            .as_ref()
            .is_some_and(|r| r.checksum != self.checksum)
    }
}

/// Migration status information
#[derive(Debug, Clone, Default)]
pub struct MigrationStatus {
    pub migrations: Vec<MigrationState>,
}

impl MigrationStatus {
    /// Migrations with at least one missing object
    pub fn pending_count(&self) -> usize {
        self.migrations.iter().filter(|m| !m.is_complete()).count()
    }

    /// Migrations whose objects are all present
    pub fn complete_count(&self) -> usize {
        self.migrations.len() - self.pending_count()
    }

    /// Nothing left to apply
    pub fn is_up_to_date(&self) -> bool {
        self.pending_count() == 0
    }
}

/// What happened to one step during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// The statement was executed
    Applied,
    /// The target already existed
    Skipped,
}

/// One step of a run
#[derive(Debug, Clone)]
pub struct StepReport {
    pub description: String,
    pub target: SchemaObject,
    pub outcome: StepOutcome,
}

/// One migration of a run
#[derive(Debug, Clone)]
pub struct MigrationReport {
    pub version: i64,
    pub name: String,
    pub checksum: String,
    pub steps: Vec<StepReport>,
}

impl MigrationReport {
    pub fn applied(&self) -> usize {
        self.count(StepOutcome::Applied)
    }

    pub fn skipped(&self) -> usize {
        self.count(StepOutcome::Skipped)
    }

    fn count(&self, outcome: StepOutcome) -> usize {
        self.steps.iter().filter(|s| s.outcome == outcome).count()
    }
}

/// Result of [`Migrator::run`](crate::migration::Migrator::run)
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub migrations: Vec<MigrationReport>,
}

impl RunReport {
    /// Steps executed across all migrations
    pub fn applied_count(&self) -> usize {
        self.migrations.iter().map(MigrationReport::applied).sum()
    }

    /// Steps skipped across all migrations
    pub fn skipped_count(&self) -> usize {
        self.migrations.iter().map(MigrationReport::skipped).sum()
    }

    /// Outcomes of every step in execution order
    pub fn outcomes(&self) -> Vec<StepOutcome> {
        self.migrations
            .iter()
            .flat_map(|m| m.steps.iter().map(|s| s.outcome))
            .collect()
    }
}

/// Whether a dry run expects a step to execute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannedAction {
    Apply,
    Skip,
}

/// One step of [`Migrator::plan`](crate::migration::Migrator::plan)
#[derive(Debug, Clone)]
pub struct PlannedStep {
    pub version: i64,
    pub migration: String,
    pub description: String,
    pub action: PlannedAction,
    pub sql: String,
}
