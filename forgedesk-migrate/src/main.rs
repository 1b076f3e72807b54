//! ForgeDesk Migration CLI Tool
//!
//! Applies the configurator migrations, previews them, reports schema status
//! and exports the entity catalog for the admin UI.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use forgedesk_admin::catalog::{Catalog, CatalogError, DeletionPlan};
use forgedesk_admin::connection::redact;
use forgedesk_admin::migration::{MigrationStatus, PlannedAction, PlannedStep, StepOutcome};
use forgedesk_admin::{
    connect, migrations, AdminSettings, ConnectionError, MigrationError, Migrator,
    MigratorOptions, PgExecutor, SchemaManager,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process;

#[derive(Parser)]
#[command(name = "forgedesk-migrate")]
#[command(about = "Schema migrations and entity catalog for the ForgeDesk admin")]
#[command(version = "0.1.0")]
struct Cli {
    /// Database connection URL
    #[arg(long, global = true)]
    database_url: Option<String>,

    /// Settings file
    #[arg(long, global = true, default_value = forgedesk_admin::config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Quiet output (errors only)
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create every missing configurator object
    Up {
        /// Fail when an existing column or constraint differs from its declaration
        #[arg(long)]
        strict_columns: bool,

        /// Do not write the history table
        #[arg(long)]
        no_history: bool,
    },

    /// Show the SQL `up` would execute, without running it
    Plan {
        /// Print the pending steps as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show present and missing objects per migration
    Status {
        /// Print the status as JSON
        #[arg(long)]
        json: bool,
    },

    /// Export the entity catalog as JSON
    Catalog {
        #[arg(long)]
        pretty: bool,
    },

    /// Show what deleting a row of an entity would cascade to
    DeletePlan {
        /// Entity name, e.g. `PurchaseOrder`
        entity: String,
    },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("failed to connect to {url}: {source}")]
    Connection {
        url: String,
        #[source]
        source: ConnectionError,
    },
    #[error(transparent)]
    Migration(#[from] MigrationError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

fn main() {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    let level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(&cli) {
        Ok(()) => {
            if !cli.quiet {
                eprintln!("{}", "✅ Success".green());
            }
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{} {e:#}", "❌ Error:".red());
            process::exit(1);
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    match &cli.command {
        Commands::Catalog { pretty } => handle_catalog(*pretty),
        Commands::DeletePlan { entity } => handle_delete_plan(entity),
        Commands::Up {
            strict_columns,
            no_history,
        } => {
            let executor = open(cli)?;
            let options = MigratorOptions {
                strict_columns: *strict_columns,
                record_history: !*no_history,
            };
            handle_up(&migrator().with_options(options), &executor)
        }
        Commands::Plan { json } => handle_plan(&migrator(), &open(cli)?, *json),
        Commands::Status { json } => handle_status(&migrator(), &open(cli)?, *json),
    }
}

fn migrator() -> Migrator {
    Migrator::new(migrations::all())
}

/// Resolve the database URL and connect
fn open(cli: &Cli) -> anyhow::Result<PgExecutor> {
    let url = resolve_url(cli.database_url.as_deref(), &cli.config, None)?;
    log::info!("connecting to {}", redact(&url));
    let client = connect(&url).map_err(|source| CliError::Connection {
        url: redact(&url),
        source,
    })?;
    Ok(PgExecutor::new(client))
}

/// `--database-url`, then `FORGEDESK_DATABASE_URL`, then `DATABASE_URL`,
/// then the settings file and `DB_*` variables
///
/// Blank values are skipped. With nothing configured the settings defaults
/// point at the development database. `env` replaces the process environment
/// when given.
fn resolve_url(
    flag: Option<&str>,
    config: &Path,
    env: Option<HashMap<String, String>>,
) -> anyhow::Result<String> {
    let var = |key: &str| match &env {
        Some(map) => map.get(key).cloned(),
        None => std::env::var(key).ok(),
    };
    let explicit = [
        flag.map(str::to_string),
        var("FORGEDESK_DATABASE_URL"),
        var("DATABASE_URL"),
    ]
    .into_iter()
    .flatten()
    .find(|url| !url.trim().is_empty());
    if let Some(url) = explicit {
        return Ok(url);
    }

    let settings = AdminSettings::load_from(config, env)
        .with_context(|| format!("failed to load settings from {}", config.display()))?;
    Ok(settings.database.connection_string())
}

fn handle_up(migrator: &Migrator, executor: &PgExecutor) -> anyhow::Result<()> {
    let session = SchemaManager::new(executor);
    println!("Applying migrations...");
    let report = migrator.run(&session).map_err(CliError::from)?;

    for migration in &report.migrations {
        println!(
            "\n📦 m{:04}_{} ({} applied, {} skipped)",
            migration.version,
            migration.name,
            migration.applied(),
            migration.skipped()
        );
        for step in &migration.steps {
            match step.outcome {
                StepOutcome::Applied => println!("  {} {}", "✓".green(), step.description),
                StepOutcome::Skipped => {
                    println!("  {} {}", "·".dimmed(), step.description.dimmed());
                }
            }
        }
    }

    if report.applied_count() > 0 {
        println!("\n✅ Applied {} step(s)", report.applied_count());
    } else {
        println!("\n✅ Schema already up to date");
    }
    Ok(())
}

fn handle_plan(migrator: &Migrator, executor: &PgExecutor, as_json: bool) -> anyhow::Result<()> {
    let session = SchemaManager::new(executor);
    let plan = migrator.plan(&session).map_err(CliError::from)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&plan_json(&plan))?);
        return Ok(());
    }

    let pending: Vec<_> = plan
        .iter()
        .filter(|s| s.action == PlannedAction::Apply)
        .collect();
    if pending.is_empty() {
        println!("No pending steps");
        return Ok(());
    }

    println!("Would apply {} step(s):\n", pending.len());
    for step in pending {
        println!("-- m{:04}_{}: {}", step.version, step.migration, step.description);
        println!("{};\n", step.sql);
    }
    Ok(())
}

fn handle_status(migrator: &Migrator, executor: &PgExecutor, as_json: bool) -> anyhow::Result<()> {
    let session = SchemaManager::new(executor);
    let status = migrator.status(&session).map_err(CliError::from)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&status_json(&status))?);
        return Ok(());
    }

    println!("\n📊 Migration Status\n");
    for state in &status.migrations {
        let marker = if state.is_complete() {
            "✅".to_string()
        } else {
            "⏳".to_string()
        };
        println!(
            "{marker} m{:04}_{} ({}/{} objects present)",
            state.version,
            state.name,
            state.steps - state.missing.len(),
            state.steps
        );
        match &state.record {
            Some(record) => {
                println!(
                    "    first applied {}, last run {} ({} applied, {} skipped)",
                    record.applied_at.format("%Y-%m-%d %H:%M:%S"),
                    record.last_run_at.format("%Y-%m-%d %H:%M:%S"),
                    record.steps_applied,
                    record.steps_skipped
                );
                if state.checksum_changed() {
                    println!("    {}", "checksum changed since the last run".yellow());
                }
            }
            None => println!("    {}", "no history".dimmed()),
        }
        for missing in &state.missing {
            println!("    {} {missing}", "missing:".yellow());
        }
    }

    println!(
        "\n📈 Summary: {} complete, {} pending",
        status.complete_count(),
        status.pending_count()
    );
    Ok(())
}

/// Pending steps only, in execution order
fn plan_json(plan: &[PlannedStep]) -> Value {
    let pending: Vec<Value> = plan
        .iter()
        .filter(|s| s.action == PlannedAction::Apply)
        .map(|s| {
            json!({
                "version": s.version,
                "migration": s.migration,
                "description": s.description,
                "sql": s.sql,
            })
        })
        .collect();
    json!({ "pending": pending })
}

fn status_json(status: &MigrationStatus) -> Value {
    let migrations: Vec<Value> = status
        .migrations
        .iter()
        .map(|state| {
            let history = state.record.as_ref().map(|r| {
                json!({
                    "applied_at": r.applied_at.to_rfc3339(),
                    "last_run_at": r.last_run_at.to_rfc3339(),
                    "steps_applied": r.steps_applied,
                    "steps_skipped": r.steps_skipped,
                })
            });
            json!({
                "version": state.version,
                "name": state.name,
                "checksum": state.checksum,
                "complete": state.is_complete(),
                "checksum_changed": state.checksum_changed(),
                "steps": state.steps,
                "missing": state.missing,
                "history": history,
            })
        })
        .collect();
    json!({
        "up_to_date": status.is_up_to_date(),
        "complete": status.complete_count(),
        "pending": status.pending_count(),
        "migrations": migrations,
    })
}

fn handle_catalog(pretty: bool) -> anyhow::Result<()> {
    let catalog = Catalog::all();
    catalog.validate().map_err(CliError::from)?;
    let json = catalog.to_json_string(pretty).map_err(CliError::from)?;
    println!("{json}");
    Ok(())
}

fn handle_delete_plan(entity: &str) -> anyhow::Result<()> {
    let plan = DeletionPlan::collect(&Catalog::all(), entity).map_err(CliError::from)?;
    print!("{plan}");
    if plan.is_blocked() {
        println!("{}", "⚠️  Rows referenced through a restricted relation cannot be deleted".yellow());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use forgedesk_admin::migration::{MigrationRecord, MigrationState};

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    fn no_file() -> &'static Path {
        Path::new("does/not/exist.toml")
    }

    #[test]
    fn test_flag_wins_over_environment() {
        let url = resolve_url(
            Some("postgres://flag/db"),
            no_file(),
            env(&[("FORGEDESK_DATABASE_URL", "postgres://forgedesk/db")]),
        )
        .unwrap();
        assert_eq!(url, "postgres://flag/db");
    }

    #[test]
    fn test_blank_url_falls_through_to_next_source() {
        let url = resolve_url(
            Some(" "),
            no_file(),
            env(&[("FORGEDESK_DATABASE_URL", ""), ("DATABASE_URL", "postgres://plain/db")]),
        )
        .unwrap();
        assert_eq!(url, "postgres://plain/db");
    }

    #[test]
    fn test_legacy_variables_build_connection_string() {
        let url = resolve_url(None, no_file(), env(&[("DB_HOST", "db.internal"), ("DB_NAME", "forge_prod")]))
            .unwrap();
        assert!(url.starts_with("host=db.internal port=5433 dbname=forge_prod "));
    }

    #[test]
    fn test_nothing_configured_uses_development_database() {
        let url = resolve_url(None, no_file(), env(&[])).unwrap();
        assert_eq!(url, AdminSettings::default().database.connection_string());
        assert!(url.contains("host=postgres port=5433"));
    }

    #[test]
    fn test_plan_json_lists_pending_steps_only() {
        let step = |description: &str, action| PlannedStep {
            version: 1,
            migration: "configurator_tables".to_string(),
            description: description.to_string(),
            action,
            sql: format!("-- {description}"),
        };
        let plan = vec![
            step("create table configurator_part_use_options", PlannedAction::Skip),
            step("create table configurator_jobs", PlannedAction::Apply),
        ];

        let value = plan_json(&plan);
        let pending = value["pending"].as_array().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0]["description"], "create table configurator_jobs");
        assert_eq!(pending[0]["version"], 1);
        assert_eq!(pending[0]["sql"], "-- create table configurator_jobs");
    }

    #[test]
    fn test_status_json_reports_missing_objects_and_history() {
        let record = MigrationRecord::new(1, "configurator_tables".to_string(), "old".to_string(), 14, 2);
        let status = MigrationStatus {
            migrations: vec![MigrationState {
                version: 1,
                name: "configurator_tables".to_string(),
                checksum: "new".to_string(),
                steps: 16,
                missing: vec!["create table configurator_jobs".to_string()],
                record: Some(record),
            }],
        };

        let value = status_json(&status);
        assert_eq!(value["up_to_date"], false);
        assert_eq!(value["pending"], 1);
        let migration = &value["migrations"][0];
        assert_eq!(migration["complete"], false);
        assert_eq!(migration["checksum_changed"], true);
        assert_eq!(migration["missing"][0], "create table configurator_jobs");
        assert_eq!(migration["history"]["steps_applied"], 14);
    }

    #[test]
    fn test_status_json_without_history_is_null() {
        let status = MigrationStatus {
            migrations: vec![MigrationState {
                version: 1,
                name: "configurator_tables".to_string(),
                checksum: "abc".to_string(),
                steps: 16,
                missing: vec![],
                record: None,
            }],
        };

        let value = status_json(&status);
        assert_eq!(value["up_to_date"], true);
        assert!(value["migrations"][0]["history"].is_null());
    }
}
