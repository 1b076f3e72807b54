//! # ForgeDesk Admin
//!
//! Data layer of the ForgeDesk warehouse backoffice: an idempotent,
//! forward-only schema migrator and a declarative catalog of the warehouse
//! entities for the admin UI.
//!
//! The warehouse schema itself belongs to an external system. This crate only
//! adds the configurator tables ([`migrations`]) and describes the existing
//! tables ([`catalog`]).

pub mod catalog;
pub mod config;
pub mod connection;
pub mod executor;
pub mod migration;
pub mod migrations;
pub mod value_conversion;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers;

pub use catalog::{Catalog, CatalogError, Entity, EntityMeta};
pub use config::{AdminSettings, DatabaseConfig};
pub use connection::{connect, ConnectionError};
pub use executor::{DbError, DbExecutor, PgExecutor};
pub use migration::{MigrationError, Migrator, MigratorOptions, SchemaManager};
