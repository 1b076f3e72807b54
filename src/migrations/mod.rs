//! Migrations shipped with the admin service

mod m0001_configurator_tables;

pub use m0001_configurator_tables::ConfiguratorTables;

use crate::migration::Migration;

/// Every shipped migration, in version order
pub fn all() -> Vec<Box<dyn Migration>> {
    vec![Box::new(ConfiguratorTables)]
}
