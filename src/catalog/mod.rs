//! Entity catalog
//!
//! Declarative description of the warehouse tables for the admin UI: one
//! typed record per table, plus static metadata ([`EntityMeta`]) covering
//! field kinds, deletion policies, list columns, search fields, filters and
//! inline editors. The tables themselves belong to the warehouse system;
//! nothing here creates or alters them.
//!
//! # Example
//!
//! ```rust
//! use forgedesk_admin::catalog::Catalog;
//!
//! let catalog = Catalog::all();
//! let supplier = catalog.entity("Supplier")?;
//! assert_eq!(supplier.table, "suppliers");
//! # Ok::<(), forgedesk_admin::catalog::CatalogError>(())
//! ```

pub mod cycle_counts;
pub mod deletion;
pub mod forms;
pub mod inventory;
pub mod listing;
pub mod maintenance;
pub mod meta;
pub mod purchasing;
pub mod reservations;
pub mod transactions;

pub use cycle_counts::{CycleCountLine, CycleCountSession};
pub use deletion::{DeletionEffect, DeletionPlan};
pub use forms::{check_unique, unique_checks, validate_form, FormErrors, FormMode, UniqueCheck};
pub use inventory::{InventoryItem, InventoryItemLocation, InventoryMetric, StorageLocation};
pub use listing::{count, fetch, ListQuery};
pub use maintenance::{MaintenanceMachine, MaintenanceRecord, MaintenanceTask};
pub use meta::{
    AdminOptions, DeletionPolicy, DerivedField, Entity, EntityMeta, FieldKind, FieldMeta,
    InlineMeta,
};
pub use purchasing::{
    PurchaseOrder, PurchaseOrderLine, PurchaseOrderReceipt, PurchaseOrderReceiptLine,
    ReceiptTotals, Supplier,
};
pub use reservations::{JobReservation, JobReservationItem};
pub use transactions::{InventoryTransaction, InventoryTransactionLine};

use crate::executor::DbError;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

/// Separator of `relation__field` lookups
pub const LOOKUP_SEP: &str = "__";

/// Catalog errors
#[derive(Debug)]
pub enum CatalogError {
    UnknownEntity(String),
    UnknownField { entity: String, field: String },
    /// A lookup path that does not resolve to a field
    InvalidLookup {
        entity: String,
        path: String,
        reason: String,
    },
    /// The catalog contradicts itself (duplicate names, dangling references)
    Inconsistent(String),
    Export(serde_json::Error),
    Database(DbError),
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::UnknownEntity(name) => write!(f, "Unknown entity: {name}"),
            CatalogError::UnknownField { entity, field } => {
                write!(f, "Unknown field '{field}' on {entity}")
            }
            CatalogError::InvalidLookup {
                entity,
                path,
                reason,
            } => write!(f, "Invalid lookup '{path}' on {entity}: {reason}"),
            CatalogError::Inconsistent(msg) => write!(f, "Inconsistent catalog: {msg}"),
            CatalogError::Export(e) => write!(f, "Catalog export failed: {e}"),
            CatalogError::Database(e) => write!(f, "Catalog query failed: {e}"),
        }
    }
}

impl std::error::Error for CatalogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CatalogError::Export(e) => Some(e),
            CatalogError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(e: serde_json::Error) -> Self {
        CatalogError::Export(e)
    }
}

impl From<DbError> for CatalogError {
    fn from(e: DbError) -> Self {
        CatalogError::Database(e)
    }
}

/// One foreign key followed while resolving a lookup
#[derive(Debug, Clone, Copy)]
pub struct Hop {
    pub from: &'static EntityMeta,
    pub field: &'static FieldMeta,
    pub to: &'static EntityMeta,
}

/// A resolved `relation__field` path
#[derive(Debug, Clone)]
pub struct Lookup {
    pub hops: Vec<Hop>,
    /// Entity owning the final field
    pub entity: &'static EntityMeta,
    pub field: &'static FieldMeta,
}

/// Registry of every entity the admin knows about
#[derive(Debug, Clone, Serialize)]
pub struct Catalog {
    entities: Vec<&'static EntityMeta>,
}

impl Catalog {
    /// Every warehouse entity
    pub fn all() -> Self {
        Self {
            entities: vec![
                &inventory::INVENTORY_ITEM,
                &inventory::STORAGE_LOCATION,
                &inventory::INVENTORY_ITEM_LOCATION,
                &inventory::INVENTORY_METRIC,
                &reservations::JOB_RESERVATION,
                &reservations::JOB_RESERVATION_ITEM,
                &cycle_counts::CYCLE_COUNT_SESSION,
                &cycle_counts::CYCLE_COUNT_LINE,
                &transactions::INVENTORY_TRANSACTION,
                &transactions::INVENTORY_TRANSACTION_LINE,
                &purchasing::SUPPLIER,
                &purchasing::PURCHASE_ORDER,
                &purchasing::PURCHASE_ORDER_LINE,
                &purchasing::PURCHASE_ORDER_RECEIPT,
                &purchasing::PURCHASE_ORDER_RECEIPT_LINE,
                &maintenance::MAINTENANCE_MACHINE,
                &maintenance::MAINTENANCE_TASK,
                &maintenance::MAINTENANCE_RECORD,
            ],
        }
    }

    /// A catalog over an explicit set of entities
    pub fn from_entities(entities: Vec<&'static EntityMeta>) -> Self {
        Self { entities }
    }

    pub fn entities(&self) -> &[&'static EntityMeta] {
        &self.entities
    }

    /// Entities with an admin page of their own
    pub fn registered(&self) -> impl Iterator<Item = &'static EntityMeta> + '_ {
        self.entities.iter().copied().filter(|e| e.admin.is_some())
    }

    pub fn get(&self, name: &str) -> Option<&'static EntityMeta> {
        self.entities.iter().copied().find(|e| e.name == name)
    }

    pub fn by_table(&self, table: &str) -> Option<&'static EntityMeta> {
        self.entities.iter().copied().find(|e| e.table == table)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::UnknownEntity` if no entity has this name.
    pub fn entity(&self, name: &str) -> Result<&'static EntityMeta, CatalogError> {
        self.get(name)
            .ok_or_else(|| CatalogError::UnknownEntity(name.to_string()))
    }

    /// Foreign keys pointing at `target`, as `(referencing entity, field)`
    pub fn referencing(&self, target: &str) -> Vec<(&'static EntityMeta, &'static FieldMeta)> {
        self.entities
            .iter()
            .flat_map(|e| e.relations().map(move |f| (*e, f)))
            .filter(|(_, f)| f.relation().is_some_and(|(t, _)| t == target))
            .collect()
    }

    /// Resolve `path` (`field` or `relation__...__field`) from `entity`
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::InvalidLookup` when a segment is unknown or an
    /// intermediate segment is not a foreign key.
    pub fn resolve(
        &self,
        entity: &'static EntityMeta,
        path: &str,
    ) -> Result<Lookup, CatalogError> {
        let invalid = |reason: String| CatalogError::InvalidLookup {
            entity: entity.name.to_string(),
            path: path.to_string(),
            reason,
        };

        let segments: Vec<&str> = path.split(LOOKUP_SEP).collect();
        let (last, relations) = segments
            .split_last()
            .ok_or_else(|| invalid("empty path".to_string()))?;

        let mut current = entity;
        let mut hops = Vec::with_capacity(relations.len());
        for segment in relations {
            let field = current
                .field(segment)
                .ok_or_else(|| invalid(format!("{} has no field '{segment}'", current.name)))?;
            let (target, _) = field
                .relation()
                .ok_or_else(|| invalid(format!("{}.{segment} is not a relation", current.name)))?;
            let to = self
                .get(target)
                .ok_or_else(|| invalid(format!("{target} is not in the catalog")))?;
            hops.push(Hop {
                from: current,
                field,
                to,
            });
            current = to;
        }

        let field = current
            .field(last)
            .ok_or_else(|| invalid(format!("{} has no field '{last}'", current.name)))?;
        Ok(Lookup {
            hops,
            entity: current,
            field,
        })
    }

    /// Cross-check every reference inside the catalog
    ///
    /// # Errors
    ///
    /// Returns the first dangling or contradictory reference found.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut names = HashSet::new();
        let mut tables = HashSet::new();
        for entity in &self.entities {
            if !names.insert(entity.name) {
                return Err(CatalogError::Inconsistent(format!(
                    "entity {} is declared twice",
                    entity.name
                )));
            }
            if !tables.insert(entity.table) {
                return Err(CatalogError::Inconsistent(format!(
                    "table {} is mapped twice",
                    entity.table
                )));
            }
        }

        for entity in &self.entities {
            self.validate_entity(entity)?;
        }
        Ok(())
    }

    fn validate_entity(&self, entity: &'static EntityMeta) -> Result<(), CatalogError> {
        let field = |name: &str| {
            entity
                .field(name)
                .ok_or_else(|| CatalogError::UnknownField {
                    entity: entity.name.to_string(),
                    field: name.to_string(),
                })
        };
        let field_or_derived = |name: &str| {
            if entity.is_derived(name) {
                Ok(())
            } else {
                field(name).map(|_| ())
            }
        };
        let relation = |name: &str| {
            let f = field(name)?;
            if f.relation().is_none() {
                return Err(CatalogError::Inconsistent(format!(
                    "{}.{name} is not a foreign key",
                    entity.name
                )));
            }
            Ok(f)
        };

        if entity.primary_key().is_none() {
            return Err(CatalogError::Inconsistent(format!(
                "{} has no primary key",
                entity.name
            )));
        }
        for f in entity.relations() {
            if let Some((target, _)) = f.relation() {
                self.entity(target)?;
            }
        }
        for name in entity.ordering {
            field(name.trim_start_matches('-'))?;
        }
        for group in entity.unique_together {
            for name in *group {
                field(name)?;
            }
        }

        let Some(admin) = entity.admin else {
            return Ok(());
        };
        for name in admin.list_display.iter().chain(admin.readonly_fields) {
            field_or_derived(name)?;
        }
        for name in admin
            .list_filter
            .iter()
            .chain(admin.list_editable)
            .chain(admin.date_hierarchy.iter())
        {
            field(name)?;
        }
        for name in admin.autocomplete_fields.iter().chain(admin.raw_id_fields) {
            relation(name)?;
        }
        for name in admin.ordering {
            field(name.trim_start_matches('-'))?;
        }
        for path in admin.search_fields {
            self.resolve(entity, path)?;
        }
        for inline in admin.inlines {
            let child = self.entity(inline.entity)?;
            let fk = child.field(inline.fk_field).ok_or_else(|| CatalogError::UnknownField {
                entity: child.name.to_string(),
                field: inline.fk_field.to_string(),
            })?;
            if fk.relation().map(|(t, _)| t) != Some(entity.name) {
                return Err(CatalogError::Inconsistent(format!(
                    "inline {}.{} does not point at {}",
                    child.name, inline.fk_field, entity.name
                )));
            }
        }
        Ok(())
    }

    /// The catalog as JSON, for the external admin UI
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Export` if serialization fails.
    pub fn to_json(&self) -> Result<serde_json::Value, CatalogError> {
        Ok(serde_json::to_value(self)?)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Export` if serialization fails.
    pub fn to_json_string(&self, pretty: bool) -> Result<String, CatalogError> {
        let out = if pretty {
            serde_json::to_string_pretty(self)?
        } else {
            serde_json::to_string(self)?
        };
        Ok(out)
    }
}
