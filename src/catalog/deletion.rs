//! Deletion preview.
//!
//! Follows foreign keys backwards from an entity and reports what deleting
//! one of its rows does to the rest of the schema: rows removed by cascade,
//! references cleared, and relations that refuse the deletion outright.

use crate::catalog::meta::{DeletionPolicy, EntityMeta, FieldMeta};
use crate::catalog::{Catalog, CatalogError};
use serde::Serialize;
use std::collections::{HashSet, VecDeque};
use std::fmt;

/// One referencing relation affected by a deletion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeletionEffect {
    /// Referencing entity
    pub entity: &'static str,
    pub table: &'static str,
    /// Foreign key field on the referencing entity
    pub field: &'static str,
    pub column: &'static str,
    /// Entity whose rows are deleted at this point
    pub via: &'static str,
    /// 1 for direct references, 2 for references to cascaded rows, ...
    pub depth: usize,
}

impl DeletionEffect {
    fn new(child: &'static EntityMeta, field: &'static FieldMeta, via: &'static EntityMeta, depth: usize) -> Self {
        Self {
            entity: child.name,
            table: child.table,
            field: field.name,
            column: field.column,
            via: via.name,
            depth,
        }
    }
}

/// Consequences of deleting a row of `root`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionPlan {
    pub root: &'static str,
    pub cascades: Vec<DeletionEffect>,
    pub nullified: Vec<DeletionEffect>,
    /// `Restrict` relations; any referencing row makes the delete fail
    pub blocked_by: Vec<DeletionEffect>,
}

impl DeletionPlan {
    /// Walk reverse relationships of `entity` transitively
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::UnknownEntity` if `entity` is not in the catalog.
    pub fn collect(catalog: &Catalog, entity: &str) -> Result<Self, CatalogError> {
        let root = catalog.entity(entity)?;
        let mut plan = DeletionPlan {
            root: root.name,
            cascades: Vec::new(),
            nullified: Vec::new(),
            blocked_by: Vec::new(),
        };

        let mut expanded: HashSet<&'static str> = HashSet::from([root.name]);
        let mut seen: HashSet<(&'static str, &'static str, &'static str)> = HashSet::new();
        let mut queue: VecDeque<(&'static EntityMeta, usize)> = VecDeque::from([(root, 1)]);

        while let Some((deleted, depth)) = queue.pop_front() {
            for (child, field) in catalog.referencing(deleted.name) {
                if !seen.insert((deleted.name, child.name, field.name)) {
                    continue;
                }
                let Some((_, policy)) = field.relation() else {
                    continue;
                };
                let effect = DeletionEffect::new(child, field, deleted, depth);
                match policy {
                    DeletionPolicy::Cascade => {
                        plan.cascades.push(effect);
                        if expanded.insert(child.name) {
                            queue.push_back((child, depth + 1));
                        }
                    }
                    DeletionPolicy::SetNull => plan.nullified.push(effect),
                    DeletionPolicy::Restrict => plan.blocked_by.push(effect),
                }
            }
        }
        Ok(plan)
    }

    pub fn is_blocked(&self) -> bool {
        !self.blocked_by.is_empty()
    }

    /// Tables losing rows, first occurrence order
    pub fn cascaded_tables(&self) -> Vec<&'static str> {
        let mut seen = HashSet::new();
        self.cascades
            .iter()
            .map(|e| e.table)
            .filter(|t| seen.insert(*t))
            .collect()
    }

    /// `table.column` references that are cleared
    pub fn nullified_columns(&self) -> Vec<String> {
        self.nullified
            .iter()
            .map(|e| format!("{}.{}", e.table, e.column))
            .collect()
    }
}

impl fmt::Display for DeletionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Deleting {}:", self.root)?;
        for e in &self.cascades {
            writeln!(f, "  deletes {} via {}.{}", e.table, e.entity, e.field)?;
        }
        for e in &self.nullified {
            writeln!(f, "  clears {}.{}", e.table, e.column)?;
        }
        for e in &self.blocked_by {
            writeln!(f, "  blocked by {}.{}", e.table, e.column)?;
        }
        Ok(())
    }
}
