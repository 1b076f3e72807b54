//! Posted stock movements.

use crate::catalog::meta::{AdminOptions, DeletionPolicy, Entity, EntityMeta, FieldMeta, InlineMeta};
use crate::executor::{column, DbError};
use chrono::{DateTime, Utc};
use may_postgres::Row;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryTransaction {
    pub id: i32,
    pub reference: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub static INVENTORY_TRANSACTION: EntityMeta = EntityMeta {
    name: "InventoryTransaction",
    table: "inventory_transactions",
    verbose_name: "Inventory transaction",
    verbose_name_plural: "Inventory transactions",
    ordering: &["-created_at"],
    fields: &[
        FieldMeta::auto_id(),
        FieldMeta::char("reference", 255),
        FieldMeta::text("notes").optional(),
        FieldMeta::datetime("created_at"),
    ],
    unique_together: &[],
    derived: &[],
    admin: Some(AdminOptions {
        list_display: &["reference", "created_at", "notes"],
        search_fields: &["reference", "notes"],
        ordering: &["-created_at"],
        date_hierarchy: Some("created_at"),
        inlines: &[InlineMeta {
            autocomplete_fields: &["inventory_item"],
            readonly_fields: &["stock_before", "stock_after"],
            ..InlineMeta::tabular("InventoryTransactionLine", "transaction")
        }],
        ..AdminOptions::EMPTY
    }),
};

impl Entity for InventoryTransaction {
    fn meta() -> &'static EntityMeta {
        &INVENTORY_TRANSACTION
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            reference: column(row, "reference")?,
            notes: column(row, "notes")?,
            created_at: column(row, "created_at")?,
        })
    }
}

impl fmt::Display for InventoryTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference)
    }
}

/// Stock change of one item within a transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryTransactionLine {
    pub id: i32,
    pub transaction_id: i32,
    pub inventory_item_id: i32,
    pub quantity_change: i32,
    pub note: Option<String>,
    pub stock_before: i32,
    pub stock_after: i32,
}

pub static INVENTORY_TRANSACTION_LINE: EntityMeta = EntityMeta {
    name: "InventoryTransactionLine",
    table: "inventory_transaction_lines",
    verbose_name: "Inventory transaction line",
    verbose_name_plural: "Inventory transaction lines",
    ordering: &["-id"],
    fields: &[
        FieldMeta::auto_id(),
        FieldMeta::foreign_key(
            "transaction",
            "transaction_id",
            "InventoryTransaction",
            DeletionPolicy::Cascade,
        ),
        FieldMeta::foreign_key(
            "inventory_item",
            "inventory_item_id",
            "InventoryItem",
            DeletionPolicy::Restrict,
        ),
        FieldMeta::integer("quantity_change"),
        FieldMeta::text("note").optional(),
        FieldMeta::integer("stock_before"),
        FieldMeta::integer("stock_after"),
    ],
    unique_together: &[],
    derived: &[],
    admin: Some(AdminOptions {
        list_display: &[
            "transaction",
            "inventory_item",
            "quantity_change",
            "stock_before",
            "stock_after",
        ],
        search_fields: &[
            "transaction__reference",
            "inventory_item__item",
            "inventory_item__sku",
        ],
        autocomplete_fields: &["transaction", "inventory_item"],
        ..AdminOptions::EMPTY
    }),
};

impl InventoryTransactionLine {
    /// `stock_after - stock_before` agrees with `quantity_change`
    pub fn is_consistent(&self) -> bool {
        self.stock_before.checked_add(self.quantity_change) == Some(self.stock_after)
    }
}

impl Entity for InventoryTransactionLine {
    fn meta() -> &'static EntityMeta {
        &INVENTORY_TRANSACTION_LINE
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            transaction_id: column(row, "transaction_id")?,
            inventory_item_id: column(row, "inventory_item_id")?,
            quantity_change: column(row, "quantity_change")?,
            note: column(row, "note")?,
            stock_before: column(row, "stock_before")?,
            stock_after: column(row, "stock_after")?,
        })
    }
}

impl fmt::Display for InventoryTransactionLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transaction #{} → item #{}",
            self.transaction_id, self.inventory_item_id
        )
    }
}
