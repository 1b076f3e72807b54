//! Inventory items, storage locations and dashboard metrics.

use crate::catalog::meta::{
    AdminOptions, DeletionPolicy, Entity, EntityMeta, FieldMeta,
};
use crate::executor::{column, DbError};
use chrono::{DateTime, Utc};
use may_postgres::Row;
use rust_decimal::Decimal;
use std::fmt;

/// Stocked part
#[derive(Debug, Clone, PartialEq)]
pub struct InventoryItem {
    pub id: i32,
    pub item: String,
    pub sku: String,
    pub part_number: String,
    pub finish: Option<String>,
    pub location: String,
    pub stock: i32,
    pub committed_qty: i32,
    pub on_order_qty: Decimal,
    pub safety_stock: Decimal,
    pub min_order_qty: Decimal,
    pub order_multiple: Decimal,
    pub pack_size: Decimal,
    pub purchase_uom: Option<String>,
    pub stock_uom: Option<String>,
    pub status: String,
    /// Free-text supplier name, kept alongside `supplier_id`
    pub supplier: String,
    pub supplier_id: Option<i32>,
    pub supplier_contact: Option<String>,
    pub supplier_sku: Option<String>,
    pub reorder_point: i32,
    pub lead_time_days: i32,
    pub average_daily_use: Option<Decimal>,
}

pub static INVENTORY_ITEM: EntityMeta = EntityMeta {
    name: "InventoryItem",
    table: "inventory_items",
    verbose_name: "Inventory item",
    verbose_name_plural: "Inventory items",
    ordering: &["item"],
    fields: &[
        FieldMeta::auto_id(),
        FieldMeta::char("item", 255),
        FieldMeta::char("sku", 255).unique(),
        FieldMeta::char("part_number", 255).blank(),
        FieldMeta::char("finish", 255).optional(),
        FieldMeta::char("location", 255),
        FieldMeta::integer("stock"),
        FieldMeta::integer("committed_qty"),
        FieldMeta::decimal("on_order_qty", 18, 6).with_default(),
        FieldMeta::decimal("safety_stock", 18, 6).with_default(),
        FieldMeta::decimal("min_order_qty", 18, 6).with_default(),
        FieldMeta::decimal("order_multiple", 18, 6).with_default(),
        FieldMeta::decimal("pack_size", 18, 6).with_default(),
        FieldMeta::char("purchase_uom", 255).optional(),
        FieldMeta::char("stock_uom", 255).optional(),
        FieldMeta::char("status", 255),
        FieldMeta::char("supplier", 255),
        FieldMeta::foreign_key("supplier_ref", "supplier_id", "Supplier", DeletionPolicy::SetNull)
            .optional(),
        FieldMeta::char("supplier_contact", 255).optional(),
        FieldMeta::char("supplier_sku", 255).optional(),
        FieldMeta::integer("reorder_point"),
        FieldMeta::integer("lead_time_days"),
        FieldMeta::decimal("average_daily_use", 12, 4).optional(),
    ],
    unique_together: &[],
    derived: &[],
    admin: Some(AdminOptions {
        list_display: &[
            "item",
            "sku",
            "location",
            "stock",
            "status",
            "average_daily_use",
            "supplier",
        ],
        list_filter: &["status", "supplier"],
        search_fields: &["item", "sku", "part_number", "location", "supplier"],
        ordering: &["item"],
        readonly_fields: &["average_daily_use"],
        ..AdminOptions::EMPTY
    }),
};

impl Entity for InventoryItem {
    fn meta() -> &'static EntityMeta {
        &INVENTORY_ITEM
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            item: column(row, "item")?,
            sku: column(row, "sku")?,
            part_number: column(row, "part_number")?,
            finish: column(row, "finish")?,
            location: column(row, "location")?,
            stock: column(row, "stock")?,
            committed_qty: column(row, "committed_qty")?,
            on_order_qty: column(row, "on_order_qty")?,
            safety_stock: column(row, "safety_stock")?,
            min_order_qty: column(row, "min_order_qty")?,
            order_multiple: column(row, "order_multiple")?,
            pack_size: column(row, "pack_size")?,
            purchase_uom: column(row, "purchase_uom")?,
            stock_uom: column(row, "stock_uom")?,
            status: column(row, "status")?,
            supplier: column(row, "supplier")?,
            supplier_id: column(row, "supplier_id")?,
            supplier_contact: column(row, "supplier_contact")?,
            supplier_sku: column(row, "supplier_sku")?,
            reorder_point: column(row, "reorder_point")?,
            lead_time_days: column(row, "lead_time_days")?,
            average_daily_use: column(row, "average_daily_use")?,
        })
    }
}

impl fmt::Display for InventoryItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.item, self.sku)
    }
}

/// Warehouse slot addressed by aisle, rack, shelf and bin
#[derive(Debug, Clone, PartialEq)]
pub struct StorageLocation {
    pub id: i32,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub sort_order: i32,
    pub aisle: Option<String>,
    pub rack: Option<String>,
    pub shelf: Option<String>,
    pub bin: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub static STORAGE_LOCATION: EntityMeta = EntityMeta {
    name: "StorageLocation",
    table: "storage_locations",
    verbose_name: "Storage location",
    verbose_name_plural: "Storage locations",
    ordering: &["sort_order", "aisle", "rack", "shelf", "bin", "name"],
    fields: &[
        FieldMeta::auto_id(),
        FieldMeta::text("name"),
        FieldMeta::text("description").optional(),
        FieldMeta::boolean("is_active").with_default(),
        FieldMeta::integer("sort_order").with_default(),
        FieldMeta::char("aisle", 255).optional(),
        FieldMeta::char("rack", 255).optional(),
        FieldMeta::char("shelf", 255).optional(),
        FieldMeta::char("bin", 255).optional(),
        FieldMeta::datetime("created_at"),
        FieldMeta::datetime("updated_at"),
    ],
    unique_together: &[],
    derived: &[],
    admin: None,
};

impl StorageLocation {
    /// `A.3.2.B`, or the name when no component is set
    pub fn code(&self) -> String {
        let parts: Vec<&str> = [&self.aisle, &self.rack, &self.shelf, &self.bin]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .filter(|p| !p.is_empty())
            .collect();
        if parts.is_empty() {
            self.name.clone()
        } else {
            parts.join(".")
        }
    }
}

impl Entity for StorageLocation {
    fn meta() -> &'static EntityMeta {
        &STORAGE_LOCATION
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            name: column(row, "name")?,
            description: column(row, "description")?,
            is_active: column(row, "is_active")?,
            sort_order: column(row, "sort_order")?,
            aisle: column(row, "aisle")?,
            rack: column(row, "rack")?,
            shelf: column(row, "shelf")?,
            bin: column(row, "bin")?,
            created_at: column(row, "created_at")?,
            updated_at: column(row, "updated_at")?,
        })
    }
}

impl fmt::Display for StorageLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.code())
    }
}

/// Quantity of one item held at one location
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryItemLocation {
    pub id: i32,
    pub inventory_item_id: i32,
    pub storage_location_id: i32,
    pub quantity: i32,
}

pub static INVENTORY_ITEM_LOCATION: EntityMeta = EntityMeta {
    name: "InventoryItemLocation",
    table: "inventory_item_locations",
    verbose_name: "Inventory item location",
    verbose_name_plural: "Inventory item locations",
    ordering: &[],
    fields: &[
        FieldMeta::auto_id(),
        FieldMeta::foreign_key(
            "inventory_item",
            "inventory_item_id",
            "InventoryItem",
            DeletionPolicy::Cascade,
        ),
        FieldMeta::foreign_key(
            "storage_location",
            "storage_location_id",
            "StorageLocation",
            DeletionPolicy::Cascade,
        ),
        FieldMeta::integer("quantity").with_default(),
    ],
    unique_together: &[&["inventory_item", "storage_location"]],
    derived: &[],
    admin: None,
};

impl Entity for InventoryItemLocation {
    fn meta() -> &'static EntityMeta {
        &INVENTORY_ITEM_LOCATION
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            inventory_item_id: column(row, "inventory_item_id")?,
            storage_location_id: column(row, "storage_location_id")?,
            quantity: column(row, "quantity")?,
        })
    }
}

impl fmt::Display for InventoryItemLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "item #{} → location #{}",
            self.inventory_item_id, self.storage_location_id
        )
    }
}

/// Dashboard tile
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryMetric {
    pub id: i32,
    pub label: String,
    pub value: String,
    pub delta: Option<String>,
    pub timeframe: Option<String>,
    pub accent: bool,
    pub sort_order: i32,
}

pub static INVENTORY_METRIC: EntityMeta = EntityMeta {
    name: "InventoryMetric",
    table: "inventory_metrics",
    verbose_name: "Inventory metric",
    verbose_name_plural: "Inventory metrics",
    ordering: &["sort_order", "label"],
    fields: &[
        FieldMeta::auto_id(),
        FieldMeta::char("label", 255).unique(),
        FieldMeta::char("value", 255),
        FieldMeta::char("delta", 255).optional(),
        FieldMeta::char("timeframe", 255).optional(),
        FieldMeta::boolean("accent").with_default(),
        FieldMeta::integer("sort_order").with_default(),
    ],
    unique_together: &[],
    derived: &[],
    admin: Some(AdminOptions {
        list_display: &["label", "value", "delta", "timeframe", "accent", "sort_order"],
        list_editable: &["value", "delta", "timeframe", "accent", "sort_order"],
        search_fields: &["label"],
        ordering: &["sort_order", "label"],
        ..AdminOptions::EMPTY
    }),
};

impl Entity for InventoryMetric {
    fn meta() -> &'static EntityMeta {
        &INVENTORY_METRIC
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            label: column(row, "label")?,
            value: column(row, "value")?,
            delta: column(row, "delta")?,
            timeframe: column(row, "timeframe")?,
            accent: column(row, "accent")?,
            sort_order: column(row, "sort_order")?,
        })
    }
}

impl fmt::Display for InventoryMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label)
    }
}
