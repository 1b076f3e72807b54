//! Suppliers, purchase orders and receipts.

use crate::catalog::meta::{
    AdminOptions, DeletionPolicy, DerivedField, Entity, EntityMeta, FieldMeta, InlineMeta,
};
use crate::executor::{column, DbError, DbExecutor};
use chrono::{DateTime, NaiveDate, Utc};
use may_postgres::Row;
use rust_decimal::Decimal;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Supplier {
    pub id: i32,
    pub name: String,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub contact_phone: Option<String>,
    pub default_lead_time_days: Option<i32>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub static SUPPLIER: EntityMeta = EntityMeta {
    name: "Supplier",
    table: "suppliers",
    verbose_name: "Supplier",
    verbose_name_plural: "Suppliers",
    ordering: &["name"],
    fields: &[
        FieldMeta::auto_id(),
        FieldMeta::char("name", 255),
        FieldMeta::char("contact_name", 255).optional(),
        FieldMeta::email("contact_email", 255).optional(),
        FieldMeta::char("contact_phone", 255).optional(),
        FieldMeta::integer("default_lead_time_days").optional(),
        FieldMeta::text("notes").optional(),
        FieldMeta::datetime("created_at"),
        FieldMeta::datetime("updated_at"),
    ],
    unique_together: &[],
    derived: &[],
    admin: Some(AdminOptions {
        list_display: &["name", "contact_name", "contact_email", "default_lead_time_days"],
        search_fields: &["name", "contact_name", "contact_email"],
        list_filter: &["default_lead_time_days"],
        ..AdminOptions::EMPTY
    }),
};

impl Entity for Supplier {
    fn meta() -> &'static EntityMeta {
        &SUPPLIER
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            name: column(row, "name")?,
            contact_name: column(row, "contact_name")?,
            contact_email: column(row, "contact_email")?,
            contact_phone: column(row, "contact_phone")?,
            default_lead_time_days: column(row, "default_lead_time_days")?,
            notes: column(row, "notes")?,
            created_at: column(row, "created_at")?,
            updated_at: column(row, "updated_at")?,
        })
    }
}

impl fmt::Display for Supplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrder {
    pub id: i32,
    pub order_number: Option<String>,
    pub supplier_id: Option<i32>,
    pub status: String,
    pub order_date: Option<NaiveDate>,
    pub expected_date: Option<NaiveDate>,
    pub total_cost: Decimal,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub static PURCHASE_ORDER: EntityMeta = EntityMeta {
    name: "PurchaseOrder",
    table: "purchase_orders",
    verbose_name: "Purchase order",
    verbose_name_plural: "Purchase orders",
    ordering: &["-order_date", "-id"],
    fields: &[
        FieldMeta::auto_id(),
        FieldMeta::char("order_number", 255).optional(),
        FieldMeta::foreign_key("supplier", "supplier_id", "Supplier", DeletionPolicy::SetNull)
            .optional(),
        FieldMeta::char("status", 50),
        FieldMeta::date("order_date").optional(),
        FieldMeta::date("expected_date").optional(),
        FieldMeta::decimal("total_cost", 18, 6).with_default(),
        FieldMeta::text("notes").optional(),
        FieldMeta::datetime("created_at"),
        FieldMeta::datetime("updated_at"),
    ],
    unique_together: &[],
    derived: &[DerivedField {
        name: "display_number",
        label: "PO",
    }],
    admin: Some(AdminOptions {
        list_display: &[
            "display_number",
            "status",
            "supplier",
            "order_date",
            "expected_date",
            "total_cost",
        ],
        list_filter: &["status", "supplier"],
        search_fields: &["order_number", "supplier__name"],
        autocomplete_fields: &["supplier"],
        readonly_fields: &["created_at", "updated_at"],
        inlines: &[
            InlineMeta {
                autocomplete_fields: &["inventory_item"],
                readonly_fields: &[
                    "quantity_received",
                    "quantity_cancelled",
                    "created_at",
                    "updated_at",
                ],
                ..InlineMeta::tabular("PurchaseOrderLine", "purchase_order")
            },
            InlineMeta {
                fields: &[
                    "reference",
                    "inventory_transaction",
                    "created_at",
                    "total_received",
                    "total_cancelled",
                ],
                readonly_fields: &[
                    "reference",
                    "inventory_transaction",
                    "created_at",
                    "total_received",
                    "total_cancelled",
                ],
                autocomplete_fields: &["inventory_transaction"],
                can_delete: false,
                show_change_link: true,
                ..InlineMeta::tabular("PurchaseOrderReceipt", "purchase_order")
            },
        ],
        ..AdminOptions::EMPTY
    }),
};

impl PurchaseOrder {
    /// Order number, or `#id` when none was assigned
    pub fn display_number(&self) -> String {
        match self.order_number.as_deref() {
            Some(number) if !number.is_empty() => number.to_string(),
            _ => format!("#{}", self.id),
        }
    }
}

impl Entity for PurchaseOrder {
    fn meta() -> &'static EntityMeta {
        &PURCHASE_ORDER
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            order_number: column(row, "order_number")?,
            supplier_id: column(row, "supplier_id")?,
            status: column(row, "status")?,
            order_date: column(row, "order_date")?,
            expected_date: column(row, "expected_date")?,
            total_cost: column(row, "total_cost")?,
            notes: column(row, "notes")?,
            created_at: column(row, "created_at")?,
            updated_at: column(row, "updated_at")?,
        })
    }
}

impl fmt::Display for PurchaseOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.order_number.as_deref() {
            Some(number) if !number.is_empty() => write!(f, "PO {number}"),
            _ => write!(f, "PO #{}", self.id),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrderLine {
    pub id: i32,
    pub purchase_order_id: i32,
    pub inventory_item_id: Option<i32>,
    pub supplier_sku: Option<String>,
    pub description: Option<String>,
    pub quantity_ordered: Decimal,
    pub quantity_received: Decimal,
    pub quantity_cancelled: Decimal,
    pub unit_cost: Decimal,
    pub packs_ordered: Decimal,
    pub pack_size: Decimal,
    pub purchase_uom: Option<String>,
    pub stock_uom: Option<String>,
    pub expected_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub static PURCHASE_ORDER_LINE: EntityMeta = EntityMeta {
    name: "PurchaseOrderLine",
    table: "purchase_order_lines",
    verbose_name: "Purchase order line",
    verbose_name_plural: "Purchase order lines",
    ordering: &["purchase_order", "id"],
    fields: &[
        FieldMeta::auto_id(),
        FieldMeta::foreign_key(
            "purchase_order",
            "purchase_order_id",
            "PurchaseOrder",
            DeletionPolicy::Cascade,
        ),
        FieldMeta::foreign_key(
            "inventory_item",
            "inventory_item_id",
            "InventoryItem",
            DeletionPolicy::SetNull,
        )
        .optional(),
        FieldMeta::char("supplier_sku", 255).optional(),
        FieldMeta::text("description").optional(),
        FieldMeta::decimal("quantity_ordered", 18, 6),
        FieldMeta::decimal("quantity_received", 18, 6),
        FieldMeta::decimal("quantity_cancelled", 18, 6),
        FieldMeta::decimal("unit_cost", 18, 6),
        FieldMeta::decimal("packs_ordered", 18, 6).with_default(),
        FieldMeta::decimal("pack_size", 18, 6).with_default(),
        FieldMeta::char("purchase_uom", 255).optional(),
        FieldMeta::char("stock_uom", 255).optional(),
        FieldMeta::date("expected_date").optional(),
        FieldMeta::datetime("created_at"),
        FieldMeta::datetime("updated_at"),
    ],
    unique_together: &[],
    derived: &[],
    admin: Some(AdminOptions {
        list_display: &[
            "purchase_order",
            "inventory_item",
            "quantity_ordered",
            "quantity_received",
            "quantity_cancelled",
            "unit_cost",
        ],
        search_fields: &[
            "purchase_order__order_number",
            "purchase_order__id",
            "inventory_item__item",
            "inventory_item__sku",
        ],
        autocomplete_fields: &["purchase_order", "inventory_item"],
        readonly_fields: &["created_at", "updated_at"],
        ..AdminOptions::EMPTY
    }),
};

impl PurchaseOrderLine {
    /// Quantity neither received nor cancelled yet, never negative
    pub fn outstanding(&self) -> Decimal {
        (self.quantity_ordered - self.quantity_received - self.quantity_cancelled)
            .max(Decimal::ZERO)
    }
}

impl Entity for PurchaseOrderLine {
    fn meta() -> &'static EntityMeta {
        &PURCHASE_ORDER_LINE
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            purchase_order_id: column(row, "purchase_order_id")?,
            inventory_item_id: column(row, "inventory_item_id")?,
            supplier_sku: column(row, "supplier_sku")?,
            description: column(row, "description")?,
            quantity_ordered: column(row, "quantity_ordered")?,
            quantity_received: column(row, "quantity_received")?,
            quantity_cancelled: column(row, "quantity_cancelled")?,
            unit_cost: column(row, "unit_cost")?,
            packs_ordered: column(row, "packs_ordered")?,
            pack_size: column(row, "pack_size")?,
            purchase_uom: column(row, "purchase_uom")?,
            stock_uom: column(row, "stock_uom")?,
            expected_date: column(row, "expected_date")?,
            created_at: column(row, "created_at")?,
            updated_at: column(row, "updated_at")?,
        })
    }
}

impl fmt::Display for PurchaseOrderLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PO #{} line {}", self.purchase_order_id, self.id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrderReceipt {
    pub id: i32,
    pub purchase_order_id: i32,
    pub inventory_transaction_id: Option<i32>,
    pub reference: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

pub static PURCHASE_ORDER_RECEIPT: EntityMeta = EntityMeta {
    name: "PurchaseOrderReceipt",
    table: "purchase_order_receipts",
    verbose_name: "Purchase order receipt",
    verbose_name_plural: "Purchase order receipts",
    ordering: &["-created_at"],
    fields: &[
        FieldMeta::auto_id(),
        FieldMeta::foreign_key(
            "purchase_order",
            "purchase_order_id",
            "PurchaseOrder",
            DeletionPolicy::Cascade,
        ),
        FieldMeta::foreign_key(
            "inventory_transaction",
            "inventory_transaction_id",
            "InventoryTransaction",
            DeletionPolicy::SetNull,
        )
        .optional(),
        FieldMeta::char("reference", 255),
        FieldMeta::text("notes").optional(),
        FieldMeta::datetime("created_at"),
    ],
    unique_together: &[],
    derived: &[
        DerivedField {
            name: "total_received",
            label: "Total received",
        },
        DerivedField {
            name: "total_cancelled",
            label: "Total cancelled",
        },
    ],
    admin: Some(AdminOptions {
        list_display: &[
            "reference",
            "purchase_order",
            "created_at",
            "total_received",
            "total_cancelled",
        ],
        search_fields: &["reference", "purchase_order__order_number"],
        autocomplete_fields: &["purchase_order", "inventory_transaction"],
        readonly_fields: &["created_at", "total_received", "total_cancelled"],
        inlines: &[InlineMeta {
            readonly_fields: &["quantity_received", "quantity_cancelled"],
            autocomplete_fields: &["purchase_order_line"],
            ..InlineMeta::tabular("PurchaseOrderReceiptLine", "receipt")
        }],
        ..AdminOptions::EMPTY
    }),
};

impl Entity for PurchaseOrderReceipt {
    fn meta() -> &'static EntityMeta {
        &PURCHASE_ORDER_RECEIPT
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            purchase_order_id: column(row, "purchase_order_id")?,
            inventory_transaction_id: column(row, "inventory_transaction_id")?,
            reference: column(row, "reference")?,
            notes: column(row, "notes")?,
            created_at: column(row, "created_at")?,
        })
    }
}

impl fmt::Display for PurchaseOrderReceipt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.reference)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseOrderReceiptLine {
    pub id: i32,
    pub receipt_id: i32,
    pub purchase_order_line_id: i32,
    pub quantity_received: Decimal,
    pub quantity_cancelled: Decimal,
}

pub static PURCHASE_ORDER_RECEIPT_LINE: EntityMeta = EntityMeta {
    name: "PurchaseOrderReceiptLine",
    table: "purchase_order_receipt_lines",
    verbose_name: "Purchase order receipt line",
    verbose_name_plural: "Purchase order receipt lines",
    ordering: &["-id"],
    fields: &[
        FieldMeta::auto_id(),
        FieldMeta::foreign_key(
            "receipt",
            "receipt_id",
            "PurchaseOrderReceipt",
            DeletionPolicy::Cascade,
        ),
        FieldMeta::foreign_key(
            "purchase_order_line",
            "purchase_order_line_id",
            "PurchaseOrderLine",
            DeletionPolicy::Cascade,
        ),
        FieldMeta::decimal("quantity_received", 18, 6),
        FieldMeta::decimal("quantity_cancelled", 18, 6),
    ],
    unique_together: &[],
    derived: &[],
    admin: Some(AdminOptions {
        list_display: &[
            "receipt",
            "purchase_order_line",
            "quantity_received",
            "quantity_cancelled",
        ],
        search_fields: &[
            "receipt__reference",
            "purchase_order_line__purchase_order__order_number",
            "purchase_order_line__inventory_item__sku",
        ],
        autocomplete_fields: &["receipt", "purchase_order_line"],
        ..AdminOptions::EMPTY
    }),
};

impl Entity for PurchaseOrderReceiptLine {
    fn meta() -> &'static EntityMeta {
        &PURCHASE_ORDER_RECEIPT_LINE
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            receipt_id: column(row, "receipt_id")?,
            purchase_order_line_id: column(row, "purchase_order_line_id")?,
            quantity_received: column(row, "quantity_received")?,
            quantity_cancelled: column(row, "quantity_cancelled")?,
        })
    }
}

impl fmt::Display for PurchaseOrderReceiptLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Receipt {} line {}",
            self.receipt_id, self.purchase_order_line_id
        )
    }
}

const RECEIPT_TOTALS_SQL: &str = "SELECT
    COALESCE(SUM(quantity_received), 0) AS total_received,
    COALESCE(SUM(quantity_cancelled), 0) AS total_cancelled
    FROM purchase_order_receipt_lines
    WHERE receipt_id = $1";

/// Derived totals of a receipt; never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReceiptTotals {
    pub total_received: Decimal,
    pub total_cancelled: Decimal,
}

impl ReceiptTotals {
    /// Sum the given lines; zero when there are none
    pub fn from_lines<'a, I>(lines: I) -> Self
    where
        I: IntoIterator<Item = &'a PurchaseOrderReceiptLine>,
    {
        lines.into_iter().fold(Self::default(), |acc, line| Self {
            total_received: acc.total_received + line.quantity_received,
            total_cancelled: acc.total_cancelled + line.quantity_cancelled,
        })
    }

    /// Sum the lines of `receipt_id` in the database
    ///
    /// # Errors
    ///
    /// Returns `DbError` if the aggregate query fails.
    pub fn load(executor: &dyn DbExecutor, receipt_id: i32) -> Result<Self, DbError> {
        let row = executor.query_one(RECEIPT_TOTALS_SQL, &[&receipt_id])?;
        Ok(Self {
            total_received: column(&row, "total_received")?,
            total_cancelled: column(&row, "total_cancelled")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn receipt_line(received: &str, cancelled: &str) -> PurchaseOrderReceiptLine {
        PurchaseOrderReceiptLine {
            id: 1,
            receipt_id: 7,
            purchase_order_line_id: 3,
            quantity_received: dec(received),
            quantity_cancelled: dec(cancelled),
        }
    }

    fn order(number: Option<&str>) -> PurchaseOrder {
        let now = Utc::now();
        PurchaseOrder {
            id: 7,
            order_number: number.map(str::to_string),
            supplier_id: None,
            status: "draft".to_string(),
            order_date: None,
            expected_date: None,
            total_cost: Decimal::ZERO,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_receipt_totals_sum_lines() {
        let lines = vec![receipt_line("2.5", "0"), receipt_line("1.25", "0.75")];
        let totals = ReceiptTotals::from_lines(&lines);
        assert_eq!(totals.total_received, dec("3.75"));
        assert_eq!(totals.total_cancelled, dec("0.75"));
    }

    #[test]
    fn test_receipt_without_lines_totals_zero() {
        let none: Vec<PurchaseOrderReceiptLine> = Vec::new();
        let totals = ReceiptTotals::from_lines(&none);
        assert_eq!(totals.total_received, Decimal::ZERO);
        assert_eq!(totals.total_cancelled, Decimal::ZERO);
    }

    #[test]
    fn test_purchase_order_labels() {
        assert_eq!(order(Some("1042")).to_string(), "PO 1042");
        assert_eq!(order(None).to_string(), "PO #7");
        assert_eq!(order(Some("")).to_string(), "PO #7");
        assert_eq!(order(None).display_number(), "#7");
    }

    #[test]
    fn test_outstanding_never_negative() {
        let now = Utc::now();
        let line = PurchaseOrderLine {
            id: 1,
            purchase_order_id: 7,
            inventory_item_id: None,
            supplier_sku: None,
            description: None,
            quantity_ordered: dec("10"),
            quantity_received: dec("8"),
            quantity_cancelled: dec("4"),
            unit_cost: dec("1.5"),
            packs_ordered: Decimal::ZERO,
            pack_size: Decimal::ZERO,
            purchase_uom: None,
            stock_uom: None,
            expected_date: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(line.outstanding(), Decimal::ZERO);
    }
}
