//! Cycle count sessions and their count lines.

use crate::catalog::meta::{AdminOptions, DeletionPolicy, Entity, EntityMeta, FieldMeta, InlineMeta};
use crate::executor::{column, DbError};
use chrono::{DateTime, Utc};
use may_postgres::Row;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleCountSession {
    pub id: i32,
    pub name: String,
    pub status: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub location_filter: Option<String>,
    pub total_lines: i32,
    pub completed_lines: i32,
}

pub static CYCLE_COUNT_SESSION: EntityMeta = EntityMeta {
    name: "CycleCountSession",
    table: "cycle_count_sessions",
    verbose_name: "Cycle count session",
    verbose_name_plural: "Cycle count sessions",
    ordering: &["-started_at"],
    fields: &[
        FieldMeta::auto_id(),
        FieldMeta::char("name", 255),
        FieldMeta::char("status", 50),
        FieldMeta::datetime("started_at"),
        FieldMeta::datetime("completed_at").optional(),
        FieldMeta::char("location_filter", 255).optional(),
        FieldMeta::integer("total_lines"),
        FieldMeta::integer("completed_lines"),
    ],
    unique_together: &[],
    derived: &[],
    admin: Some(AdminOptions {
        list_display: &[
            "name",
            "status",
            "started_at",
            "completed_at",
            "completed_lines",
            "total_lines",
        ],
        list_filter: &["status"],
        search_fields: &["name", "location_filter"],
        date_hierarchy: Some("started_at"),
        inlines: &[InlineMeta {
            autocomplete_fields: &["inventory_item"],
            ..InlineMeta::tabular("CycleCountLine", "session")
        }],
        ..AdminOptions::EMPTY
    }),
};

impl CycleCountSession {
    /// Share of lines counted, 0.0 for an empty session
    pub fn progress(&self) -> f64 {
        if self.total_lines <= 0 {
            return 0.0;
        }
        f64::from(self.completed_lines) / f64::from(self.total_lines)
    }
}

impl Entity for CycleCountSession {
    fn meta() -> &'static EntityMeta {
        &CYCLE_COUNT_SESSION
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            name: column(row, "name")?,
            status: column(row, "status")?,
            started_at: column(row, "started_at")?,
            completed_at: column(row, "completed_at")?,
            location_filter: column(row, "location_filter")?,
            total_lines: column(row, "total_lines")?,
            completed_lines: column(row, "completed_lines")?,
        })
    }
}

impl fmt::Display for CycleCountSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleCountLine {
    pub id: i32,
    pub session_id: i32,
    pub inventory_item_id: i32,
    pub sequence: i32,
    pub expected_qty: i32,
    pub counted_qty: Option<i32>,
    pub variance: Option<i32>,
    pub counted_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
    pub is_skipped: bool,
}

pub static CYCLE_COUNT_LINE: EntityMeta = EntityMeta {
    name: "CycleCountLine",
    table: "cycle_count_lines",
    verbose_name: "Cycle count line",
    verbose_name_plural: "Cycle count lines",
    ordering: &["session", "sequence"],
    fields: &[
        FieldMeta::auto_id(),
        FieldMeta::foreign_key(
            "session",
            "session_id",
            "CycleCountSession",
            DeletionPolicy::Cascade,
        ),
        FieldMeta::foreign_key(
            "inventory_item",
            "inventory_item_id",
            "InventoryItem",
            DeletionPolicy::Cascade,
        ),
        FieldMeta::integer("sequence"),
        FieldMeta::integer("expected_qty"),
        FieldMeta::integer("counted_qty").optional(),
        FieldMeta::integer("variance").optional(),
        FieldMeta::datetime("counted_at").optional(),
        FieldMeta::text("note").optional(),
        FieldMeta::boolean("is_skipped").with_default(),
    ],
    unique_together: &[&["session", "sequence"]],
    derived: &[],
    admin: Some(AdminOptions {
        list_display: &[
            "session",
            "inventory_item",
            "sequence",
            "expected_qty",
            "counted_qty",
            "variance",
            "counted_at",
        ],
        list_filter: &["session"],
        search_fields: &["session__name", "inventory_item__item", "inventory_item__sku"],
        raw_id_fields: &["session", "inventory_item"],
        ..AdminOptions::EMPTY
    }),
};

impl Entity for CycleCountLine {
    fn meta() -> &'static EntityMeta {
        &CYCLE_COUNT_LINE
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            session_id: column(row, "session_id")?,
            inventory_item_id: column(row, "inventory_item_id")?,
            sequence: column(row, "sequence")?,
            expected_qty: column(row, "expected_qty")?,
            counted_qty: column(row, "counted_qty")?,
            variance: column(row, "variance")?,
            counted_at: column(row, "counted_at")?,
            note: column(row, "note")?,
            is_skipped: column(row, "is_skipped")?,
        })
    }
}

impl fmt::Display for CycleCountLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "session #{} line {} - item #{}",
            self.session_id, self.sequence, self.inventory_item_id
        )
    }
}
