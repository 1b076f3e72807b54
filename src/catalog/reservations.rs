//! Job reservations: stock held back for a shop-floor job.

use crate::catalog::meta::{AdminOptions, DeletionPolicy, Entity, EntityMeta, FieldMeta, InlineMeta};
use crate::executor::{column, DbError};
use chrono::{DateTime, NaiveDate, Utc};
use may_postgres::Row;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReservation {
    pub id: i32,
    pub job_number: String,
    pub job_name: String,
    pub requested_by: String,
    pub needed_by: Option<NaiveDate>,
    pub status: String,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub static JOB_RESERVATION: EntityMeta = EntityMeta {
    name: "JobReservation",
    table: "job_reservations",
    verbose_name: "Job reservation",
    verbose_name_plural: "Job reservations",
    ordering: &["-created_at"],
    fields: &[
        FieldMeta::auto_id(),
        FieldMeta::char("job_number", 255).unique(),
        FieldMeta::char("job_name", 255),
        FieldMeta::char("requested_by", 255),
        FieldMeta::date("needed_by").optional(),
        FieldMeta::char("status", 50),
        FieldMeta::text("notes").optional(),
        FieldMeta::datetime("created_at"),
        FieldMeta::datetime("updated_at"),
    ],
    unique_together: &[],
    derived: &[],
    admin: Some(AdminOptions {
        list_display: &["job_number", "job_name", "requested_by", "needed_by", "status"],
        list_filter: &["status", "requested_by"],
        search_fields: &["job_number", "job_name", "requested_by"],
        inlines: &[InlineMeta {
            autocomplete_fields: &["inventory_item"],
            readonly_fields: &["consumed_qty"],
            ..InlineMeta::tabular("JobReservationItem", "reservation")
        }],
        ..AdminOptions::EMPTY
    }),
};

impl Entity for JobReservation {
    fn meta() -> &'static EntityMeta {
        &JOB_RESERVATION
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            job_number: column(row, "job_number")?,
            job_name: column(row, "job_name")?,
            requested_by: column(row, "requested_by")?,
            needed_by: column(row, "needed_by")?,
            status: column(row, "status")?,
            notes: column(row, "notes")?,
            created_at: column(row, "created_at")?,
            updated_at: column(row, "updated_at")?,
        })
    }
}

impl fmt::Display for JobReservation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.job_number, self.job_name)
    }
}

/// Quantity of one item reserved for a job
///
/// Both references are `Restrict`: reserved stock keeps its item and its
/// reservation alive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReservationItem {
    pub id: i32,
    pub reservation_id: i32,
    pub inventory_item_id: i32,
    pub requested_qty: i32,
    pub committed_qty: i32,
    pub consumed_qty: i32,
}

pub static JOB_RESERVATION_ITEM: EntityMeta = EntityMeta {
    name: "JobReservationItem",
    table: "job_reservation_items",
    verbose_name: "Job reservation line",
    verbose_name_plural: "Job reservation lines",
    ordering: &[],
    fields: &[
        FieldMeta::auto_id(),
        FieldMeta::foreign_key(
            "reservation",
            "reservation_id",
            "JobReservation",
            DeletionPolicy::Restrict,
        ),
        FieldMeta::foreign_key(
            "inventory_item",
            "inventory_item_id",
            "InventoryItem",
            DeletionPolicy::Restrict,
        ),
        FieldMeta::integer("requested_qty"),
        FieldMeta::integer("committed_qty"),
        FieldMeta::integer("consumed_qty"),
    ],
    unique_together: &[&["reservation", "inventory_item"]],
    derived: &[],
    admin: None,
};

impl Entity for JobReservationItem {
    fn meta() -> &'static EntityMeta {
        &JOB_RESERVATION_ITEM
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            reservation_id: column(row, "reservation_id")?,
            inventory_item_id: column(row, "inventory_item_id")?,
            requested_qty: column(row, "requested_qty")?,
            committed_qty: column(row, "committed_qty")?,
            consumed_qty: column(row, "consumed_qty")?,
        })
    }
}

impl fmt::Display for JobReservationItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reservation #{} - item #{}",
            self.reservation_id, self.inventory_item_id
        )
    }
}
