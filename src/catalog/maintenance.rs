//! Shop-floor machines and their maintenance history.

use crate::catalog::meta::{DeletionPolicy, Entity, EntityMeta, FieldMeta};
use crate::executor::{column, DbError};
use chrono::{DateTime, NaiveDate, Utc};
use may_postgres::Row;
use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct MaintenanceMachine {
    pub id: i64,
    pub name: String,
    pub equipment_type: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub serial_number: Option<String>,
    pub location: Option<String>,
    /// JSON array of document references
    pub documents: JsonValue,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub static MAINTENANCE_MACHINE: EntityMeta = EntityMeta {
    name: "MaintenanceMachine",
    table: "maintenance_machines",
    verbose_name: "Maintenance machine",
    verbose_name_plural: "Maintenance machines",
    ordering: &["name"],
    fields: &[
        FieldMeta::big_auto_id(),
        FieldMeta::text("name"),
        FieldMeta::text("equipment_type"),
        FieldMeta::text("manufacturer").optional(),
        FieldMeta::text("model").optional(),
        FieldMeta::text("serial_number").optional(),
        FieldMeta::text("location").optional(),
        FieldMeta::json("documents").with_default(),
        FieldMeta::text("notes").optional(),
        FieldMeta::datetime("created_at"),
        FieldMeta::datetime("updated_at"),
    ],
    unique_together: &[],
    derived: &[],
    admin: None,
};

impl Entity for MaintenanceMachine {
    fn meta() -> &'static EntityMeta {
        &MAINTENANCE_MACHINE
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            name: column(row, "name")?,
            equipment_type: column(row, "equipment_type")?,
            manufacturer: column(row, "manufacturer")?,
            model: column(row, "model")?,
            serial_number: column(row, "serial_number")?,
            location: column(row, "location")?,
            documents: column(row, "documents")?,
            notes: column(row, "notes")?,
            created_at: column(row, "created_at")?,
            updated_at: column(row, "updated_at")?,
        })
    }
}

impl fmt::Display for MaintenanceMachine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Recurring maintenance job for a machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaintenanceTask {
    pub id: i64,
    pub machine_id: i64,
    pub title: String,
    pub description: Option<String>,
    pub frequency: Option<String>,
    pub assigned_to: Option<String>,
    pub interval_count: Option<i32>,
    pub interval_unit: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub last_completed_at: Option<NaiveDate>,
    pub status: String,
    pub priority: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub static MAINTENANCE_TASK: EntityMeta = EntityMeta {
    name: "MaintenanceTask",
    table: "maintenance_tasks",
    verbose_name: "Maintenance task",
    verbose_name_plural: "Maintenance tasks",
    ordering: &["machine", "title"],
    fields: &[
        FieldMeta::big_auto_id(),
        FieldMeta::foreign_key(
            "machine",
            "machine_id",
            "MaintenanceMachine",
            DeletionPolicy::Cascade,
        ),
        FieldMeta::text("title"),
        FieldMeta::text("description").optional(),
        FieldMeta::text("frequency").optional(),
        FieldMeta::text("assigned_to").optional(),
        FieldMeta::integer("interval_count").optional(),
        FieldMeta::text("interval_unit").optional(),
        FieldMeta::date("start_date").optional(),
        FieldMeta::date("last_completed_at").optional(),
        FieldMeta::text("status").with_default(),
        FieldMeta::text("priority").with_default(),
        FieldMeta::datetime("created_at"),
        FieldMeta::datetime("updated_at"),
    ],
    unique_together: &[],
    derived: &[],
    admin: None,
};

impl Entity for MaintenanceTask {
    fn meta() -> &'static EntityMeta {
        &MAINTENANCE_TASK
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            machine_id: column(row, "machine_id")?,
            title: column(row, "title")?,
            description: column(row, "description")?,
            frequency: column(row, "frequency")?,
            assigned_to: column(row, "assigned_to")?,
            interval_count: column(row, "interval_count")?,
            interval_unit: column(row, "interval_unit")?,
            start_date: column(row, "start_date")?,
            last_completed_at: column(row, "last_completed_at")?,
            status: column(row, "status")?,
            priority: column(row, "priority")?,
            created_at: column(row, "created_at")?,
            updated_at: column(row, "updated_at")?,
        })
    }
}

impl fmt::Display for MaintenanceTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.title)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaintenanceRecord {
    pub id: i64,
    pub machine_id: i64,
    pub task_id: Option<i64>,
    pub performed_by: Option<String>,
    pub performed_at: Option<NaiveDate>,
    pub notes: Option<String>,
    pub attachments: JsonValue,
    pub downtime_minutes: Option<i32>,
    pub labor_hours: Option<Decimal>,
    pub parts_used: JsonValue,
    pub created_at: DateTime<Utc>,
}

pub static MAINTENANCE_RECORD: EntityMeta = EntityMeta {
    name: "MaintenanceRecord",
    table: "maintenance_records",
    verbose_name: "Maintenance record",
    verbose_name_plural: "Maintenance records",
    ordering: &["-performed_at", "-created_at"],
    fields: &[
        FieldMeta::big_auto_id(),
        FieldMeta::foreign_key(
            "machine",
            "machine_id",
            "MaintenanceMachine",
            DeletionPolicy::Cascade,
        ),
        FieldMeta::foreign_key("task", "task_id", "MaintenanceTask", DeletionPolicy::SetNull)
            .optional(),
        FieldMeta::text("performed_by").optional(),
        FieldMeta::date("performed_at").optional(),
        FieldMeta::text("notes").optional(),
        FieldMeta::json("attachments").with_default(),
        FieldMeta::integer("downtime_minutes").optional(),
        FieldMeta::decimal("labor_hours", 10, 2).optional(),
        FieldMeta::json("parts_used").with_default(),
        FieldMeta::datetime("created_at"),
    ],
    unique_together: &[],
    derived: &[],
    admin: None,
};

impl Entity for MaintenanceRecord {
    fn meta() -> &'static EntityMeta {
        &MAINTENANCE_RECORD
    }

    fn from_row(row: &Row) -> Result<Self, DbError> {
        Ok(Self {
            id: column(row, "id")?,
            machine_id: column(row, "machine_id")?,
            task_id: column(row, "task_id")?,
            performed_by: column(row, "performed_by")?,
            performed_at: column(row, "performed_at")?,
            notes: column(row, "notes")?,
            attachments: column(row, "attachments")?,
            downtime_minutes: column(row, "downtime_minutes")?,
            labor_hours: column(row, "labor_hours")?,
            parts_used: column(row, "parts_used")?,
            created_at: column(row, "created_at")?,
        })
    }
}

impl fmt::Display for MaintenanceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "machine #{} maintenance", self.machine_id)
    }
}
