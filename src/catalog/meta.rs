//! Entity and field metadata.
//!
//! Everything here is `const`: each entity declares one `static EntityMeta`
//! that the admin UI reads to build list pages, filters and edit forms.

use crate::executor::DbError;
use may_postgres::Row;
use serde::Serialize;
use std::fmt;

/// What happens to referencing rows when the referenced row is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DeletionPolicy {
    /// Referencing rows are deleted too
    Cascade,
    /// The reference is cleared
    SetNull,
    /// Deletion is refused while referencing rows exist
    Restrict,
}

impl fmt::Display for DeletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeletionPolicy::Cascade => write!(f, "CASCADE"),
            DeletionPolicy::SetNull => write!(f, "SET NULL"),
            DeletionPolicy::Restrict => write!(f, "RESTRICT"),
        }
    }
}

/// Field type as the admin sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum FieldKind {
    /// `integer` surrogate key
    AutoId,
    /// `bigint` surrogate key
    BigAutoId,
    Integer,
    Decimal { max_digits: u32, decimal_places: u32 },
    Char { max_length: u32 },
    Text,
    Email { max_length: u32 },
    Boolean,
    Date,
    DateTime,
    Json,
    ForeignKey {
        /// Entity name of the referenced record
        target: &'static str,
        on_delete: DeletionPolicy,
    },
}

/// One persisted attribute of an entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldMeta {
    /// Attribute name; what forms, filters and lookups use
    pub name: &'static str,
    /// Column name in the table
    pub column: &'static str,
    pub kind: FieldKind,
    /// The column accepts NULL
    pub nullable: bool,
    /// The field may be left empty in forms
    pub blank: bool,
    pub unique: bool,
    /// The database supplies a value when none is given
    pub has_default: bool,
    pub primary_key: bool,
}

impl FieldMeta {
    pub const fn new(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            column: name,
            kind,
            nullable: false,
            blank: false,
            unique: false,
            has_default: false,
            primary_key: false,
        }
    }

    pub const fn auto_id() -> Self {
        Self::new("id", FieldKind::AutoId).key()
    }

    pub const fn big_auto_id() -> Self {
        Self::new("id", FieldKind::BigAutoId).key()
    }

    pub const fn char(name: &'static str, max_length: u32) -> Self {
        Self::new(name, FieldKind::Char { max_length })
    }

    pub const fn text(name: &'static str) -> Self {
        Self::new(name, FieldKind::Text)
    }

    pub const fn email(name: &'static str, max_length: u32) -> Self {
        Self::new(name, FieldKind::Email { max_length })
    }

    pub const fn integer(name: &'static str) -> Self {
        Self::new(name, FieldKind::Integer)
    }

    pub const fn decimal(name: &'static str, max_digits: u32, decimal_places: u32) -> Self {
        Self::new(
            name,
            FieldKind::Decimal {
                max_digits,
                decimal_places,
            },
        )
    }

    pub const fn boolean(name: &'static str) -> Self {
        Self::new(name, FieldKind::Boolean)
    }

    pub const fn date(name: &'static str) -> Self {
        Self::new(name, FieldKind::Date)
    }

    pub const fn datetime(name: &'static str) -> Self {
        Self::new(name, FieldKind::DateTime)
    }

    pub const fn json(name: &'static str) -> Self {
        Self::new(name, FieldKind::Json)
    }

    /// Reference to `target` stored in `column`
    pub const fn foreign_key(
        name: &'static str,
        column: &'static str,
        target: &'static str,
        on_delete: DeletionPolicy,
    ) -> Self {
        let mut field = Self::new(name, FieldKind::ForeignKey { target, on_delete });
        field.column = column;
        field
    }

    /// Nullable in the database and optional in forms
    pub const fn optional(mut self) -> Self {
        self.nullable = true;
        self.blank = true;
        self
    }

    /// Optional in forms; stored as an empty value
    pub const fn blank(mut self) -> Self {
        self.blank = true;
        self
    }

    pub const fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub const fn with_default(mut self) -> Self {
        self.has_default = true;
        self
    }

    const fn key(mut self) -> Self {
        self.primary_key = true;
        self.unique = true;
        self.has_default = true;
        self
    }

    /// A form must supply a non-empty value
    pub fn is_required(&self) -> bool {
        !(self.blank || self.has_default || self.primary_key)
    }

    /// Referenced entity and deletion policy, for foreign keys
    pub fn relation(&self) -> Option<(&'static str, DeletionPolicy)> {
        match self.kind {
            FieldKind::ForeignKey { target, on_delete } => Some((target, on_delete)),
            _ => None,
        }
    }
}

/// A value computed from related rows, shown next to the stored fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DerivedField {
    pub name: &'static str,
    pub label: &'static str,
}

/// A child entity edited on its parent's page
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct InlineMeta {
    /// Entity name of the child
    pub entity: &'static str,
    /// Field on the child pointing at the parent
    pub fk_field: &'static str,
    /// Number of blank rows offered
    pub extra: u32,
    /// Fields shown; empty means all
    pub fields: &'static [&'static str],
    pub readonly_fields: &'static [&'static str],
    pub autocomplete_fields: &'static [&'static str],
    pub can_delete: bool,
    pub show_change_link: bool,
}

impl InlineMeta {
    pub const fn tabular(entity: &'static str, fk_field: &'static str) -> Self {
        Self {
            entity,
            fk_field,
            extra: 0,
            fields: &[],
            readonly_fields: &[],
            autocomplete_fields: &[],
            can_delete: true,
            show_change_link: false,
        }
    }
}

/// Changelist and edit page configuration
///
/// Field names are attribute names of the entity. `search_fields` also accept
/// `relation__field` lookups that follow foreign keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AdminOptions {
    pub list_display: &'static [&'static str],
    pub list_filter: &'static [&'static str],
    pub list_editable: &'static [&'static str],
    pub search_fields: &'static [&'static str],
    /// Overrides the entity ordering on the changelist; empty keeps it
    pub ordering: &'static [&'static str],
    pub readonly_fields: &'static [&'static str],
    pub autocomplete_fields: &'static [&'static str],
    pub raw_id_fields: &'static [&'static str],
    pub date_hierarchy: Option<&'static str>,
    pub inlines: &'static [InlineMeta],
}

impl AdminOptions {
    pub const EMPTY: AdminOptions = AdminOptions {
        list_display: &[],
        list_filter: &[],
        list_editable: &[],
        search_fields: &[],
        ordering: &[],
        readonly_fields: &[],
        autocomplete_fields: &[],
        raw_id_fields: &[],
        date_hierarchy: None,
        inlines: &[],
    };
}

/// Static description of one table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntityMeta {
    pub name: &'static str,
    pub table: &'static str,
    pub verbose_name: &'static str,
    pub verbose_name_plural: &'static str,
    /// Default ordering; `-field` is descending
    pub ordering: &'static [&'static str],
    pub fields: &'static [FieldMeta],
    pub unique_together: &'static [&'static [&'static str]],
    pub derived: &'static [DerivedField],
    /// `None` when the entity has no admin page of its own
    pub admin: Option<AdminOptions>,
}

impl EntityMeta {
    pub fn field(&self, name: &str) -> Option<&'static FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_by_column(&self, column: &str) -> Option<&'static FieldMeta> {
        self.fields.iter().find(|f| f.column == column)
    }

    pub fn primary_key(&self) -> Option<&'static FieldMeta> {
        self.fields.iter().find(|f| f.primary_key)
    }

    pub fn is_derived(&self, name: &str) -> bool {
        self.derived.iter().any(|d| d.name == name)
    }

    /// Foreign key fields, in declaration order
    pub fn relations(&self) -> impl Iterator<Item = &'static FieldMeta> {
        self.fields.iter().filter(|f| f.relation().is_some())
    }

    /// Admin ordering when configured, otherwise the entity ordering
    pub fn changelist_ordering(&self) -> &'static [&'static str] {
        match self.admin {
            Some(admin) if !admin.ordering.is_empty() => admin.ordering,
            _ => self.ordering,
        }
    }

    /// Fields the edit form must not change
    pub fn readonly_fields(&self) -> &'static [&'static str] {
        match self.admin {
            Some(admin) => admin.readonly_fields,
            None => &[],
        }
    }
}

/// A typed record backed by one table
pub trait Entity: Sized + fmt::Display {
    /// Static metadata for this entity
    fn meta() -> &'static EntityMeta;

    /// Build a record from a row holding the entity's columns by name
    ///
    /// # Errors
    ///
    /// Returns `DbError::Parse` if a column is missing or has an unexpected type.
    fn from_row(row: &Row) -> Result<Self, DbError>;
}
