//! Edit form validation.
//!
//! Form values arrive as strings keyed by field name. Validation follows the
//! field metadata: required fields, read-only fields, lengths, decimal
//! digits, number/date/email/JSON syntax. Uniqueness needs the database and
//! is split out into [`unique_checks`] and [`check_unique`].

use crate::catalog::meta::{EntityMeta, FieldKind, FieldMeta};
use crate::executor::{DbError, DbExecutor};
use crate::migration::quote_ident;
use crate::value_conversion::with_converted_params;
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use sea_query::{Expr, ExprTrait, PostgresQueryBuilder, Query};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s.]+$";

static EMAIL_RE: Lazy<Result<Regex, regex::Error>> = Lazy::new(|| Regex::new(EMAIL_PATTERN));

/// Whether the form creates a record or edits an existing one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMode {
    /// Every required field must be present
    Create,
    /// Absent fields keep their stored value
    Update,
}

/// Validation errors keyed by field name; `__all__` holds errors that span fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub const NON_FIELD: &'static str = "__all__";

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0.entry(field.to_string()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Messages for one field, empty when it is valid
    pub fn get(&self, field: &str) -> &[String] {
        self.0.get(field).map_or(&[], Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn merge(&mut self, other: FormErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    /// `Ok(())` when there are no errors
    ///
    /// # Errors
    ///
    /// Returns `self` when any field has an error.
    pub fn into_result(self) -> Result<(), FormErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for FormErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for FormErrors {}

/// Validate submitted `values` against `meta`
///
/// # Errors
///
/// Returns every problem found, keyed by field.
pub fn validate_form(
    meta: &EntityMeta,
    values: &BTreeMap<String, String>,
    mode: FormMode,
) -> Result<(), FormErrors> {
    let mut errors = FormErrors::default();

    for name in values.keys() {
        if meta.field(name).is_none() {
            errors.add(name, "Unknown field.");
        }
    }

    let readonly = meta.readonly_fields();
    for field in meta.fields {
        let value = values.get(field.name).map(|v| v.trim());
        if field.primary_key || readonly.contains(&field.name) {
            if value.is_some() {
                errors.add(field.name, "This field is read-only.");
            }
            continue;
        }
        match value {
            None => {
                if mode == FormMode::Create && field.is_required() {
                    errors.add(field.name, "This field is required.");
                }
            }
            Some("") => {
                if field.is_required() {
                    errors.add(field.name, "This field is required.");
                }
            }
            Some(v) => {
                if let Err(message) = check_value(field, v) {
                    errors.add(field.name, message);
                }
            }
        }
    }

    errors.into_result()
}

fn check_value(field: &FieldMeta, value: &str) -> Result<(), String> {
    match field.kind {
        FieldKind::Char { max_length } => check_length(value, max_length),
        FieldKind::Email { max_length } => {
            check_length(value, max_length)?;
            if is_email(value) {
                Ok(())
            } else {
                Err("Enter a valid email address.".to_string())
            }
        }
        FieldKind::Text => Ok(()),
        FieldKind::Integer | FieldKind::AutoId => value
            .parse::<i32>()
            .map(|_| ())
            .map_err(|_| integer_message(value)),
        FieldKind::BigAutoId => value
            .parse::<i64>()
            .map(|_| ())
            .map_err(|_| integer_message(value)),
        FieldKind::Decimal {
            max_digits,
            decimal_places,
        } => check_decimal(value, max_digits, decimal_places),
        FieldKind::Boolean => parse_bool(value)
            .map(|_| ())
            .ok_or_else(|| format!("'{value}' value must be either True or False.")),
        FieldKind::Date => parse_date(value)
            .map(|_| ())
            .ok_or_else(|| "Enter a valid date.".to_string()),
        FieldKind::DateTime => parse_datetime(value)
            .map(|_| ())
            .ok_or_else(|| "Enter a valid date/time.".to_string()),
        FieldKind::Json => serde_json::from_str::<serde_json::Value>(value)
            .map(|_| ())
            .map_err(|_| "Enter a valid JSON.".to_string()),
        FieldKind::ForeignKey { .. } => value.parse::<i64>().map(|_| ()).map_err(|_| {
            "Select a valid choice. That choice is not one of the available choices.".to_string()
        }),
    }
}

fn check_length(value: &str, max_length: u32) -> Result<(), String> {
    let length = value.chars().count();
    if length > max_length as usize {
        Err(format!(
            "Ensure this value has at most {max_length} characters (it has {length})."
        ))
    } else {
        Ok(())
    }
}

fn integer_message(value: &str) -> String {
    if value.trim_start_matches(['-', '+']).chars().all(|c| c.is_ascii_digit()) && !value.is_empty() {
        "Ensure this value is within the range of the column.".to_string()
    } else {
        "Enter a whole number.".to_string()
    }
}

/// Digit counting follows the submitted representation: `1.50` has two decimal places
fn check_decimal(value: &str, max_digits: u32, decimal_places: u32) -> Result<(), String> {
    let d = Decimal::from_str(value).map_err(|_| "Enter a number.".to_string())?;
    let mantissa = d.mantissa().unsigned_abs();
    let mantissa_len = mantissa.to_string().len() as u32;
    let scale = d.scale();

    let (digits, decimals) = if scale == 0 {
        (if mantissa == 0 { 0 } else { mantissa_len }, 0)
    } else if scale > mantissa_len {
        (scale, scale)
    } else {
        (mantissa_len, scale)
    };
    let whole_digits = digits - decimals;

    if digits > max_digits {
        return Err(format!(
            "Ensure that there are no more than {max_digits} digits in total."
        ));
    }
    if decimals > decimal_places {
        return Err(format!(
            "Ensure that there are no more than {decimal_places} decimal places."
        ));
    }
    if whole_digits > max_digits.saturating_sub(decimal_places) {
        return Err(format!(
            "Ensure that there are no more than {} digits before the decimal point.",
            max_digits.saturating_sub(decimal_places)
        ));
    }
    Ok(())
}

fn is_email(value: &str) -> bool {
    match &*EMAIL_RE {
        Ok(re) => re.is_match(value),
        Err(e) => {
            log::error!("email pattern failed to compile: {e}");
            false
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "on" | "1" | "yes" => Some(true),
        "false" | "off" | "0" | "no" => Some(false),
        _ => None,
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Render a value the way PostgreSQL prints the column as text
pub(crate) fn normalize(field: &FieldMeta, value: &str) -> String {
    let value = value.trim();
    match field.kind {
        FieldKind::Integer | FieldKind::AutoId | FieldKind::BigAutoId | FieldKind::ForeignKey { .. } => {
            value.parse::<i64>().map_or_else(|_| value.to_string(), |n| n.to_string())
        }
        FieldKind::Decimal { decimal_places, .. } => match Decimal::from_str(value) {
            Ok(mut d) => {
                d.rescale(decimal_places);
                d.to_string()
            }
            Err(_) => value.to_string(),
        },
        FieldKind::Boolean => match parse_bool(value) {
            Some(b) => b.to_string(),
            None => value.to_string(),
        },
        FieldKind::Date => parse_date(value).map_or_else(|| value.to_string(), |d| d.to_string()),
        _ => value.to_string(),
    }
}

/// One uniqueness lookup; a returned row means the values are taken
#[derive(Debug, Clone)]
pub struct UniqueCheck {
    /// Fields that must be unique together; one entry for a unique field
    pub fields: Vec<&'static str>,
    pub sql: String,
    pub values: sea_query::Values,
}

/// Build the uniqueness lookups for `values`
///
/// Covers unique fields and `unique_together` groups whose values are all
/// present and non-empty. `exclude_id` leaves the record being edited out.
pub fn unique_checks(
    meta: &EntityMeta,
    values: &BTreeMap<String, String>,
    exclude_id: Option<i64>,
) -> Vec<UniqueCheck> {
    let mut groups: Vec<Vec<&'static FieldMeta>> = meta
        .fields
        .iter()
        .filter(|f| f.unique && !f.primary_key)
        .map(|f| vec![f])
        .collect();
    for group in meta.unique_together {
        let fields: Option<Vec<&'static FieldMeta>> = group.iter().map(|name| meta.field(name)).collect();
        if let Some(fields) = fields {
            groups.push(fields);
        }
    }

    groups
        .into_iter()
        .filter_map(|fields| build_check(meta, &fields, values, exclude_id))
        .collect()
}

fn build_check(
    meta: &EntityMeta,
    fields: &[&'static FieldMeta],
    values: &BTreeMap<String, String>,
    exclude_id: Option<i64>,
) -> Option<UniqueCheck> {
    let mut query = Query::select();
    query.expr(Expr::cust("1")).from(meta.table);

    for field in fields {
        let value = values.get(field.name).map(|v| v.trim()).filter(|v| !v.is_empty())?;
        query.and_where(
            Expr::cust(format!("CAST({} AS TEXT)", quote_ident(field.column))).eq(normalize(field, value)),
        );
    }
    if let (Some(id), Some(pk)) = (exclude_id, meta.primary_key()) {
        query.and_where(
            Expr::cust(format!("CAST({} AS TEXT)", quote_ident(pk.column))).ne(id.to_string()),
        );
    }
    query.limit(1);

    let (sql, values) = query.build(PostgresQueryBuilder);
    Some(UniqueCheck {
        fields: fields.iter().map(|f| f.name).collect(),
        sql,
        values,
    })
}

/// Run the uniqueness lookups and report violations as form errors
///
/// # Errors
///
/// Returns `DbError` if a lookup fails. Violations are not errors here: they
/// come back in the returned `FormErrors`.
pub fn check_unique(
    executor: &dyn DbExecutor,
    meta: &EntityMeta,
    values: &BTreeMap<String, String>,
    exclude_id: Option<i64>,
) -> Result<FormErrors, DbError> {
    let mut errors = FormErrors::default();
    for check in unique_checks(meta, values, exclude_id) {
        let rows = with_converted_params(&check.values, |params| {
            executor.query_all(&check.sql, params)
        })?;
        if rows.is_empty() {
            continue;
        }
        let labels: Vec<String> = check.fields.iter().map(|f| label(f)).collect();
        let message = format!(
            "{} with this {} already exists.",
            meta.verbose_name,
            labels.join(" and ")
        );
        match check.fields.as_slice() {
            [single] => errors.add(single, message),
            _ => errors.add(FormErrors::NON_FIELD, message),
        }
    }
    Ok(errors)
}

/// `inventory_item` -> `Inventory item`
fn label(name: &str) -> String {
    let spaced = name.replace('_', " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::cycle_counts::CYCLE_COUNT_LINE;
    use crate::catalog::inventory::{INVENTORY_ITEM, INVENTORY_ITEM_LOCATION};
    use crate::catalog::purchasing::SUPPLIER;
    use may_postgres::types::ToSql;
    use may_postgres::Row;
    use std::sync::Mutex;

    fn form(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn valid_item() -> BTreeMap<String, String> {
        form(&[
            ("item", "Hinge, 4in"),
            ("sku", "HNG-4"),
            ("location", "A.3"),
            ("stock", "12"),
            ("committed_qty", "0"),
            ("status", "active"),
            ("supplier", "Acme"),
            ("reorder_point", "5"),
            ("lead_time_days", "14"),
        ])
    }

    #[test]
    fn test_valid_item_passes() {
        validate_form(&INVENTORY_ITEM, &valid_item(), FormMode::Create).unwrap();
    }

    #[test]
    fn test_missing_required_field_on_create() {
        let mut values = valid_item();
        values.remove("sku");
        let errors = validate_form(&INVENTORY_ITEM, &values, FormMode::Create).unwrap_err();
        assert_eq!(errors.get("sku"), &["This field is required.".to_string()]);
        // Update keeps the stored value.
        validate_form(&INVENTORY_ITEM, &values, FormMode::Update).unwrap();
    }

    #[test]
    fn test_blank_and_default_fields_may_be_empty() {
        let mut values = valid_item();
        values.insert("part_number".to_string(), String::new());
        values.insert("finish".to_string(), "  ".to_string());
        values.insert("pack_size".to_string(), String::new());
        validate_form(&INVENTORY_ITEM, &values, FormMode::Create).unwrap();
    }

    #[test]
    fn test_readonly_field_is_rejected() {
        let mut values = valid_item();
        values.insert("average_daily_use".to_string(), "1.5".to_string());
        values.insert("id".to_string(), "9".to_string());
        let errors = validate_form(&INVENTORY_ITEM, &values, FormMode::Update).unwrap_err();
        assert_eq!(errors.get("average_daily_use").len(), 1);
        assert_eq!(errors.get("id"), &["This field is read-only.".to_string()]);
    }

    #[test]
    fn test_type_errors() {
        let mut values = valid_item();
        values.insert("stock".to_string(), "twelve".to_string());
        values.insert("sku".to_string(), "X".repeat(256));
        values.insert("supplier_ref".to_string(), "acme".to_string());
        values.insert("bogus".to_string(), "1".to_string());
        let errors = validate_form(&INVENTORY_ITEM, &values, FormMode::Create).unwrap_err();
        assert_eq!(errors.get("stock"), &["Enter a whole number.".to_string()]);
        assert!(errors.get("sku")[0].contains("at most 255 characters (it has 256)"));
        assert_eq!(errors.get("supplier_ref").len(), 1);
        assert_eq!(errors.get("bogus"), &["Unknown field.".to_string()]);
    }

    #[test]
    fn test_decimal_digit_limits() {
        assert!(check_decimal("123456789012.123456", 18, 6).is_ok());
        assert_eq!(
            check_decimal("1.1234567", 18, 6).unwrap_err(),
            "Ensure that there are no more than 6 decimal places."
        );
        assert_eq!(
            check_decimal("1234567890123", 18, 6).unwrap_err(),
            "Ensure that there are no more than 12 digits before the decimal point."
        );
        assert_eq!(
            check_decimal("123456789.12", 10, 2).unwrap_err(),
            "Ensure that there are no more than 10 digits in total."
        );
        assert_eq!(check_decimal("abc", 10, 2).unwrap_err(), "Enter a number.");
        assert!(check_decimal("0.00", 10, 2).is_ok());
    }

    #[test]
    fn test_email_and_dates() {
        let errors = validate_form(
            &SUPPLIER,
            &form(&[
                ("name", "Acme"),
                ("contact_email", "sales at acme"),
                ("created_at", "2024-02-30 10:00:00"),
                ("updated_at", "2024-02-01T10:00:00Z"),
            ]),
            FormMode::Create,
        )
        .unwrap_err();
        assert_eq!(errors.get("contact_email"), &["Enter a valid email address.".to_string()]);
        assert_eq!(errors.get("created_at"), &["Enter a valid date/time.".to_string()]);
        assert!(errors.get("updated_at").is_empty());
        assert!(is_email("sales@acme.example"));
    }

    #[test]
    fn test_unique_checks_cover_fields_and_groups() {
        let checks = unique_checks(&INVENTORY_ITEM, &valid_item(), Some(4));
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].fields, vec!["sku"]);
        assert!(checks[0].sql.contains("CAST(\"sku\" AS TEXT) = $1"), "{}", checks[0].sql);
        assert!(checks[0].sql.contains("CAST(\"id\" AS TEXT) <> $2"), "{}", checks[0].sql);
        assert!(checks[0].sql.contains("LIMIT"));

        let values = form(&[("session", "3"), ("sequence", "007"), ("inventory_item", "9")]);
        let checks = unique_checks(&CYCLE_COUNT_LINE, &values, None);
        assert_eq!(checks.len(), 1);
        assert_eq!(checks[0].fields, vec!["session", "sequence"]);
        assert!(checks[0].sql.contains("\"session_id\""));
        // Two lookup values plus the LIMIT.
        assert_eq!(checks[0].values.0.len(), 3);
        assert_eq!(checks[0].values.0[1], sea_query::Value::String(Some("7".to_string())));
    }

    #[test]
    fn test_unique_checks_skip_incomplete_groups() {
        let checks = unique_checks(&INVENTORY_ITEM_LOCATION, &form(&[("inventory_item", "3")]), None);
        assert!(checks.is_empty());
    }

    /// Answers every query with an empty result, counting calls
    struct EmptyExecutor {
        queries: Mutex<Vec<String>>,
    }

    impl DbExecutor for EmptyExecutor {
        fn execute(&self, _query: &str, _params: &[&dyn ToSql]) -> Result<u64, DbError> {
            Ok(0)
        }

        fn query_one(&self, query: &str, _params: &[&dyn ToSql]) -> Result<Row, DbError> {
            Err(DbError::Query(format!("no rows for {query}")))
        }

        fn query_all(&self, query: &str, params: &[&dyn ToSql]) -> Result<Vec<Row>, DbError> {
            assert_eq!(query.matches('$').count(), params.len());
            self.queries.lock().unwrap().push(query.to_string());
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_check_unique_without_conflicts() {
        let executor = EmptyExecutor {
            queries: Mutex::new(Vec::new()),
        };
        let errors = check_unique(&executor, &INVENTORY_ITEM, &valid_item(), None).unwrap();
        assert!(errors.is_empty());
        assert_eq!(executor.queries.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_labels() {
        assert_eq!(label("inventory_item"), "Inventory item");
        assert_eq!(label("sku"), "Sku");
    }
}
