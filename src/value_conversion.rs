//! Bridge from SeaQuery `Value`s to `may_postgres` parameters.
//!
//! Catalog list queries and uniqueness lookups are built with SeaQuery and
//! only ever bind text, integers, booleans and NULLs, so that is all this
//! supports. Anything else is rejected rather than guessed at.

use crate::executor::DbError;
use may_postgres::types::ToSql;
use sea_query::Value;

/// Convert SeaQuery values to `may_postgres` parameters and run `f` with them
///
/// The boxed parameters live until `f` returns, so the borrowed slice handed
/// to the closure stays valid for the whole database call.
///
/// # Errors
///
/// Returns `DbError::Other` for value types the catalog never binds, or
/// whatever `f` returns.
pub fn with_converted_params<F, R>(values: &sea_query::Values, f: F) -> Result<R, DbError>
where
    F: FnOnce(&[&dyn ToSql]) -> Result<R, DbError>,
{
    let mut owned: Vec<Box<dyn ToSql + Sync>> = Vec::with_capacity(values.0.len());

    for value in values.iter() {
        let param: Box<dyn ToSql + Sync> = match value {
            Value::Bool(v) => Box::new(*v),
            Value::TinyInt(v) => Box::new(v.map(i32::from)),
            Value::SmallInt(v) => Box::new(v.map(i32::from)),
            Value::Int(v) => Box::new(*v),
            Value::BigInt(v) => Box::new(*v),
            Value::TinyUnsigned(v) => Box::new(v.map(i32::from)),
            Value::SmallUnsigned(v) => Box::new(v.map(i32::from)),
            Value::Unsigned(v) => Box::new(v.map(i64::from)),
            Value::BigUnsigned(v) => Box::new(big_unsigned(*v)?),
            Value::String(v) => Box::new(v.clone()),
            _ => {
                return Err(DbError::Other(format!(
                    "Unsupported value type in query: {value:?}"
                )))
            }
        };
        owned.push(param);
    }

    let params: Vec<&dyn ToSql> = owned.iter().map(|p| p.as_ref() as &dyn ToSql).collect();
    f(&params)
}

fn big_unsigned(value: Option<u64>) -> Result<Option<i64>, DbError> {
    value
        .map(|u| {
            i64::try_from(u).map_err(|_| {
                DbError::Other(format!(
                    "BigUnsigned value {u} exceeds i64::MAX, cannot be bound as BIGINT"
                ))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converts_mixed_values() {
        let values = sea_query::Values(vec![
            Value::String(Some("%BOLT%".to_string())),
            Value::BigUnsigned(Some(25)),
            Value::Bool(None),
        ]);
        let count = with_converted_params(&values, |params| Ok(params.len())).unwrap();
        assert_eq!(count, 3);
    }

    #[test]
    fn test_rejects_oversized_unsigned() {
        let values = sea_query::Values(vec![Value::BigUnsigned(Some(u64::MAX))]);
        let err = with_converted_params(&values, |_| Ok(())).unwrap_err();
        assert!(err.to_string().contains("exceeds i64::MAX"));
    }

    #[test]
    fn test_rejects_unsupported_values() {
        let values = sea_query::Values(vec![Value::Double(Some(1.5))]);
        assert!(with_converted_params(&values, |_| Ok(())).is_err());
    }
}
