//! Row records and value coercion.
//!
//! # Responsibility
//! - Represent a fetched row as ordered (column, value) pairs.
//! - Coerce records into registered result types through a column-to-field
//!   map.
//! - Provide the lenient value conversions entity `set` implementations use.
//!
//! # Invariants
//! - Record columns not present in the active result map are skipped, never
//!   an error.
//! - Conversion failures name the offending field and value.

use crate::meta::{Entity, Value};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// One fetched row: column names as returned by the driver, in select order.
pub type Record = Vec<(String, Value)>;

/// Row-to-object coercion failure.
#[derive(Debug)]
pub enum ConversionError {
    /// The result map named a field the target type does not carry.
    UnknownField {
        type_name: &'static str,
        field: String,
    },
    /// A column value cannot be converted to the field's shape.
    Incompatible {
        field: String,
        expected: &'static str,
        value: String,
    },
}

impl Display for ConversionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownField { type_name, field } => {
                write!(f, "type `{type_name}` has no field `{field}`")
            }
            Self::Incompatible {
                field,
                expected,
                value,
            } => write!(
                f,
                "field `{field}` expects {expected}, got incompatible value {value}"
            ),
        }
    }
}

impl Error for ConversionError {}

fn incompatible(field: &str, expected: &'static str, value: &Value) -> ConversionError {
    ConversionError::Incompatible {
        field: field.to_string(),
        expected,
        value: format!("{value:?}"),
    }
}

/// Coerces one record into `E` using a column-name-to-field map.
///
/// Column names are compared upper-cased; unmapped columns are ignored.
pub fn coerce<E: Entity>(
    record: &Record,
    map: &HashMap<String, &'static str>,
) -> Result<E, ConversionError> {
    let mut out = E::default();
    for (column, value) in record {
        if let Some(field) = map.get(column.to_uppercase().as_str()) {
            out.set(field, value.clone())?;
        }
    }
    Ok(out)
}

/// Converts a value into an optional integer field.
pub fn opt_i64(field: &str, value: Value) -> Result<Option<i64>, ConversionError> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(v) => Ok(Some(v)),
        other => Err(incompatible(field, "an integer", &other)),
    }
}

/// Converts a value into an optional float field. Integers widen.
pub fn opt_f64(field: &str, value: Value) -> Result<Option<f64>, ConversionError> {
    match value {
        Value::Null => Ok(None),
        Value::Real(v) => Ok(Some(v)),
        Value::Integer(v) => Ok(Some(v as f64)),
        other => Err(incompatible(field, "a float", &other)),
    }
}

/// Converts a value into an optional text field. Numbers render to text.
pub fn opt_text(field: &str, value: Value) -> Result<Option<String>, ConversionError> {
    match value {
        Value::Null => Ok(None),
        Value::Text(v) => Ok(Some(v)),
        Value::Integer(v) => Ok(Some(v.to_string())),
        Value::Real(v) => Ok(Some(v.to_string())),
        other => Err(incompatible(field, "text", &other)),
    }
}

/// Converts a value into an optional boolean field (0/1 integers).
pub fn opt_bool(field: &str, value: Value) -> Result<Option<bool>, ConversionError> {
    match value {
        Value::Null => Ok(None),
        Value::Integer(0) => Ok(Some(false)),
        Value::Integer(1) => Ok(Some(true)),
        other => Err(incompatible(field, "a boolean", &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::{opt_bool, opt_f64, opt_i64, opt_text, ConversionError};
    use crate::meta::Value;

    #[test]
    fn null_converts_to_none_everywhere() {
        assert_eq!(opt_i64("f", Value::Null).unwrap(), None);
        assert_eq!(opt_f64("f", Value::Null).unwrap(), None);
        assert_eq!(opt_text("f", Value::Null).unwrap(), None);
        assert_eq!(opt_bool("f", Value::Null).unwrap(), None);
    }

    #[test]
    fn integer_widens_to_float() {
        assert_eq!(opt_f64("f", Value::Integer(3)).unwrap(), Some(3.0));
    }

    #[test]
    fn incompatible_value_names_the_field() {
        let err = opt_i64("age", Value::Text("ten".into())).unwrap_err();
        match err {
            ConversionError::Incompatible { field, .. } => assert_eq!(field, "age"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn bool_rejects_out_of_range_integers() {
        assert!(opt_bool("deleted", Value::Integer(2)).is_err());
    }
}
