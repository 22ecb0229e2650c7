//! Dialect adapter for SQL type derivation.
//!
//! # Responsibility
//! - Map semantic field types to SQL type defines.
//! - Normalize live column type text for declared-vs-live comparison.

use crate::meta::FieldType;

/// Per-dialect SQL type derivation. Different databases plug in here.
pub trait DbAdapter: Send + Sync {
    /// SQL type define for a declared field.
    fn sql_type(&self, kind: FieldType, length: u32) -> String;

    /// Normalized type define for a live column, from the introspected
    /// declaration text and reported size.
    fn live_type(&self, declared: &str, size: u32) -> String;
}

/// Default adapter matching the SQLite driver boundary.
pub struct SqliteAdapter;

impl DbAdapter for SqliteAdapter {
    fn sql_type(&self, kind: FieldType, length: u32) -> String {
        match kind {
            FieldType::BigInt => "BIGINT".to_string(),
            FieldType::Integer => "INTEGER".to_string(),
            FieldType::Double => "DOUBLE".to_string(),
            FieldType::Float => "FLOAT".to_string(),
            FieldType::Text => format!("VARCHAR({length})"),
            FieldType::Timestamp => "TIMESTAMP".to_string(),
            FieldType::Date => "DATE".to_string(),
            FieldType::Boolean => "BOOLEAN".to_string(),
            FieldType::Clob => "CLOB".to_string(),
        }
    }

    fn live_type(&self, declared: &str, size: u32) -> String {
        let normalized: String = declared
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_uppercase();
        // Bare VARCHAR reported without a length gets the introspected size.
        if normalized == "VARCHAR" {
            return format!("VARCHAR({size})");
        }
        normalized
    }
}

#[cfg(test)]
mod tests {
    use super::{DbAdapter, SqliteAdapter};
    use crate::meta::FieldType;

    #[test]
    fn text_carries_declared_length() {
        assert_eq!(SqliteAdapter.sql_type(FieldType::Text, 64), "VARCHAR(64)");
    }

    #[test]
    fn live_type_normalizes_case_and_spacing() {
        assert_eq!(SqliteAdapter.live_type("varchar (256)", 0), "VARCHAR(256)");
        assert_eq!(SqliteAdapter.live_type("VARCHAR", 64), "VARCHAR(64)");
        assert_eq!(SqliteAdapter.live_type("bigint", 0), "BIGINT");
    }
}
