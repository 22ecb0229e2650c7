//! Table derivation and additive schema reconciliation.
//!
//! # Responsibility
//! - Derive a `TableDefinition` (name + ordered column mappings) from each
//!   entity descriptor.
//! - Reconcile declared definitions against live database metadata at
//!   startup: create-or-alter, never drop.
//!
//! # Invariants
//! - Column names are unique within a table, case-insensitively.
//! - Reconciliation mutates the live database only; in-memory definitions
//!   never change after registration.
//! - DDL application is at-least-once and non-transactional: a failure may
//!   leave earlier statements applied.

use crate::db::{Db, DbError};
use crate::meta::{LookupError, TypeDescriptor, Value};
use crate::naming::camel_to_under_score;
use log::{debug, info};
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod adapter;

pub use adapter::{DbAdapter, SqliteAdapter};

/// One declared column: field identifier, column name, SQL type define.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMapping {
    pub field: &'static str,
    pub column: String,
    pub type_define: String,
}

/// One declared table: name plus ordered column mappings. Computed once at
/// registration, immutable thereafter.
#[derive(Debug, Clone)]
pub struct TableDefinition {
    pub table_name: String,
    pub columns: Vec<ColumnMapping>,
}

impl TableDefinition {
    /// The column mapping with the given column name, if declared.
    pub fn column(&self, column_name: &str) -> Option<&ColumnMapping> {
        self.columns
            .iter()
            .find(|c| c.column.eq_ignore_ascii_case(column_name))
    }
}

/// DDL or metadata failure during reconciliation. Fatal at startup.
#[derive(Debug)]
pub enum SchemaError {
    DuplicateColumn { table: String, column: String },
    Ddl {
        table: String,
        sql: String,
        source: DbError,
    },
    Introspect { table: String, source: DbError },
}

impl Display for SchemaError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DuplicateColumn { table, column } => {
                write!(f, "table `{table}` declares column `{column}` twice")
            }
            Self::Ddl { table, sql, source } => {
                write!(f, "DDL failed for table `{table}`: {source} (sql: {sql})")
            }
            Self::Introspect { table, source } => {
                write!(f, "metadata introspection failed for table `{table}`: {source}")
            }
        }
    }
}

impl Error for SchemaError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::DuplicateColumn { .. } => None,
            Self::Ddl { source, .. } | Self::Introspect { source, .. } => Some(source),
        }
    }
}

/// Registry of derived table definitions, keyed by entity type name.
pub struct SchemaRegistry {
    adapter: Box<dyn DbAdapter>,
    tables: HashMap<&'static str, TableDefinition>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new(Box::new(SqliteAdapter))
    }
}

impl SchemaRegistry {
    pub fn new(adapter: Box<dyn DbAdapter>) -> Self {
        Self {
            adapter,
            tables: HashMap::new(),
        }
    }

    /// Derives and stores the table definition for one entity descriptor.
    pub(crate) fn register(
        &mut self,
        descriptor: &TypeDescriptor,
    ) -> Result<&TableDefinition, SchemaError> {
        let declared = descriptor
            .table
            .as_ref()
            .and_then(|t| t.name)
            .unwrap_or(descriptor.type_name);
        let table_name = camel_to_under_score(declared);

        let mut columns = Vec::new();
        let mut seen = HashSet::new();
        for (field, spec) in descriptor.persistent_fields() {
            let column = camel_to_under_score(spec.name.unwrap_or(field));
            if !seen.insert(column.to_uppercase()) {
                return Err(SchemaError::DuplicateColumn {
                    table: table_name,
                    column,
                });
            }
            columns.push(ColumnMapping {
                field,
                column,
                type_define: self.adapter.sql_type(spec.kind, spec.length),
            });
        }

        debug!(
            "event=table_register module=schema status=ok type={} table={} columns={}",
            descriptor.type_name,
            table_name,
            columns.len()
        );
        let definition = TableDefinition {
            table_name,
            columns,
        };
        Ok(self
            .tables
            .entry(descriptor.type_name)
            .or_insert(definition))
    }

    /// Looks up the definition derived for a registered entity type.
    pub fn table_info(&self, type_name: &str) -> Result<&TableDefinition, LookupError> {
        self.tables
            .get(type_name)
            .ok_or_else(|| LookupError::UnknownEntity {
                type_name: type_name.to_string(),
            })
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableDefinition> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub(crate) fn adapter(&self) -> &dyn DbAdapter {
        self.adapter.as_ref()
    }
}

/// Reconciles one declared table against live database metadata.
///
/// Absent table: one `CREATE TABLE` with the `ID` primary key first and the
/// remaining declared columns in declaration order. Present table: add every
/// declared column missing live, alter every declared column whose live type
/// define differs. Live columns outside the declaration are left alone.
pub(crate) fn reconcile(db: &Db, table: &TableDefinition) -> Result<(), SchemaError> {
    let exists = db
        .query_scalar::<i64>(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND UPPER(name) = ?1",
            &[Value::Text(table.table_name.to_uppercase())],
        )
        .map_err(|source| SchemaError::Introspect {
            table: table.table_name.clone(),
            source,
        })?
        .unwrap_or(0)
        > 0;

    if !exists {
        let mut defines = vec!["ID BIGINT PRIMARY KEY".to_string()];
        for column in &table.columns {
            if column.column.eq_ignore_ascii_case("ID") {
                continue;
            }
            defines.push(format!("{} {}", column.column, column.type_define));
        }
        let sql = format!("create table {} ({})", table.table_name, defines.join(", "));
        run_ddl(db, table, &sql)?;
        info!(
            "event=schema_sync module=schema status=ok table={} action=create",
            table.table_name
        );
        return Ok(());
    }

    let live = live_columns(db, table)?;
    let mut altered = 0usize;
    for column in &table.columns {
        let key = column.column.to_uppercase();
        match live.get(&key) {
            None => {
                let sql = format!(
                    "alter table {} add column {} {}",
                    table.table_name, column.column, column.type_define
                );
                run_ddl(db, table, &sql)?;
                altered += 1;
            }
            Some(live_define) if !live_define.eq_ignore_ascii_case(&column.type_define) => {
                let sql = format!(
                    "alter table {} alter column {} {}",
                    table.table_name, column.column, column.type_define
                );
                run_ddl(db, table, &sql)?;
                altered += 1;
            }
            Some(_) => {}
        }
    }
    info!(
        "event=schema_sync module=schema status=ok table={} action=diff altered={altered}",
        table.table_name
    );
    Ok(())
}

fn run_ddl(db: &Db, table: &TableDefinition, sql: &str) -> Result<(), SchemaError> {
    db.execute(sql, &[]).map_err(|source| SchemaError::Ddl {
        table: table.table_name.clone(),
        sql: sql.to_string(),
        source,
    })?;
    Ok(())
}

/// Live column name (upper-cased) to normalized type define.
fn live_columns(db: &Db, table: &TableDefinition) -> Result<HashMap<String, String>, SchemaError> {
    let sql = format!("PRAGMA table_info({})", table.table_name);
    let rows = db
        .query_rows(&sql, &[])
        .map_err(|source| SchemaError::Introspect {
            table: table.table_name.clone(),
            source,
        })?;

    let mut live = HashMap::new();
    for record in rows {
        let mut name = None;
        let mut declared = None;
        for (column, value) in record {
            match (column.as_str(), value) {
                ("name", Value::Text(v)) => name = Some(v),
                ("type", Value::Text(v)) => declared = Some(v),
                _ => {}
            }
        }
        if let (Some(name), Some(declared)) = (name, declared) {
            let define = db.schema.adapter().live_type(&declared, 0);
            live.insert(name.to_uppercase(), define);
        }
    }
    Ok(live)
}
