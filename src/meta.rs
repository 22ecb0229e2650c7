//! Declarative persistence metadata.
//!
//! # Responsibility
//! - Define the descriptor types user code builds once per persistent type,
//!   replacing runtime reflection with an explicit registration step.
//! - Define the `Entity` trait giving the runtime field-level access to user
//!   values.
//!
//! # Invariants
//! - Descriptors are built once (typically in a `Lazy` static) and never
//!   mutated afterwards.
//! - Only fields carrying a `ColumnSpec` are persistent.
//! - `Entity::get` never fails; absent optional fields read as `Value::Null`.

use crate::record::ConversionError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub use rusqlite::types::Value;

/// Default maximum length for text-like columns.
pub const DEFAULT_TEXT_LENGTH: u32 = 256;

/// Semantic column type, mapped to a SQL type by the active `DbAdapter`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    BigInt,
    Integer,
    Double,
    Float,
    Text,
    Timestamp,
    Date,
    Boolean,
    Clob,
}

/// Entity marker: presence makes the type a table-backed entity.
#[derive(Debug, Clone, Default)]
pub struct TableSpec {
    /// Explicit table name override; default is the converted type name.
    pub name: Option<&'static str>,
}

/// Column marker for one field.
#[derive(Debug, Clone)]
pub struct ColumnSpec {
    /// Explicit column name override; default is the converted field name.
    pub name: Option<&'static str>,
    pub kind: FieldType,
    /// Max length for text-like columns.
    pub length: u32,
}

impl ColumnSpec {
    pub fn new(kind: FieldType) -> Self {
        Self {
            name: None,
            kind,
            length: DEFAULT_TEXT_LENGTH,
        }
    }

    pub fn named(mut self, name: &'static str) -> Self {
        self.name = Some(name);
        self
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = length;
        self
    }
}

/// Result-alias marker: maps a field to an alias column under one named
/// result map. Repeatable per field.
#[derive(Debug, Clone)]
pub struct AliasSpec {
    pub result_map: &'static str,
    pub alias: &'static str,
}

/// One declared field of a persistent or result type.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    /// Field identifier, camelCase by convention.
    pub field: &'static str,
    /// `Some` marks the field persistent.
    pub column: Option<ColumnSpec>,
    pub aliases: Vec<AliasSpec>,
}

/// Declarative metadata for one user type.
///
/// `table` is the entity marker, `result_entity` the result-type marker; a
/// type may carry both.
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub type_name: &'static str,
    pub table: Option<TableSpec>,
    pub result_entity: bool,
    pub fields: Vec<FieldSpec>,
}

impl TypeDescriptor {
    pub fn builder(type_name: &'static str) -> TypeDescriptorBuilder {
        TypeDescriptorBuilder {
            descriptor: TypeDescriptor {
                type_name,
                table: None,
                result_entity: false,
                fields: Vec::new(),
            },
        }
    }

    /// Persistent fields in declaration order.
    pub fn persistent_fields(&self) -> impl Iterator<Item = (&'static str, &ColumnSpec)> {
        self.fields
            .iter()
            .filter_map(|f| f.column.as_ref().map(|c| (f.field, c)))
    }
}

/// Builder for `TypeDescriptor`. Markers and columns are declared in the
/// order they should appear in the table.
pub struct TypeDescriptorBuilder {
    descriptor: TypeDescriptor,
}

impl TypeDescriptorBuilder {
    /// Marks the type as an entity with the default (converted) table name.
    pub fn table(mut self) -> Self {
        self.descriptor.table = Some(TableSpec::default());
        self
    }

    /// Marks the type as an entity with an explicit table name.
    pub fn table_named(mut self, name: &'static str) -> Self {
        self.descriptor.table = Some(TableSpec { name: Some(name) });
        self
    }

    /// Marks the type as a result type eligible for row coercion.
    pub fn result_entity(mut self) -> Self {
        self.descriptor.result_entity = true;
        self
    }

    /// Declares a persistent field with default column settings.
    pub fn column(self, field: &'static str, kind: FieldType) -> Self {
        self.column_spec(field, ColumnSpec::new(kind))
    }

    /// Declares a persistent field with explicit column settings.
    pub fn column_spec(mut self, field: &'static str, spec: ColumnSpec) -> Self {
        self.descriptor.fields.push(FieldSpec {
            field,
            column: Some(spec),
            aliases: Vec::new(),
        });
        self
    }

    /// Declares the `id`/`createTime`/`updateTime`/`deleted` base columns
    /// every CRUD-managed entity carries.
    pub fn base_columns(self) -> Self {
        self.column("id", FieldType::BigInt)
            .column("createTime", FieldType::Timestamp)
            .column("updateTime", FieldType::Timestamp)
            .column("deleted", FieldType::Boolean)
    }

    /// Attaches a result alias to the most recently declared field.
    pub fn alias(mut self, result_map: &'static str, alias: &'static str) -> Self {
        if let Some(last) = self.descriptor.fields.last_mut() {
            last.aliases.push(AliasSpec { result_map, alias });
        }
        self
    }

    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }
}

/// Field-level access contract implemented by persistent and result types.
///
/// This is the explicit registration surface replacing reflective field
/// access: the runtime reads and writes values only through `get`/`set`,
/// addressed by the declared field identifier.
pub trait Entity: Default {
    fn descriptor() -> &'static TypeDescriptor;

    /// Reads one field as a SQL value. Absent optional fields read as
    /// `Value::Null`; this accessor has no failure path by policy.
    fn get(&self, field: &str) -> Value;

    /// Writes one field from a SQL value, coercing leniently.
    fn set(&mut self, field: &str, value: Value) -> Result<(), ConversionError>;
}

/// Request for an unregistered type, mapper, operation or result map.
/// A caller programming error; never retried.
#[derive(Debug)]
pub enum LookupError {
    UnknownEntity { type_name: String },
    UnknownResultMap { type_name: String, result_map: String },
    UnknownMapper { mapper: String },
    UnknownOperation { mapper: String, operation: String },
}

impl Display for LookupError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownEntity { type_name } => {
                write!(f, "type `{type_name}` is not registered as an entity")
            }
            Self::UnknownResultMap {
                type_name,
                result_map,
            } => write!(
                f,
                "type `{type_name}` has no result map named `{result_map}`"
            ),
            Self::UnknownMapper { mapper } => {
                write!(f, "mapper `{mapper}` is not registered")
            }
            Self::UnknownOperation { mapper, operation } => {
                write!(f, "mapper `{mapper}` has no operation `{operation}`")
            }
        }
    }
}

impl Error for LookupError {}
