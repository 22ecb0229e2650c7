//! Mapper contracts and dispatch.
//!
//! # Responsibility
//! - Declare mapper contracts: named operations carrying a SQL template, an
//!   operation kind and an optional named result map.
//! - Compile each contract into a dispatch table at registration time
//!   (templates parse here, replacing dynamic proxy interception).
//! - Dispatch calls: build the named binding from arguments, render, bind
//!   placeholders, execute, coerce the result to the requested shape.
//!
//! # Invariants
//! - Undeclared parameter positions bind under `p0, p1, ..`.
//! - An operation declared without SQL dispatches as a warned no-op.
//! - Operation kind and call surface must agree (`select_*` for selects,
//!   `execute` for the rest).

use crate::db::{Db, DbError};
use crate::meta::{Entity, LookupError, Value};
use crate::record::{self, ConversionError};
use crate::template::{bind_placeholders, Bind, Binding, Template, TemplateError};
use log::{debug, warn};
use rusqlite::types::FromSql;
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

/// Operation kind of a SQL annotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlKind {
    Insert,
    Update,
    Delete,
    #[default]
    Select,
    Execute,
}

impl Display for SqlKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Select => "select",
            Self::Execute => "execute",
        };
        write!(f, "{name}")
    }
}

/// SQL annotation for one operation: template text, kind, result map name.
#[derive(Debug, Clone)]
pub struct SqlSpec {
    pub template: &'static str,
    pub kind: SqlKind,
    pub result_map: &'static str,
}

impl SqlSpec {
    pub fn new(template: &'static str) -> Self {
        Self {
            template,
            kind: SqlKind::default(),
            result_map: "",
        }
    }

    pub fn kind(mut self, kind: SqlKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn result_map(mut self, result_map: &'static str) -> Self {
        self.result_map = result_map;
        self
    }
}

/// One declared operation of a mapper contract.
#[derive(Debug, Clone)]
pub struct OperationSpec {
    pub name: &'static str,
    /// Explicit bind names by argument position; missing positions default
    /// to `p<index>`.
    pub params: Vec<&'static str>,
    pub sql: Option<SqlSpec>,
}

impl OperationSpec {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            params: Vec::new(),
            sql: None,
        }
    }

    pub fn param(mut self, name: &'static str) -> Self {
        self.params.push(name);
        self
    }

    pub fn sql(mut self, sql: SqlSpec) -> Self {
        self.sql = Some(sql);
        self
    }
}

/// A mapper contract: a named set of declared operations.
pub struct MapperContract {
    pub name: &'static str,
    pub operations: Vec<OperationSpec>,
}

impl MapperContract {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            operations: Vec::new(),
        }
    }

    pub fn operation(mut self, operation: OperationSpec) -> Self {
        self.operations.push(operation);
        self
    }
}

/// Mapper dispatch failure.
#[derive(Debug)]
pub enum MapperError {
    Template {
        mapper: String,
        operation: String,
        source: TemplateError,
    },
    DuplicateOperation { mapper: String, operation: String },
    KindMismatch {
        mapper: String,
        operation: String,
        kind: SqlKind,
        expected: &'static str,
    },
    Lookup(LookupError),
    Db(DbError),
    Conversion(ConversionError),
}

impl Display for MapperError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Template {
                mapper,
                operation,
                source,
            } => write!(f, "mapper `{mapper}.{operation}` template invalid: {source}"),
            Self::DuplicateOperation { mapper, operation } => {
                write!(f, "mapper `{mapper}` declares operation `{operation}` twice")
            }
            Self::KindMismatch {
                mapper,
                operation,
                kind,
                expected,
            } => write!(
                f,
                "mapper `{mapper}.{operation}` has kind `{kind}`, expected {expected}"
            ),
            Self::Lookup(err) => write!(f, "{err}"),
            Self::Db(err) => write!(f, "{err}"),
            Self::Conversion(err) => write!(f, "{err}"),
        }
    }
}

impl Error for MapperError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Template { source, .. } => Some(source),
            Self::Lookup(err) => Some(err),
            Self::Db(err) => Some(err),
            Self::Conversion(err) => Some(err),
            _ => None,
        }
    }
}

impl From<LookupError> for MapperError {
    fn from(value: LookupError) -> Self {
        Self::Lookup(value)
    }
}

impl From<DbError> for MapperError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<ConversionError> for MapperError {
    fn from(value: ConversionError) -> Self {
        Self::Conversion(value)
    }
}

pub(crate) struct CompiledSql {
    pub template: Template,
    pub kind: SqlKind,
    pub result_map: &'static str,
}

pub(crate) struct CompiledOperation {
    pub name: &'static str,
    pub params: Vec<&'static str>,
    pub sql: Option<CompiledSql>,
}

/// Dispatch table for one mapper contract.
pub(crate) struct MapperDef {
    pub name: &'static str,
    pub ops: HashMap<&'static str, CompiledOperation>,
}

/// Compiles a contract into its dispatch table, parsing every template.
pub(crate) fn compile(contract: MapperContract) -> Result<MapperDef, MapperError> {
    let mut ops = HashMap::new();
    for spec in contract.operations {
        let sql = match spec.sql {
            Some(sql_spec) => {
                let template =
                    Template::parse(sql_spec.template).map_err(|source| MapperError::Template {
                        mapper: contract.name.to_string(),
                        operation: spec.name.to_string(),
                        source,
                    })?;
                for placeholder in template.placeholders() {
                    let declared = spec.params.iter().any(|p| *p == placeholder)
                        || placeholder
                            .strip_prefix('p')
                            .is_some_and(|rest| rest.parse::<usize>().is_ok());
                    if !declared {
                        warn!(
                            "event=mapper_compile module=mapper status=warn mapper={} operation={} unbound_placeholder={placeholder}",
                            contract.name, spec.name
                        );
                    }
                }
                Some(CompiledSql {
                    template,
                    kind: sql_spec.kind,
                    result_map: sql_spec.result_map,
                })
            }
            None => None,
        };
        let operation = CompiledOperation {
            name: spec.name,
            params: spec.params,
            sql,
        };
        if ops.insert(operation.name, operation).is_some() {
            return Err(MapperError::DuplicateOperation {
                mapper: contract.name.to_string(),
                operation: spec.name.to_string(),
            });
        }
    }
    debug!(
        "event=mapper_compile module=mapper status=ok mapper={} operations={}",
        contract.name,
        ops.len()
    );
    Ok(MapperDef {
        name: contract.name,
        ops,
    })
}

/// Rendered call: final SQL, ordered parameters, compiled annotation.
struct Prepared<'a> {
    sql: String,
    params: Vec<Value>,
    compiled: &'a CompiledSql,
}

/// Call surface over one compiled mapper contract.
pub struct MapperHandle<'db> {
    db: &'db Db,
    def: &'db MapperDef,
}

impl<'db> MapperHandle<'db> {
    pub(crate) fn new(db: &'db Db, def: &'db MapperDef) -> Self {
        Self { db, def }
    }

    pub fn name(&self) -> &'static str {
        self.def.name
    }

    fn prepare(
        &self,
        operation: &str,
        args: Vec<Bind>,
    ) -> Result<Option<Prepared<'db>>, MapperError> {
        let op = self
            .def
            .ops
            .get(operation)
            .ok_or_else(|| LookupError::UnknownOperation {
                mapper: self.def.name.to_string(),
                operation: operation.to_string(),
            })?;

        let Some(compiled) = op.sql.as_ref() else {
            warn!(
                "event=mapper_dispatch module=mapper status=skip mapper={} operation={} reason=no_sql",
                self.def.name, op.name
            );
            return Ok(None);
        };

        let mut binding = Binding::new();
        for (index, arg) in args.into_iter().enumerate() {
            let name = op
                .params
                .get(index)
                .map(|p| (*p).to_string())
                .unwrap_or_else(|| format!("p{index}"));
            binding.insert(name, arg);
        }

        let raw = compiled.template.render(&binding);
        let (sql, params) = bind_placeholders(&raw, &binding);
        debug!(
            "event=mapper_dispatch module=mapper status=ok mapper={} operation={} kind={} result_map={:?} sql={sql:?} params={params:?}",
            self.def.name, op.name, compiled.kind, compiled.result_map
        );
        Ok(Some(Prepared {
            sql,
            params,
            compiled,
        }))
    }

    /// Dispatches an `insert`/`update`/`delete`/`execute` operation and
    /// returns the affected-row count. A no-SQL operation returns 0.
    pub fn execute(&self, operation: &str, args: Vec<Bind>) -> Result<usize, MapperError> {
        let Some(prepared) = self.prepare(operation, args)? else {
            return Ok(0);
        };
        if prepared.compiled.kind == SqlKind::Select {
            return Err(self.kind_mismatch(operation, prepared.compiled.kind, "a write kind"));
        }
        Ok(self.db.execute(&prepared.sql, &prepared.params)?)
    }

    /// Dispatches a `select` operation as a multi-row query, coercing each
    /// row into `E` through its declared result map.
    pub fn select_list<E: Entity>(
        &self,
        operation: &str,
        args: Vec<Bind>,
    ) -> Result<Vec<E>, MapperError> {
        let Some(prepared) = self.prepare(operation, args)? else {
            return Ok(Vec::new());
        };
        if prepared.compiled.kind != SqlKind::Select {
            return Err(self.kind_mismatch(operation, prepared.compiled.kind, "select"));
        }
        let map = self
            .db
            .result_maps
            .resolve(E::descriptor().type_name, prepared.compiled.result_map)?;
        let rows = self.db.query_rows(&prepared.sql, &prepared.params)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(record::coerce::<E>(row, map)?);
        }
        Ok(out)
    }

    /// Dispatches a `select` operation as a single-row query; `None` when no
    /// row matches.
    pub fn select_one<E: Entity>(
        &self,
        operation: &str,
        args: Vec<Bind>,
    ) -> Result<Option<E>, MapperError> {
        let Some(prepared) = self.prepare(operation, args)? else {
            return Ok(None);
        };
        if prepared.compiled.kind != SqlKind::Select {
            return Err(self.kind_mismatch(operation, prepared.compiled.kind, "select"));
        }
        let map = self
            .db
            .result_maps
            .resolve(E::descriptor().type_name, prepared.compiled.result_map)?;
        let rows = self.db.query_rows(&prepared.sql, &prepared.params)?;
        match rows.first() {
            Some(row) => Ok(Some(record::coerce::<E>(row, map)?)),
            None => Ok(None),
        }
    }

    /// Dispatches a `select` operation whose result is a single scalar value
    /// (a plain result type, not a registered result entity).
    pub fn select_scalar<T: FromSql>(
        &self,
        operation: &str,
        args: Vec<Bind>,
    ) -> Result<Option<T>, MapperError> {
        let Some(prepared) = self.prepare(operation, args)? else {
            return Ok(None);
        };
        if prepared.compiled.kind != SqlKind::Select {
            return Err(self.kind_mismatch(operation, prepared.compiled.kind, "select"));
        }
        Ok(self.db.query_scalar(&prepared.sql, &prepared.params)?)
    }

    fn kind_mismatch(&self, operation: &str, kind: SqlKind, expected: &'static str) -> MapperError {
        MapperError::KindMismatch {
            mapper: self.def.name.to_string(),
            operation: operation.to_string(),
            kind,
            expected,
        }
    }
}
