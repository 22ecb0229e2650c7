//! Runtime context: connections, execution surface and single-init guard.
//!
//! # Responsibility
//! - Build the runtime (`Db`) from a resolved type scope: registries, schema
//!   reconciliation, result maps, compiled mapper contracts.
//! - Provide the execute/query surface every component dispatches through.
//! - Keep the optional process-global handle with its single-init contract.
//!
//! # Invariants
//! - Registries and mapper tables are written once in `Db::open` and only
//!   read afterwards.
//! - Every SQL call is traced (sql, params) at debug level without altering
//!   control flow.
//! - Schema reconciliation failures abort construction; partial DDL may have
//!   been applied (at-least-once, non-transactional).

use crate::crud::Repository;
use crate::discovery::{DiscoveryError, TypeScope};
use crate::id::{IdMaker, MAX_NODE_ID};
use crate::mapper::{self, MapperDef, MapperError, MapperHandle};
use crate::meta::{Entity, LookupError, Value};
use crate::record::Record;
use crate::resultmap::ResultMapRegistry;
use crate::schema::{self, SchemaError, SchemaRegistry};
use log::{debug, info};
use once_cell::sync::OnceCell;
use rusqlite::types::FromSql;
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::time::Duration;

mod conn;

pub use conn::{ConnectionManager, SharedConnection};

/// Externally supplied connection factory, the crate's only driver seam.
pub type ConnectionFactory = Box<dyn Fn() -> rusqlite::Result<Connection> + Send + Sync>;

static RUNTIME: OnceCell<Db> = OnceCell::new();

/// Underlying execute/query failure. Propagated, never retried.
#[derive(Debug)]
pub enum DbError {
    Sqlite(rusqlite::Error),
    /// A runtime mutex was poisoned by a panicking holder.
    Poisoned(&'static str),
}

impl Display for DbError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite(err) => write!(f, "{err}"),
            Self::Poisoned(what) => write!(f, "{what} lock poisoned"),
        }
    }
}

impl Error for DbError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sqlite(err) => Some(err),
            Self::Poisoned(_) => None,
        }
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Sqlite(value)
    }
}

/// Startup failure, or misuse of the global single-init contract.
#[derive(Debug)]
pub enum InitError {
    AlreadyInitialized,
    NotInitialized,
    Config(String),
    Discovery(DiscoveryError),
    Schema(SchemaError),
    Mapper(MapperError),
}

impl Display for InitError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyInitialized => write!(f, "runtime has already been initialized"),
            Self::NotInitialized => {
                write!(f, "runtime not initialized, call `Db::init` first")
            }
            Self::Config(message) => write!(f, "invalid configuration: {message}"),
            Self::Discovery(err) => write!(f, "{err}"),
            Self::Schema(err) => write!(f, "{err}"),
            Self::Mapper(err) => write!(f, "{err}"),
        }
    }
}

impl Error for InitError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Discovery(err) => Some(err),
            Self::Schema(err) => Some(err),
            Self::Mapper(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DiscoveryError> for InitError {
    fn from(value: DiscoveryError) -> Self {
        Self::Discovery(value)
    }
}

impl From<SchemaError> for InitError {
    fn from(value: SchemaError) -> Self {
        Self::Schema(value)
    }
}

impl From<MapperError> for InitError {
    fn from(value: MapperError) -> Self {
        Self::Mapper(value)
    }
}

/// Runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    /// Snowflake worker identifier, 0..=31.
    pub worker_id: u8,
    /// Snowflake datacenter identifier, 0..=31.
    pub datacenter_id: u8,
    /// Busy timeout applied to every new connection.
    pub busy_timeout_ms: u64,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            worker_id: 1,
            datacenter_id: 1,
            busy_timeout_ms: 5_000,
        }
    }
}

impl DbConfig {
    fn validate(&self) -> Result<(), InitError> {
        if self.worker_id > MAX_NODE_ID {
            return Err(InitError::Config(format!(
                "worker_id {} exceeds {MAX_NODE_ID}",
                self.worker_id
            )));
        }
        if self.datacenter_id > MAX_NODE_ID {
            return Err(InitError::Config(format!(
                "datacenter_id {} exceeds {MAX_NODE_ID}",
                self.datacenter_id
            )));
        }
        Ok(())
    }
}

/// Factory for file-backed SQLite connections.
pub fn file_factory(path: impl AsRef<Path>) -> ConnectionFactory {
    let path = path.as_ref().to_path_buf();
    Box::new(move || Connection::open(&path))
}

/// Factory for private in-memory connections. Each connection sees its own
/// database, so this suits single-threaded use and tests.
pub fn memory_factory() -> ConnectionFactory {
    Box::new(Connection::open_in_memory)
}

/// Factory for a named shared-cache in-memory database: all connections made
/// through it see the same data while at least one stays open.
pub fn shared_memory_factory(name: &str) -> ConnectionFactory {
    let uri = format!("file:{name}?mode=memory&cache=shared");
    Box::new(move || Connection::open(&uri))
}

/// The mapping runtime. Constructed once from a resolved scope; all registry
/// state is read-only afterwards.
pub struct Db {
    pub(crate) config: DbConfig,
    pub(crate) conns: ConnectionManager,
    pub(crate) schema: SchemaRegistry,
    pub(crate) result_maps: ResultMapRegistry,
    pub(crate) mappers: HashMap<&'static str, MapperDef>,
    pub(crate) ids: IdMaker,
}

impl std::fmt::Debug for Db {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Db").finish_non_exhaustive()
    }
}

impl Db {
    /// Builds a runtime: resolves the scope, derives and reconciles every
    /// entity table, builds result maps and compiles mapper contracts
    /// (template parsing happens here, not on first call).
    pub fn open(
        scope: TypeScope,
        factory: ConnectionFactory,
        config: DbConfig,
    ) -> Result<Db, InitError> {
        config.validate()?;
        let resolved = scope.resolve()?;

        let mut schema_registry = SchemaRegistry::default();
        for descriptor in &resolved.entities {
            schema_registry.register(descriptor)?;
        }

        let mut result_maps = ResultMapRegistry::default();
        for descriptor in &resolved.results {
            result_maps.register(descriptor);
        }

        let mut mappers = HashMap::new();
        for contract in resolved.mappers {
            let def = mapper::compile(contract)?;
            mappers.insert(def.name, def);
        }

        let db = Db {
            conns: ConnectionManager::new(
                factory,
                Duration::from_millis(config.busy_timeout_ms),
            ),
            ids: IdMaker::new(config.worker_id, config.datacenter_id),
            config,
            schema: schema_registry,
            result_maps,
            mappers,
        };

        for table in db.schema.tables() {
            schema::reconcile(&db, table)?;
        }

        info!(
            "event=db_open module=db status=ok root={} tables={} mappers={}",
            resolved.root,
            db.schema.len(),
            db.mappers.len()
        );
        Ok(db)
    }

    /// Builds the process-global runtime. A second call fails with
    /// `InitError::AlreadyInitialized`; the guard is kept for parity with the
    /// single-init contract even though `open` makes contexts explicit.
    pub fn init(
        scope: TypeScope,
        factory: ConnectionFactory,
        config: DbConfig,
    ) -> Result<&'static Db, InitError> {
        if RUNTIME.get().is_some() {
            return Err(InitError::AlreadyInitialized);
        }
        let db = Db::open(scope, factory, config)?;
        match RUNTIME.set(db) {
            Ok(()) => RUNTIME.get().ok_or(InitError::NotInitialized),
            Err(_) => Err(InitError::AlreadyInitialized),
        }
    }

    /// Returns the process-global runtime installed by `init`.
    pub fn handle() -> Result<&'static Db, InitError> {
        RUNTIME.get().ok_or(InitError::NotInitialized)
    }

    /// Returns the next process-unique identifier.
    pub fn next_id(&self) -> i64 {
        self.ids.next_id()
    }

    /// Runs one statement, returning the affected-row count.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<usize, DbError> {
        debug!("event=sql_execute module=db sql={sql:?} params={params:?}");
        let handle = self.conns.acquire()?;
        let conn = handle.lock().map_err(|_| DbError::Poisoned("connection"))?;
        Ok(conn.execute(sql, params_from_iter(params.iter()))?)
    }

    /// Runs a query, returning every row as a `Record`.
    pub fn query_rows(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>, DbError> {
        debug!("event=sql_query module=db sql={sql:?} params={params:?}");
        let handle = self.conns.acquire()?;
        let conn = handle.lock().map_err(|_| DbError::Poisoned("connection"))?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.query(params_from_iter(params.iter()))?;

        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Record::with_capacity(columns.len());
            for (index, column) in columns.iter().enumerate() {
                record.push((column.clone(), row.get::<_, Value>(index)?));
            }
            records.push(record);
        }
        Ok(records)
    }

    /// Runs a single-row, single-column query for plain result types.
    pub fn query_scalar<T: FromSql>(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<T>, DbError> {
        debug!("event=sql_query module=db sql={sql:?} params={params:?}");
        let handle = self.conns.acquire()?;
        let conn = handle.lock().map_err(|_| DbError::Poisoned("connection"))?;
        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get::<_, T>(0)?)),
            None => Ok(None),
        }
    }

    /// Returns the dispatch handle for a registered mapper contract.
    pub fn mapper(&self, name: &str) -> Result<MapperHandle<'_>, LookupError> {
        self.mappers
            .get(name)
            .map(|def| MapperHandle::new(self, def))
            .ok_or_else(|| LookupError::UnknownMapper {
                mapper: name.to_string(),
            })
    }

    /// Returns the generic CRUD repository for a registered entity type.
    pub fn repository<E: Entity>(&self) -> Result<Repository<'_, E>, LookupError> {
        Repository::new(self)
    }

    /// Direct access to the calling thread's connection, for caller-managed
    /// transactional scopes.
    pub fn connection(&self) -> Result<SharedConnection, DbError> {
        self.conns.acquire()
    }

    /// Releases the calling thread's connection; the next use opens fresh.
    pub fn release_connection(&self) -> Result<(), DbError> {
        self.conns.release()
    }
}
