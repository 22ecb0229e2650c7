//! Lightweight object-relational mapping runtime.
//!
//! Binds plain data types to relational tables via declarative descriptors,
//! reconciles live database schema against them at startup (create-or-alter,
//! never drop), and dispatches declared mapper operations to parameterized
//! SQL rendered from templates. A generic soft-delete CRUD layer sits on top
//! of the same registries.
//!
//! The database driver is an external collaborator: callers supply a
//! connection factory and the runtime treats it as an opaque
//! execute/query capability.

pub mod crud;
pub mod db;
pub mod discovery;
pub mod id;
pub mod logging;
pub mod mapper;
pub mod meta;
pub mod naming;
pub mod record;
pub mod resultmap;
pub mod schema;
pub mod template;

pub use crud::{CrudError, Pager, Repository, UNBOUNDED_PAGE_SIZE};
pub use db::{
    file_factory, memory_factory, shared_memory_factory, ConnectionFactory, Db, DbConfig,
    DbError, InitError, SharedConnection,
};
pub use discovery::{DiscoveryError, TypeScope};
pub use logging::{default_log_level, init_logging, logging_status, LogSettings};
pub use mapper::{MapperContract, MapperError, MapperHandle, OperationSpec, SqlKind, SqlSpec};
pub use meta::{
    ColumnSpec, Entity, FieldType, LookupError, TableSpec, TypeDescriptor, Value,
    DEFAULT_TEXT_LENGTH,
};
pub use record::ConversionError;
pub use template::{bind_placeholders, Bind, Binding, Template, TemplateError};
