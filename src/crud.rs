//! Generic CRUD over registered entity types.
//!
//! # Responsibility
//! - Provide create/put/update/delete/get/list/paginate operations generic
//!   over any entity registered with the schema registry.
//! - Keep the soft-delete contract: `delete` flips the tombstone flag and
//!   every generated filter carries `DELETED = false`.
//!
//! # Invariants
//! - `ID` is never part of a SET clause and is the sole key for point
//!   lookups.
//! - `create` populates ID, both timestamps and the tombstone flag before
//!   inserting.
//! - `update` skips null fields; `put` overwrites every non-ID column.

use crate::db::{Db, DbError};
use crate::meta::{Entity, LookupError, Value};
use crate::record::{self, ConversionError};
use crate::resultmap::DEFAULT_RESULT_MAP;
use crate::schema::TableDefinition;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::marker::PhantomData;
use std::time::{SystemTime, UNIX_EPOCH};

const ID_COLUMN: &str = "ID";
const CREATE_TIME_COLUMN: &str = "CREATE_TIME";
const UPDATE_TIME_COLUMN: &str = "UPDATE_TIME";
const DELETED_COLUMN: &str = "DELETED";

/// Sentinel page size disabling pagination entirely.
pub const UNBOUNDED_PAGE_SIZE: u64 = u64::MAX;

/// CRUD failure.
#[derive(Debug)]
pub enum CrudError {
    Db(DbError),
    Lookup(LookupError),
    Conversion(ConversionError),
    /// The entity does not declare one of the base columns the operation
    /// needs (`ID`, `CREATE_TIME`, `UPDATE_TIME`, `DELETED`).
    MissingColumn { table: String, column: &'static str },
}

impl Display for CrudError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Lookup(err) => write!(f, "{err}"),
            Self::Conversion(err) => write!(f, "{err}"),
            Self::MissingColumn { table, column } => {
                write!(f, "table `{table}` declares no `{column}` column")
            }
        }
    }
}

impl Error for CrudError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Lookup(err) => Some(err),
            Self::Conversion(err) => Some(err),
            Self::MissingColumn { .. } => None,
        }
    }
}

impl From<DbError> for CrudError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<LookupError> for CrudError {
    fn from(value: LookupError) -> Self {
        Self::Lookup(value)
    }
}

impl From<ConversionError> for CrudError {
    fn from(value: ConversionError) -> Self {
        Self::Conversion(value)
    }
}

/// Pagination request/response pair. Page index is 1-based.
#[derive(Debug, Clone, Serialize)]
pub struct Pager<E> {
    pub page_at: u64,
    pub page_size: u64,
    pub total_page: u64,
    pub total_count: u64,
    pub data: Vec<E>,
}

impl<E> Pager<E> {
    /// Builds a request with defaults `page_at = 1`, `page_size = 10`.
    pub fn of(page_at: Option<u64>, page_size: Option<u64>) -> Self {
        Self {
            page_at: page_at.unwrap_or(1).max(1),
            page_size: page_size.unwrap_or(10).max(1),
            total_page: 0,
            total_count: 0,
            data: Vec::new(),
        }
    }
}

/// Generic CRUD surface over one registered entity type.
pub struct Repository<'db, E: Entity> {
    db: &'db Db,
    table: &'db TableDefinition,
    _entity: PhantomData<E>,
}

impl<'db, E: Entity> Repository<'db, E> {
    pub(crate) fn new(db: &'db Db) -> Result<Self, LookupError> {
        let table = db.schema.table_info(E::descriptor().type_name)?;
        Ok(Self {
            db,
            table,
            _entity: PhantomData,
        })
    }

    /// Inserts a new row: assigns a fresh ID, stamps create/update times,
    /// clears the tombstone flag, writes all columns in declaration order and
    /// returns the populated object.
    pub fn create(&self, mut data: E) -> Result<E, CrudError> {
        let now = now_millis();
        self.set_column(&mut data, ID_COLUMN, Value::Integer(self.db.next_id()))?;
        self.set_column(&mut data, CREATE_TIME_COLUMN, Value::Integer(now))?;
        self.set_column(&mut data, UPDATE_TIME_COLUMN, Value::Integer(now))?;
        self.set_column(&mut data, DELETED_COLUMN, Value::Integer(0))?;

        let columns: Vec<&str> = self.table.columns.iter().map(|c| c.column.as_str()).collect();
        let markers = vec!["?"; columns.len()];
        let sql = format!(
            "insert into {} ({}) values ({})",
            self.table.table_name,
            columns.join(", "),
            markers.join(", ")
        );
        let params: Vec<Value> = self
            .table
            .columns
            .iter()
            .map(|c| data.get(c.field))
            .collect();
        self.db.execute(&sql, &params)?;
        Ok(data)
    }

    /// Updates every non-ID column unconditionally (nulls overwrite),
    /// refreshing the update timestamp. Keyed by ID.
    pub fn put(&self, mut data: E) -> Result<usize, CrudError> {
        self.set_column(&mut data, UPDATE_TIME_COLUMN, Value::Integer(now_millis()))?;

        let mut sets = Vec::new();
        let mut params = Vec::new();
        for column in &self.table.columns {
            if column.column.eq_ignore_ascii_case(ID_COLUMN) {
                continue;
            }
            sets.push(format!("{} = ?", column.column));
            params.push(data.get(column.field));
        }
        params.push(self.id_of(&data));

        let sql = format!(
            "update {} set {} where ID = ?",
            self.table.table_name,
            sets.join(", ")
        );
        Ok(self.db.execute(&sql, &params)?)
    }

    /// Updates only columns whose value is non-null, refreshing the update
    /// timestamp (so the row is touched even for an otherwise empty update).
    /// Keyed by ID.
    pub fn update(&self, mut data: E) -> Result<usize, CrudError> {
        self.set_column(&mut data, UPDATE_TIME_COLUMN, Value::Integer(now_millis()))?;

        let mut sets = Vec::new();
        let mut params = Vec::new();
        for column in &self.table.columns {
            if column.column.eq_ignore_ascii_case(ID_COLUMN) {
                continue;
            }
            let value = data.get(column.field);
            if value == Value::Null {
                continue;
            }
            sets.push(format!("{} = ?", column.column));
            params.push(value);
        }
        params.push(self.id_of(&data));

        let sql = format!(
            "update {} set {} where ID = ?",
            self.table.table_name,
            sets.join(", ")
        );
        Ok(self.db.execute(&sql, &params)?)
    }

    /// Soft delete: a minimal instance carrying the ID and a set tombstone
    /// flag, dispatched through `update`. The row physically remains.
    pub fn delete(&self, id: i64) -> Result<usize, CrudError> {
        let mut data = E::default();
        self.set_column(&mut data, ID_COLUMN, Value::Integer(id))?;
        self.set_column(&mut data, DELETED_COLUMN, Value::Integer(1))?;
        self.update(data)
    }

    /// Point lookup by ID. Soft-deleted rows are still visible here; the ID
    /// is the sole equality key.
    pub fn get(&self, id: i64) -> Result<Option<E>, CrudError> {
        let sql = format!("select * from {} where ID = ?", self.table.table_name);
        let map = self
            .db
            .result_maps
            .resolve(E::descriptor().type_name, DEFAULT_RESULT_MAP)?;
        let rows = self.db.query_rows(&sql, &[Value::Integer(id)])?;
        match rows.first() {
            Some(row) => Ok(Some(record::coerce::<E>(row, map)?)),
            None => Ok(None),
        }
    }

    /// First result of `list(example)`, or `None`.
    pub fn get_one(&self, example: E) -> Result<Option<E>, CrudError> {
        Ok(self.list(example)?.into_iter().next())
    }

    /// Equality filter over every non-null field of `example`, ANDed, always
    /// excluding soft-deleted rows. Unbounded.
    pub fn list(&self, example: E) -> Result<Vec<E>, CrudError> {
        self.list_page(example, 1, UNBOUNDED_PAGE_SIZE)
    }

    /// As `list`, with `limit offset, count` pagination; the 1-based page
    /// index and the unbounded sentinel follow the Pager contract.
    pub fn list_page(&self, example: E, page_at: u64, page_size: u64) -> Result<Vec<E>, CrudError> {
        let (mut sql, params) = self.filter_query(&example);
        if page_size != UNBOUNDED_PAGE_SIZE {
            let offset = page_at.max(1).saturating_sub(1).saturating_mul(page_size);
            sql.push_str(&format!(" limit {offset}, {page_size}"));
        }
        self.fetch(&sql, &params)
    }

    /// As `list_page`, additionally counting the filtered rows to fill the
    /// pager's totals before fetching the requested slice.
    pub fn list_pager(&self, example: E, pager: &mut Pager<E>) -> Result<(), CrudError> {
        // Fields are public; re-clamp hand-built pagers before dividing.
        pager.page_at = pager.page_at.max(1);
        pager.page_size = pager.page_size.max(1);
        let (sql, params) = self.filter_query(&example);

        let total: i64 = self
            .db
            .query_scalar(&format!("select count(*) from ({sql}) t"), &params)?
            .unwrap_or(0);
        pager.total_count = total.max(0) as u64;
        pager.total_page = pager.total_count.div_ceil(pager.page_size);

        let mut paged = sql;
        if pager.page_size != UNBOUNDED_PAGE_SIZE {
            let offset = pager.page_at.saturating_sub(1).saturating_mul(pager.page_size);
            paged.push_str(&format!(" limit {offset}, {}", pager.page_size));
        }
        pager.data = self.fetch(&paged, &params)?;
        Ok(())
    }

    fn fetch(&self, sql: &str, params: &[Value]) -> Result<Vec<E>, CrudError> {
        let map = self
            .db
            .result_maps
            .resolve(E::descriptor().type_name, DEFAULT_RESULT_MAP)?;
        let rows = self.db.query_rows(sql, params)?;
        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(record::coerce::<E>(row, map)?);
        }
        Ok(out)
    }

    /// Builds the example query: equality over non-null example fields in
    /// declaration order, always led by the tombstone predicate.
    fn filter_query(&self, example: &E) -> (String, Vec<Value>) {
        let mut conditions = vec![format!("{DELETED_COLUMN} = false")];
        let mut params = Vec::new();
        for column in &self.table.columns {
            let value = example.get(column.field);
            if value == Value::Null {
                continue;
            }
            conditions.push(format!("{} = ?", column.column));
            params.push(value);
        }
        let sql = format!(
            "select * from {} where {}",
            self.table.table_name,
            conditions.join(" and ")
        );
        (sql, params)
    }

    fn set_column(&self, data: &mut E, column: &'static str, value: Value) -> Result<(), CrudError> {
        let mapping =
            self.table
                .column(column)
                .ok_or_else(|| CrudError::MissingColumn {
                    table: self.table.table_name.clone(),
                    column,
                })?;
        data.set(mapping.field, value)?;
        Ok(())
    }

    fn id_of(&self, data: &E) -> Value {
        self.table
            .column(ID_COLUMN)
            .map(|mapping| data.get(mapping.field))
            .unwrap_or(Value::Null)
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
