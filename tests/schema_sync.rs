//! Startup schema reconciliation against a file-backed database.

use once_cell::sync::Lazy;
use rider_data::schema::SchemaError;
use rider_data::{
    file_factory, ColumnSpec, Db, DbConfig, FieldType, InitError, TypeDescriptor, TypeScope,
    Value,
};
use std::path::Path;

static CLASS_ROOM_V1: Lazy<TypeDescriptor> = Lazy::new(|| {
    TypeDescriptor::builder("ClassRoom")
        .table()
        .column("id", FieldType::BigInt)
        .column("title", FieldType::Text)
        .build()
});

static CLASS_ROOM_V2: Lazy<TypeDescriptor> = Lazy::new(|| {
    TypeDescriptor::builder("ClassRoom")
        .table()
        .column("id", FieldType::BigInt)
        .column("title", FieldType::Text)
        .column("seatCount", FieldType::Integer)
        .build()
});

// Same table, narrower TITLE type define.
static CLASS_ROOM_NARROW: Lazy<TypeDescriptor> = Lazy::new(|| {
    TypeDescriptor::builder("ClassRoom")
        .table()
        .column("id", FieldType::BigInt)
        .column_spec("title", ColumnSpec::new(FieldType::Text).length(64))
        .build()
});

fn open(path: &Path, descriptor: &'static TypeDescriptor) -> Db {
    Db::open(
        TypeScope::new("app.data").register_type(descriptor),
        file_factory(path),
        DbConfig::default(),
    )
    .expect("open runtime")
}

/// Live (name, declared type) pairs in column order.
fn column_schema(db: &Db, table: &str) -> Vec<(String, String)> {
    let rows = db
        .query_rows(&format!("PRAGMA table_info({table})"), &[])
        .unwrap();
    rows.iter()
        .map(|row| {
            let mut name = String::new();
            let mut declared = String::new();
            for (column, value) in row {
                if let Value::Text(text) = value {
                    match column.as_str() {
                        "name" => name = text.clone(),
                        "type" => declared = text.clone(),
                        _ => {}
                    }
                }
            }
            (name, declared)
        })
        .collect()
}

#[test]
fn reconcile_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");

    let first_schema;
    {
        let db = open(&path, &CLASS_ROOM_V1);
        first_schema = column_schema(&db, "CLASS_ROOM");
        db.execute(
            "insert into CLASS_ROOM (ID, TITLE) values (?, ?)",
            &[Value::Integer(1), Value::Text("alpha".to_string())],
        )
        .unwrap();
    }

    // Creating or altering an existing table/column fails on SQLite, so a
    // clean second open means the diff pass issued no DDL.
    let db = open(&path, &CLASS_ROOM_V1);
    assert_eq!(column_schema(&db, "CLASS_ROOM"), first_schema);
    let count: i64 = db
        .query_scalar("select count(*) from CLASS_ROOM", &[])
        .unwrap()
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn new_column_is_added_without_dropping_rows() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");

    {
        let db = open(&path, &CLASS_ROOM_V1);
        db.execute(
            "insert into CLASS_ROOM (ID, TITLE) values (?, ?)",
            &[Value::Integer(1), Value::Text("alpha".to_string())],
        )
        .unwrap();
    }

    let db = open(&path, &CLASS_ROOM_V2);
    let names: Vec<String> = column_schema(&db, "CLASS_ROOM")
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, vec!["ID", "TITLE", "SEAT_COUNT"]);

    let title: String = db
        .query_scalar("select TITLE from CLASS_ROOM where ID = 1", &[])
        .unwrap()
        .unwrap();
    assert_eq!(title, "alpha");
    let seats: Option<Option<i64>> = db
        .query_scalar("select SEAT_COUNT from CLASS_ROOM where ID = 1", &[])
        .unwrap();
    assert_eq!(seats, Some(None));
}

#[test]
fn changed_type_define_fails_startup_on_sqlite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("app.db");

    {
        let db = open(&path, &CLASS_ROOM_V1);
        db.execute(
            "insert into CLASS_ROOM (ID, TITLE) values (?, ?)",
            &[Value::Integer(1), Value::Text("alpha".to_string())],
        )
        .unwrap();
    }

    // A differing type define takes the alter-column path; SQLite has no
    // `alter column`, so construction aborts with the failing DDL.
    let err = Db::open(
        TypeScope::new("app.data").register_type(&CLASS_ROOM_NARROW),
        file_factory(&path),
        DbConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, InitError::Schema(SchemaError::Ddl { .. })));

    // The failed alter leaves table and rows untouched.
    let db = open(&path, &CLASS_ROOM_V1);
    let title: String = db
        .query_scalar("select TITLE from CLASS_ROOM where ID = 1", &[])
        .unwrap()
        .unwrap();
    assert_eq!(title, "alpha");
}
