//! Mapper contract dispatch against a live database.

mod common;

use common::Student;
use rider_data::{
    memory_factory, Bind, Db, DbConfig, LookupError, MapperContract, MapperError, OperationSpec,
    SqlKind, SqlSpec,
};

fn student_mapper() -> MapperContract {
    MapperContract::new("StudentMapper")
        .operation(
            OperationSpec::new("insert")
                .param("id")
                .param("now")
                .param("name")
                .param("age")
                .param("source")
                .sql(
                    SqlSpec::new(
                        "insert into STUDENT (ID, CREATE_TIME, UPDATE_TIME, DELETED, NAME, AGE, SOURCE) \
                         values (#{id}, #{now}, #{now}, false, #{name}, #{age}, #{source})",
                    )
                    .kind(SqlKind::Insert),
                ),
        )
        .operation(OperationSpec::new("byName").param("name").sql(SqlSpec::new(
            "select * from STUDENT where DELETED = false{% if name %} and NAME = #{name}{% endif %}",
        )))
        .operation(
            OperationSpec::new("brief").param("name").sql(
                SqlSpec::new(
                    "select ID, NAME as STUDENT_NAME, AGE, SOURCE from STUDENT where NAME = #{name}",
                )
                .result_map("brief"),
            ),
        )
        .operation(OperationSpec::new("countAll").sql(SqlSpec::new(
            "select count(*) from STUDENT where DELETED = false",
        )))
        .operation(
            OperationSpec::new("rename")
                .param("oldName")
                .param("newName")
                .sql(
                    SqlSpec::new("update STUDENT set NAME = #{newName} where NAME = #{oldName}")
                        .kind(SqlKind::Update),
                ),
        )
        .operation(OperationSpec::new("strict").sql(SqlSpec::new(
            "select * from STUDENT where DELETED = false and NAME = #{name}",
        )))
        .operation(OperationSpec::new("pending"))
}

fn open_db() -> Db {
    Db::open(
        common::student_scope().register_mapper(student_mapper()),
        memory_factory(),
        DbConfig::default(),
    )
    .expect("open runtime")
}

fn insert_student(db: &Db, id: i64, name: &str, age: i64, source: f64) {
    let mapper = db.mapper("StudentMapper").unwrap();
    let affected = mapper
        .execute(
            "insert",
            vec![
                Bind::from(id),
                Bind::from(1_000i64),
                Bind::from(name),
                Bind::from(age),
                Bind::from(source),
            ],
        )
        .unwrap();
    assert_eq!(affected, 1);
}

#[test]
fn insert_and_select_roundtrip() {
    let db = open_db();
    insert_student(&db, 1, "test", 10, 100.0);

    let mapper = db.mapper("StudentMapper").unwrap();
    let count: i64 = mapper.select_scalar("countAll", vec![]).unwrap().unwrap();
    assert_eq!(count, 1);

    let found: Student = mapper
        .select_one("byName", vec![Bind::from("test")])
        .unwrap()
        .unwrap();
    assert_eq!(found.id, Some(1));
    assert_eq!(found.age, Some(10));
    assert_eq!(found.source, Some(100.0));
    // #{now} appears twice and binds both timestamp columns.
    assert_eq!(found.create_time, Some(1_000));
    assert_eq!(found.update_time, Some(1_000));
}

#[test]
fn named_result_map_reads_aliases_and_falls_back() {
    let db = open_db();
    insert_student(&db, 1, "test", 10, 100.0);

    let mapper = db.mapper("StudentMapper").unwrap();
    let brief: Student = mapper
        .select_one("brief", vec![Bind::from("test")])
        .unwrap()
        .unwrap();
    // NAME is aliased in the `brief` map; AGE and SOURCE resolve through the
    // default mapping it inherits.
    assert_eq!(brief.name, Some("test".to_string()));
    assert_eq!(brief.age, Some(10));
    assert_eq!(brief.source, Some(100.0));
    assert_eq!(brief.create_time, None);
}

#[test]
fn dynamic_template_drops_absent_condition() {
    let db = open_db();
    insert_student(&db, 1, "test", 10, 100.0);
    insert_student(&db, 2, "other", 20, 50.0);

    let mapper = db.mapper("StudentMapper").unwrap();
    let all: Vec<Student> = mapper.select_list("byName", vec![]).unwrap();
    assert_eq!(all.len(), 2);

    let one: Vec<Student> = mapper
        .select_list("byName", vec![Bind::from("test")])
        .unwrap();
    assert_eq!(one.len(), 1);
    assert_eq!(one[0].name, Some("test".to_string()));
}

#[test]
fn unbound_placeholder_binds_null() {
    let db = open_db();
    insert_student(&db, 1, "test", 10, 100.0);

    let mapper = db.mapper("StudentMapper").unwrap();
    // `#{name}` has no argument; it binds NULL and matches nothing.
    let rows: Vec<Student> = mapper.select_list("strict", vec![]).unwrap();
    assert!(rows.is_empty());
}

#[test]
fn write_operation_through_execute() {
    let db = open_db();
    insert_student(&db, 1, "test", 10, 100.0);

    let mapper = db.mapper("StudentMapper").unwrap();
    let affected = mapper
        .execute("rename", vec![Bind::from("test"), Bind::from("renamed")])
        .unwrap();
    assert_eq!(affected, 1);

    let renamed: Option<Student> = mapper
        .select_one("byName", vec![Bind::from("renamed")])
        .unwrap();
    assert!(renamed.is_some());
}

#[test]
fn no_sql_operation_is_a_noop() {
    let db = open_db();
    let mapper = db.mapper("StudentMapper").unwrap();

    assert_eq!(mapper.execute("pending", vec![]).unwrap(), 0);
    let rows: Vec<Student> = mapper.select_list("pending", vec![]).unwrap();
    assert!(rows.is_empty());
    let row: Option<Student> = mapper.select_one("pending", vec![]).unwrap();
    assert!(row.is_none());
}

#[test]
fn kind_and_call_surface_must_agree() {
    let db = open_db();
    let mapper = db.mapper("StudentMapper").unwrap();

    let err = mapper
        .execute("byName", vec![Bind::from("test")])
        .unwrap_err();
    assert!(matches!(err, MapperError::KindMismatch { .. }));

    let err = mapper
        .select_list::<Student>("rename", vec![Bind::from("a"), Bind::from("b")])
        .unwrap_err();
    assert!(matches!(err, MapperError::KindMismatch { .. }));
}

#[test]
fn unknown_mapper_and_operation_are_lookup_errors() {
    let db = open_db();
    assert!(matches!(
        db.mapper("NoSuchMapper"),
        Err(LookupError::UnknownMapper { .. })
    ));

    let mapper = db.mapper("StudentMapper").unwrap();
    let err = mapper.execute("noSuchOperation", vec![]).unwrap_err();
    assert!(matches!(
        err,
        MapperError::Lookup(LookupError::UnknownOperation { .. })
    ));
}
