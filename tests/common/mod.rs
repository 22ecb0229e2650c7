//! Shared test fixture: the `Student` entity from the CRUD scenario.
#![allow(dead_code)]

use once_cell::sync::Lazy;
use rider_data::record::{opt_bool, opt_f64, opt_i64, opt_text};
use rider_data::{
    memory_factory, ConversionError, Db, DbConfig, Entity, FieldType, TypeDescriptor, TypeScope,
    Value,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Student {
    pub id: Option<i64>,
    pub create_time: Option<i64>,
    pub update_time: Option<i64>,
    pub deleted: Option<bool>,
    pub name: Option<String>,
    pub age: Option<i64>,
    pub source: Option<f64>,
}

impl Student {
    pub fn named(name: &str) -> Self {
        Student {
            name: Some(name.to_string()),
            ..Default::default()
        }
    }
}

static STUDENT: Lazy<TypeDescriptor> = Lazy::new(|| {
    TypeDescriptor::builder("Student")
        .table()
        .result_entity()
        .base_columns()
        .column("name", FieldType::Text)
        .alias("brief", "STUDENT_NAME")
        .column("age", FieldType::Integer)
        .column("source", FieldType::Double)
        .build()
});

impl Entity for Student {
    fn descriptor() -> &'static TypeDescriptor {
        &STUDENT
    }

    fn get(&self, field: &str) -> Value {
        match field {
            "id" => self.id.map(Value::Integer).unwrap_or(Value::Null),
            "createTime" => self.create_time.map(Value::Integer).unwrap_or(Value::Null),
            "updateTime" => self.update_time.map(Value::Integer).unwrap_or(Value::Null),
            "deleted" => self
                .deleted
                .map(|b| Value::Integer(i64::from(b)))
                .unwrap_or(Value::Null),
            "name" => self.name.clone().map(Value::Text).unwrap_or(Value::Null),
            "age" => self.age.map(Value::Integer).unwrap_or(Value::Null),
            "source" => self.source.map(Value::Real).unwrap_or(Value::Null),
            _ => Value::Null,
        }
    }

    fn set(&mut self, field: &str, value: Value) -> Result<(), ConversionError> {
        match field {
            "id" => self.id = opt_i64(field, value)?,
            "createTime" => self.create_time = opt_i64(field, value)?,
            "updateTime" => self.update_time = opt_i64(field, value)?,
            "deleted" => self.deleted = opt_bool(field, value)?,
            "name" => self.name = opt_text(field, value)?,
            "age" => self.age = opt_i64(field, value)?,
            "source" => self.source = opt_f64(field, value)?,
            other => {
                return Err(ConversionError::UnknownField {
                    type_name: "Student",
                    field: other.to_string(),
                })
            }
        }
        Ok(())
    }
}

pub fn student_scope() -> TypeScope {
    TypeScope::new("app.data").register_type(Student::descriptor())
}

pub fn open_memory_db() -> Db {
    Db::open(student_scope(), memory_factory(), DbConfig::default()).expect("open runtime")
}
