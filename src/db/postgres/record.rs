//! Row mapping.
//!
//! Two ways out of a `tokio_postgres::Row`:
//!
//! - [`Record`] - ordered, field-named scalar values for ad-hoc queries
//! - [`FromRow`] - explicit typed mapping for the analytics models
//!
//! Both reject columns they cannot represent with `Error::Query` instead of
//! coercing them.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use postgres_types::FromSql;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use tokio_postgres::Row;

use crate::error::{Error, Result};

/// One scalar column value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Integers widen to floats; nothing else converts.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

/// A result row as named fields, in column order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.fields.push((name.into(), value));
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn from_row(row: &Row) -> Result<Self> {
        let mut record = Record::new();
        for (idx, column) in row.columns().iter().enumerate() {
            let name = column.name();
            let value = match column.type_().name() {
                "bool" => get_opt::<bool>(row, idx, name)?.map(Value::Bool),
                "int2" => get_opt::<i16>(row, idx, name)?.map(|v| Value::Int(v.into())),
                "int4" => get_opt::<i32>(row, idx, name)?.map(|v| Value::Int(v.into())),
                "int8" => get_opt::<i64>(row, idx, name)?.map(Value::Int),
                "float4" => get_opt::<f32>(row, idx, name)?.map(|v| Value::Float(v.into())),
                "float8" => get_opt::<f64>(row, idx, name)?.map(Value::Float),
                "text" | "varchar" | "bpchar" | "name" => {
                    get_opt::<String>(row, idx, name)?.map(Value::Text)
                },
                "timestamptz" => get_opt::<DateTime<Utc>>(row, idx, name)?.map(Value::Timestamp),
                "timestamp" => get_opt::<NaiveDateTime>(row, idx, name)?
                    .map(|v| Value::Timestamp(v.and_utc())),
                "date" => get_opt::<NaiveDate>(row, idx, name)?.map(Value::Date),
                other => {
                    return Err(Error::Query(format!(
                        "column {} has unsupported type {}; cast it in SQL (e.g. ::float8, ::bigint, ::text)",
                        name, other
                    )))
                },
            };
            record.push(name, value.unwrap_or(Value::Null));
        }
        Ok(record)
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

fn get_opt<'a, T: FromSql<'a>>(row: &'a Row, idx: usize, name: &str) -> Result<Option<T>> {
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| Error::Query(format!("column {}: {}", name, e)))
}

/// Explicit schema mapping from a result row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self>;
}

impl FromRow for Record {
    fn from_row(row: &Row) -> Result<Self> {
        Record::from_row(row)
    }
}

/// Read a named column as `T`, reporting the column on mismatch.
pub fn column<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<T> {
    row.try_get::<_, T>(name)
        .map_err(|e| Error::Query(format!("column {}: {}", name, e)))
}
