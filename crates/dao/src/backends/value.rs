//! Database values
//!
//! `DatabaseValue` is the driver-neutral representation of both statement
//! parameters and decoded column values. Typed extraction goes through
//! `FromDatabaseValue`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::error::{ModelError, ModelResult};
use crate::model::FieldKind;

/// Database value enumeration for type-safe parameter binding
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseValue {
    Null,
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    String(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    Json(JsonValue),
    Array(Vec<DatabaseValue>),
}

impl DatabaseValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DatabaseValue::Null)
    }

    /// Short name of the variant, used in conversion errors
    pub fn type_name(&self) -> &'static str {
        match self {
            DatabaseValue::Null => "null",
            DatabaseValue::Bool(_) => "bool",
            DatabaseValue::Int32(_) => "int32",
            DatabaseValue::Int64(_) => "int64",
            DatabaseValue::Float32(_) => "float32",
            DatabaseValue::Float64(_) => "float64",
            DatabaseValue::String(_) => "string",
            DatabaseValue::Bytes(_) => "bytes",
            DatabaseValue::Uuid(_) => "uuid",
            DatabaseValue::DateTime(_) => "datetime",
            DatabaseValue::Date(_) => "date",
            DatabaseValue::Time(_) => "time",
            DatabaseValue::Json(_) => "json",
            DatabaseValue::Array(_) => "array",
        }
    }

    pub fn to_json(&self) -> JsonValue {
        match self {
            DatabaseValue::Null => JsonValue::Null,
            DatabaseValue::Bool(b) => JsonValue::Bool(*b),
            DatabaseValue::Int32(i) => JsonValue::from(*i),
            DatabaseValue::Int64(i) => JsonValue::from(*i),
            DatabaseValue::Float32(f) => serde_json::Number::from_f64(*f as f64)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::Float64(f) => serde_json::Number::from_f64(*f)
                .map(JsonValue::Number)
                .unwrap_or(JsonValue::Null),
            DatabaseValue::String(s) => JsonValue::String(s.clone()),
            DatabaseValue::Bytes(b) => JsonValue::Array(b.iter().map(|&x| JsonValue::from(x)).collect()),
            DatabaseValue::Uuid(u) => JsonValue::String(u.to_string()),
            DatabaseValue::DateTime(dt) => JsonValue::String(dt.to_rfc3339()),
            DatabaseValue::Date(d) => JsonValue::String(d.to_string()),
            DatabaseValue::Time(t) => JsonValue::String(t.to_string()),
            DatabaseValue::Json(j) => j.clone(),
            DatabaseValue::Array(values) => JsonValue::Array(values.iter().map(|v| v.to_json()).collect()),
        }
    }

    pub fn from_json(json: JsonValue) -> Self {
        match json {
            JsonValue::Null => DatabaseValue::Null,
            JsonValue::Bool(b) => DatabaseValue::Bool(b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    DatabaseValue::Int64(i)
                } else if let Some(f) = n.as_f64() {
                    DatabaseValue::Float64(f)
                } else {
                    DatabaseValue::Null
                }
            }
            JsonValue::String(s) => DatabaseValue::String(s),
            JsonValue::Array(values) => {
                DatabaseValue::Array(values.into_iter().map(DatabaseValue::from_json).collect())
            }
            object @ JsonValue::Object(_) => DatabaseValue::Json(object),
        }
    }

    /// Normalize a decoded column value to the declared kind of its field.
    ///
    /// Drivers report storage classes rather than declared types (SQLite keeps
    /// booleans as integers and timestamps as text), so values are reshaped
    /// here before they reach an entity. Values that cannot be reshaped are
    /// returned unchanged and fail later in `FromDatabaseValue`.
    pub fn coerce(self, kind: FieldKind) -> Self {
        match (self, kind) {
            (DatabaseValue::Int32(i), FieldKind::Boolean) => DatabaseValue::Bool(i != 0),
            (DatabaseValue::Int64(i), FieldKind::Boolean) => DatabaseValue::Bool(i != 0),
            (DatabaseValue::Int64(i), FieldKind::Integer) => match i32::try_from(i) {
                Ok(narrow) => DatabaseValue::Int32(narrow),
                Err(_) => DatabaseValue::Int64(i),
            },
            (DatabaseValue::Int32(i), FieldKind::BigInt) => DatabaseValue::Int64(i as i64),
            (DatabaseValue::Float64(f), FieldKind::Float) => DatabaseValue::Float32(f as f32),
            (DatabaseValue::Float32(f), FieldKind::Double) => DatabaseValue::Float64(f as f64),
            (DatabaseValue::Int32(i), FieldKind::Double) => DatabaseValue::Float64(i as f64),
            (DatabaseValue::Int64(i), FieldKind::Double) => DatabaseValue::Float64(i as f64),
            (DatabaseValue::String(s), FieldKind::Timestamp) => match parse_timestamp(&s) {
                Some(dt) => DatabaseValue::DateTime(dt),
                None => DatabaseValue::String(s),
            },
            (DatabaseValue::String(s), FieldKind::Date) => match NaiveDate::parse_from_str(&s, "%Y-%m-%d") {
                Ok(d) => DatabaseValue::Date(d),
                Err(_) => DatabaseValue::String(s),
            },
            (DatabaseValue::String(s), FieldKind::Time) => match NaiveTime::parse_from_str(&s, "%H:%M:%S%.f") {
                Ok(t) => DatabaseValue::Time(t),
                Err(_) => DatabaseValue::String(s),
            },
            (DatabaseValue::String(s), FieldKind::Uuid) => match Uuid::parse_str(&s) {
                Ok(u) => DatabaseValue::Uuid(u),
                Err(_) => DatabaseValue::String(s),
            },
            (DatabaseValue::Bytes(b), FieldKind::Uuid) => match Uuid::from_slice(&b) {
                Ok(u) => DatabaseValue::Uuid(u),
                Err(_) => DatabaseValue::Bytes(b),
            },
            (DatabaseValue::String(s), FieldKind::Json) => match serde_json::from_str(&s) {
                Ok(j) => DatabaseValue::Json(j),
                Err(_) => DatabaseValue::String(s),
            },
            (value, _) => value,
        }
    }

    /// Typed extraction
    pub fn into_typed<T: FromDatabaseValue>(self) -> ModelResult<T> {
        T::from_database_value(self)
    }
}

fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

impl From<bool> for DatabaseValue {
    fn from(value: bool) -> Self {
        DatabaseValue::Bool(value)
    }
}

impl From<i32> for DatabaseValue {
    fn from(value: i32) -> Self {
        DatabaseValue::Int32(value)
    }
}

impl From<i64> for DatabaseValue {
    fn from(value: i64) -> Self {
        DatabaseValue::Int64(value)
    }
}

impl From<f32> for DatabaseValue {
    fn from(value: f32) -> Self {
        DatabaseValue::Float32(value)
    }
}

impl From<f64> for DatabaseValue {
    fn from(value: f64) -> Self {
        DatabaseValue::Float64(value)
    }
}

impl From<String> for DatabaseValue {
    fn from(value: String) -> Self {
        DatabaseValue::String(value)
    }
}

impl From<&str> for DatabaseValue {
    fn from(value: &str) -> Self {
        DatabaseValue::String(value.to_string())
    }
}

impl From<Vec<u8>> for DatabaseValue {
    fn from(value: Vec<u8>) -> Self {
        DatabaseValue::Bytes(value)
    }
}

impl From<Uuid> for DatabaseValue {
    fn from(value: Uuid) -> Self {
        DatabaseValue::Uuid(value)
    }
}

impl From<DateTime<Utc>> for DatabaseValue {
    fn from(value: DateTime<Utc>) -> Self {
        DatabaseValue::DateTime(value)
    }
}

impl From<NaiveDate> for DatabaseValue {
    fn from(value: NaiveDate) -> Self {
        DatabaseValue::Date(value)
    }
}

impl From<NaiveTime> for DatabaseValue {
    fn from(value: NaiveTime) -> Self {
        DatabaseValue::Time(value)
    }
}

impl From<JsonValue> for DatabaseValue {
    fn from(value: JsonValue) -> Self {
        DatabaseValue::Json(value)
    }
}

impl<T> From<Option<T>> for DatabaseValue
where
    T: Into<DatabaseValue>,
{
    fn from(value: Option<T>) -> Self {
        match value {
            Some(v) => v.into(),
            None => DatabaseValue::Null,
        }
    }
}

macro_rules! array_from_vec {
    ($($element:ty),*) => {
        $(
            impl From<Vec<$element>> for DatabaseValue {
                fn from(values: Vec<$element>) -> Self {
                    DatabaseValue::Array(values.into_iter().map(Into::into).collect())
                }
            }
        )*
    };
}

array_from_vec!(i32, i64, String, &str, Uuid, DatabaseValue);

/// Typed extraction from a `DatabaseValue`
pub trait FromDatabaseValue: Sized {
    fn from_database_value(value: DatabaseValue) -> ModelResult<Self>;
}

fn mismatch<T>(value: &DatabaseValue) -> ModelError {
    ModelError::Serialization(format!(
        "cannot convert {} value into {}",
        value.type_name(),
        std::any::type_name::<T>()
    ))
}

impl FromDatabaseValue for DatabaseValue {
    fn from_database_value(value: DatabaseValue) -> ModelResult<Self> {
        Ok(value)
    }
}

impl FromDatabaseValue for bool {
    fn from_database_value(value: DatabaseValue) -> ModelResult<Self> {
        match value {
            DatabaseValue::Bool(b) => Ok(b),
            DatabaseValue::Int32(i) => Ok(i != 0),
            DatabaseValue::Int64(i) => Ok(i != 0),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromDatabaseValue for i32 {
    fn from_database_value(value: DatabaseValue) -> ModelResult<Self> {
        match value {
            DatabaseValue::Int32(i) => Ok(i),
            DatabaseValue::Int64(i) => i32::try_from(i)
                .map_err(|_| ModelError::Serialization(format!("{} does not fit in i32", i))),
            DatabaseValue::Bool(b) => Ok(b as i32),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromDatabaseValue for i64 {
    fn from_database_value(value: DatabaseValue) -> ModelResult<Self> {
        match value {
            DatabaseValue::Int32(i) => Ok(i as i64),
            DatabaseValue::Int64(i) => Ok(i),
            DatabaseValue::Bool(b) => Ok(b as i64),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromDatabaseValue for u64 {
    fn from_database_value(value: DatabaseValue) -> ModelResult<Self> {
        let signed = i64::from_database_value(value)?;
        u64::try_from(signed).map_err(|_| ModelError::Serialization(format!("{} is negative", signed)))
    }
}

impl FromDatabaseValue for f32 {
    fn from_database_value(value: DatabaseValue) -> ModelResult<Self> {
        match value {
            DatabaseValue::Float32(f) => Ok(f),
            DatabaseValue::Float64(f) => Ok(f as f32),
            DatabaseValue::Int32(i) => Ok(i as f32),
            DatabaseValue::Int64(i) => Ok(i as f32),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromDatabaseValue for f64 {
    fn from_database_value(value: DatabaseValue) -> ModelResult<Self> {
        match value {
            DatabaseValue::Float32(f) => Ok(f as f64),
            DatabaseValue::Float64(f) => Ok(f),
            DatabaseValue::Int32(i) => Ok(i as f64),
            DatabaseValue::Int64(i) => Ok(i as f64),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromDatabaseValue for String {
    fn from_database_value(value: DatabaseValue) -> ModelResult<Self> {
        match value {
            DatabaseValue::String(s) => Ok(s),
            DatabaseValue::Uuid(u) => Ok(u.to_string()),
            DatabaseValue::Bytes(b) => String::from_utf8(b)
                .map_err(|e| ModelError::Serialization(e.to_string())),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromDatabaseValue for Vec<u8> {
    fn from_database_value(value: DatabaseValue) -> ModelResult<Self> {
        match value {
            DatabaseValue::Bytes(b) => Ok(b),
            DatabaseValue::String(s) => Ok(s.into_bytes()),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromDatabaseValue for Uuid {
    fn from_database_value(value: DatabaseValue) -> ModelResult<Self> {
        match value.coerce(FieldKind::Uuid) {
            DatabaseValue::Uuid(u) => Ok(u),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromDatabaseValue for DateTime<Utc> {
    fn from_database_value(value: DatabaseValue) -> ModelResult<Self> {
        match value.coerce(FieldKind::Timestamp) {
            DatabaseValue::DateTime(dt) => Ok(dt),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromDatabaseValue for NaiveDate {
    fn from_database_value(value: DatabaseValue) -> ModelResult<Self> {
        match value.coerce(FieldKind::Date) {
            DatabaseValue::Date(d) => Ok(d),
            DatabaseValue::DateTime(dt) => Ok(dt.date_naive()),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromDatabaseValue for NaiveTime {
    fn from_database_value(value: DatabaseValue) -> ModelResult<Self> {
        match value.coerce(FieldKind::Time) {
            DatabaseValue::Time(t) => Ok(t),
            other => Err(mismatch::<Self>(&other)),
        }
    }
}

impl FromDatabaseValue for JsonValue {
    fn from_database_value(value: DatabaseValue) -> ModelResult<Self> {
        match value.coerce(FieldKind::Json) {
            DatabaseValue::Json(j) => Ok(j),
            other => Ok(other.to_json()),
        }
    }
}

impl<T: FromDatabaseValue> FromDatabaseValue for Option<T> {
    fn from_database_value(value: DatabaseValue) -> ModelResult<Self> {
        match value {
            DatabaseValue::Null => Ok(None),
            other => T::from_database_value(other).map(Some),
        }
    }
}
