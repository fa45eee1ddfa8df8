//! Result rows
//!
//! Backends decode every driver row into a detached `DataRow` before the
//! connection lock is released, so rows outlive the unit of work that
//! produced them.

use std::collections::HashMap;

use serde_json::Value as JsonValue;

use super::value::{DatabaseValue, FromDatabaseValue};
use crate::error::{ModelError, ModelResult};

/// Abstract database row trait
pub trait DatabaseRow: Send + Sync {
    /// Get a column value by index
    fn get_by_index(&self, index: usize) -> ModelResult<DatabaseValue>;

    /// Get a column value by name
    fn get_by_name(&self, name: &str) -> ModelResult<DatabaseValue>;

    fn column_count(&self) -> usize;

    fn column_names(&self) -> Vec<String>;

    /// Convert row to a JSON object keyed by column name
    fn to_json(&self) -> ModelResult<JsonValue>;

    fn to_map(&self) -> ModelResult<HashMap<String, DatabaseValue>>;
}

/// Extension trait for typed column access
pub trait DatabaseRowExt {
    fn get<T: FromDatabaseValue>(&self, column: &str) -> ModelResult<T>;

    /// Like `get`, but a missing column yields `None` instead of an error
    fn try_get<T: FromDatabaseValue>(&self, column: &str) -> ModelResult<Option<T>>;
}

impl<R: DatabaseRow + ?Sized> DatabaseRowExt for R {
    fn get<T: FromDatabaseValue>(&self, column: &str) -> ModelResult<T> {
        self.get_by_name(column)?
            .into_typed()
            .map_err(|e| ModelError::Serialization(format!("column '{}': {}", column, e)))
    }

    fn try_get<T: FromDatabaseValue>(&self, column: &str) -> ModelResult<Option<T>> {
        match self.get_by_name(column) {
            Ok(DatabaseValue::Null) => Ok(None),
            Ok(value) => value.into_typed().map(Some),
            Err(ModelError::InvalidField { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// A decoded row, detached from its connection
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataRow {
    columns: Vec<String>,
    values: Vec<DatabaseValue>,
}

impl DataRow {
    pub fn new(columns: Vec<String>, values: Vec<DatabaseValue>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[DatabaseValue] {
        &self.values
    }

    /// Take the first column, used for scalar projections
    pub fn into_first(self) -> Option<DatabaseValue> {
        self.values.into_iter().next()
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column == name)
            .or_else(|| self.columns.iter().position(|column| column.eq_ignore_ascii_case(name)))
    }
}

impl DatabaseRow for DataRow {
    fn get_by_index(&self, index: usize) -> ModelResult<DatabaseValue> {
        self.values
            .get(index)
            .cloned()
            .ok_or_else(|| ModelError::invalid_field("row", &index.to_string()))
    }

    fn get_by_name(&self, name: &str) -> ModelResult<DatabaseValue> {
        self.position(name)
            .map(|index| self.values[index].clone())
            .ok_or_else(|| ModelError::invalid_field("row", name))
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn to_json(&self) -> ModelResult<JsonValue> {
        let object = self
            .columns
            .iter()
            .zip(&self.values)
            .map(|(column, value)| (column.clone(), value.to_json()))
            .collect::<serde_json::Map<_, _>>();
        Ok(JsonValue::Object(object))
    }

    fn to_map(&self) -> ModelResult<HashMap<String, DatabaseValue>> {
        Ok(self
            .columns
            .iter()
            .cloned()
            .zip(self.values.iter().cloned())
            .collect())
    }
}

/// Build a typed value from a raw SQL row
pub trait FromRow: Sized {
    fn from_row(row: &DataRow) -> ModelResult<Self>;
}
