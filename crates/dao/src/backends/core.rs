//! Core Database Backend Traits
//!
//! These traits abstract the driver away from the resource manager: a
//! `DataSource` hands out physical connections, and a `DatabaseConnection`
//! runs parameterized statements and transaction control on one of them.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::row::DataRow;
use super::value::DatabaseValue;
use super::DatabaseBackendType;
use crate::database::IsolationLevel;
use crate::error::ModelResult;

/// Outcome of a data-modifying statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExecuteResult {
    pub rows_affected: u64,
    /// Key generated by the statement, when the driver reports one
    pub last_insert_id: Option<i64>,
}

/// One physical connection checked out of a data source
#[async_trait]
pub trait DatabaseConnection: Send {
    /// Leave autocommit mode and start a transaction at the given isolation level
    async fn begin(&mut self, isolation: IsolationLevel) -> ModelResult<()>;

    async fn commit(&mut self) -> ModelResult<()>;

    async fn rollback(&mut self) -> ModelResult<()>;

    /// Execute a statement and report affected rows
    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> ModelResult<ExecuteResult>;

    /// Execute a query and decode every row
    async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> ModelResult<Vec<DataRow>>;

    /// Return the connection to its source
    async fn release(self: Box<Self>) -> ModelResult<()>;
}

/// Abstract connection pool
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Check out a physical connection
    async fn acquire(&self) -> ModelResult<Box<dyn DatabaseConnection>>;

    fn backend_type(&self) -> DatabaseBackendType;

    fn stats(&self) -> DatabasePoolStats;

    async fn close(&self);
}

/// Database pool statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DatabasePoolStats {
    pub total_connections: u32,
    pub idle_connections: u32,
    pub active_connections: u32,
}

/// Database pool configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabasePoolConfig {
    pub max_connections: u32,
    pub min_connections: u32,
    pub acquire_timeout: Duration,
    pub idle_timeout: Option<Duration>,
    pub max_lifetime: Option<Duration>,
    pub test_before_acquire: bool,
}

impl Default for DatabasePoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_connections: 1,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            max_lifetime: Some(Duration::from_secs(1800)),
            test_before_acquire: true,
        }
    }
}

impl DatabasePoolConfig {
    /// Settings for an in-memory database, which lives exactly as long as its
    /// single connection
    pub fn in_memory() -> Self {
        Self {
            max_connections: 1,
            min_connections: 1,
            idle_timeout: None,
            max_lifetime: None,
            ..Self::default()
        }
    }
}
