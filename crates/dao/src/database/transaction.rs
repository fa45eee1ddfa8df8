//! Transaction Management
//!
//! Scoped units of work on top of the call-depth counted connection: the
//! closure runs between an open and a close, and the close always happens,
//! whatever the closure returns.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::Database;
use crate::config::ConfigError;
use crate::error::ModelResult;

/// Transaction isolation levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Convert to SQL string for SET TRANSACTION ISOLATION LEVEL command
    pub fn as_sql(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "READ COMMITTED",
            IsolationLevel::RepeatableRead => "REPEATABLE READ",
            IsolationLevel::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for IsolationLevel {
    type Err = ConfigError;

    /// Accepts `read_committed`, `read-committed` or `READ COMMITTED` spellings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .map(|c| if c == '-' || c == ' ' { '_' } else { c.to_ascii_lowercase() })
            .collect();

        match normalized.as_str() {
            "read_uncommitted" => Ok(IsolationLevel::ReadUncommitted),
            "read_committed" => Ok(IsolationLevel::ReadCommitted),
            "repeatable_read" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            _ => Err(ConfigError::InvalidValue {
                field: "isolation_level".to_string(),
                value: s.to_string(),
                expected: "read_uncommitted, read_committed, repeatable_read or serializable".to_string(),
            }),
        }
    }
}

/// Boxed future returned by the closures of `Database::transaction` and
/// `Database::read_only`
pub type UnitOfWork<'a, R> = Pin<Box<dyn Future<Output = ModelResult<R>> + Send + 'a>>;

impl Database {
    /// Run `work` inside a transactional unit of work.
    ///
    /// The outermost call commits when `work` returns `Ok` and rolls back
    /// otherwise. Nested calls join the enclosing unit of work, and only an
    /// error reaching the outermost frame rolls it back.
    pub async fn transaction<'a, F, R>(&'a self, work: F) -> ModelResult<R>
    where
        F: FnOnce(&'a Database) -> UnitOfWork<'a, R>,
    {
        self.open_transaction().await?;
        let result = work(self).await;
        debug!("Unit of work finished, success: {}", result.is_ok());
        self.finish_transaction(result).await
    }

    /// Run `work` on a plain connection, shared with any enclosing unit of work
    pub async fn read_only<'a, F, R>(&'a self, work: F) -> ModelResult<R>
    where
        F: FnOnce(&'a Database) -> UnitOfWork<'a, R>,
    {
        self.open_connection().await?;
        let result = work(self).await;
        self.finish_connection(result).await
    }
}
