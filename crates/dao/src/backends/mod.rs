//! Database Backend Abstractions
//!
//! Driver-neutral traits for pools, connections, values and rows, plus the
//! sqlx implementations for MySQL and SQLite.

pub mod core;
pub mod mysql;
pub mod row;
pub mod sqlite;
pub mod value;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use url::Url;

use crate::config::DatabaseConfig;
use crate::dialect::{MySqlDialect, SqlDialect, SqliteDialect};
use crate::error::{ModelError, ModelResult};

pub use self::core::*;
pub use mysql::MySqlDataSource;
pub use row::{DataRow, DatabaseRow, DatabaseRowExt, FromRow};
pub use sqlite::SqliteDataSource;
pub use value::{DatabaseValue, FromDatabaseValue};

/// Database backend type enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatabaseBackendType {
    MySql,
    Sqlite,
}

impl DatabaseBackendType {
    /// Detect the backend from a connection URL scheme
    pub fn from_url(database_url: &str) -> ModelResult<Self> {
        let url = Url::parse(database_url).map_err(|e| {
            ModelError::Configuration(format!("Invalid database URL '{}': {}", database_url, e))
        })?;
        url.scheme().parse()
    }

    /// SQL dialect spoken by this backend
    pub fn dialect(&self) -> Arc<dyn SqlDialect> {
        match self {
            DatabaseBackendType::MySql => Arc::new(MySqlDialect),
            DatabaseBackendType::Sqlite => Arc::new(SqliteDialect),
        }
    }
}

impl fmt::Display for DatabaseBackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseBackendType::MySql => write!(f, "mysql"),
            DatabaseBackendType::Sqlite => write!(f, "sqlite"),
        }
    }
}

impl FromStr for DatabaseBackendType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(DatabaseBackendType::MySql),
            "sqlite" => Ok(DatabaseBackendType::Sqlite),
            _ => Err(ModelError::Configuration(format!("Unsupported database backend: {}", s))),
        }
    }
}

/// Build the data source for the backend named by the configured URL
pub async fn connect(config: &DatabaseConfig) -> ModelResult<Arc<dyn DataSource>> {
    match DatabaseBackendType::from_url(&config.url)? {
        DatabaseBackendType::MySql => {
            Ok(Arc::new(MySqlDataSource::connect(&config.url, &config.pool).await?))
        }
        DatabaseBackendType::Sqlite => {
            Ok(Arc::new(SqliteDataSource::connect(&config.url, &config.pool).await?))
        }
    }
}
