//! SQLite Backend

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Executor, Row, TypeInfo, ValueRef};
use tracing::{debug, warn};

use super::core::{DataSource, DatabaseConnection, DatabasePoolConfig, DatabasePoolStats, ExecuteResult};
use super::row::DataRow;
use super::value::DatabaseValue;
use super::DatabaseBackendType;
use crate::database::IsolationLevel;
use crate::error::{ModelError, ModelResult};

/// Connection pool for SQLite
#[derive(Debug, Clone)]
pub struct SqliteDataSource {
    pool: SqlitePool,
}

impl SqliteDataSource {
    /// Connect to a SQLite database.
    ///
    /// In-memory URLs are pinned to a single connection that never expires,
    /// since every new connection would see an empty database.
    pub async fn connect(database_url: &str, config: &DatabasePoolConfig) -> ModelResult<Self> {
        let config = if is_in_memory(database_url) {
            DatabasePoolConfig {
                acquire_timeout: config.acquire_timeout,
                ..DatabasePoolConfig::in_memory()
            }
        } else {
            config.clone()
        };

        let options = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .test_before_acquire(config.test_before_acquire)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(config.max_lifetime);

        let pool = options
            .connect(database_url)
            .await
            .map_err(|e| ModelError::Connection(format!("Failed to create SQLite pool: {}", e)))?;

        Ok(Self::from_pool(pool))
    }

    /// Private in-memory database, mostly for tests
    pub async fn in_memory() -> ModelResult<Self> {
        Self::connect("sqlite::memory:", &DatabasePoolConfig::in_memory()).await
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

#[async_trait]
impl DataSource for SqliteDataSource {
    async fn acquire(&self) -> ModelResult<Box<dyn DatabaseConnection>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| ModelError::Connection(format!("Failed to acquire SQLite connection: {}", e)))?;

        Ok(Box::new(SqliteConnection {
            conn,
            in_transaction: false,
        }))
    }

    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::Sqlite
    }

    fn stats(&self) -> DatabasePoolStats {
        let total = self.pool.size();
        let idle = self.pool.num_idle() as u32;
        DatabasePoolStats {
            total_connections: total,
            idle_connections: idle,
            active_connections: total.saturating_sub(idle),
        }
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

struct SqliteConnection {
    conn: PoolConnection<Sqlite>,
    in_transaction: bool,
}

impl SqliteConnection {
    async fn control(&mut self, statement: &str) -> ModelResult<()> {
        (&mut *self.conn)
            .execute(statement)
            .await
            .map(|_| ())
            .map_err(|e| ModelError::Connection(format!("{} failed: {}", statement, e)))
    }
}

#[async_trait]
impl DatabaseConnection for SqliteConnection {
    async fn begin(&mut self, isolation: IsolationLevel) -> ModelResult<()> {
        // SQLite transactions are always serializable
        debug!("SQLite ignores isolation level {:?}", isolation);
        self.control("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> ModelResult<()> {
        self.control("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> ModelResult<()> {
        self.control("ROLLBACK").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[DatabaseValue]) -> ModelResult<ExecuteResult> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param)?;
        }

        let result = query.execute(&mut *self.conn).await?;
        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            last_insert_id: Some(result.last_insert_rowid()),
        })
    }

    async fn fetch_all(&mut self, sql: &str, params: &[DatabaseValue]) -> ModelResult<Vec<DataRow>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_value(query, param)?;
        }

        let rows = query.fetch_all(&mut *self.conn).await?;
        rows.iter().map(decode_row).collect()
    }

    async fn release(mut self: Box<Self>) -> ModelResult<()> {
        if self.in_transaction {
            warn!("Releasing SQLite connection with an open transaction, rolling back");
            self.rollback().await?;
        }
        debug!("SQLite connection returned to pool");
        Ok(())
    }
}

fn bind_value<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &DatabaseValue,
) -> ModelResult<Query<'q, Sqlite, SqliteArguments<'q>>> {
    match value {
        DatabaseValue::Null => Ok(query.bind(Option::<String>::None)),
        DatabaseValue::Bool(b) => Ok(query.bind(*b)),
        DatabaseValue::Int32(i) => Ok(query.bind(*i)),
        DatabaseValue::Int64(i) => Ok(query.bind(*i)),
        DatabaseValue::Float32(f) => Ok(query.bind(*f)),
        DatabaseValue::Float64(f) => Ok(query.bind(*f)),
        DatabaseValue::String(s) => Ok(query.bind(s.clone())),
        DatabaseValue::Bytes(b) => Ok(query.bind(b.clone())),
        DatabaseValue::Uuid(u) => Ok(query.bind(u.to_string())),
        DatabaseValue::DateTime(dt) => Ok(query.bind(*dt)),
        DatabaseValue::Date(d) => Ok(query.bind(*d)),
        DatabaseValue::Time(t) => Ok(query.bind(*t)),
        DatabaseValue::Json(j) => Ok(query.bind(j.to_string())),
        DatabaseValue::Array(_) => Err(ModelError::InvalidInput(
            "array values must be expanded into one placeholder per element".to_string(),
        )),
    }
}

fn decode_row(row: &SqliteRow) -> ModelResult<DataRow> {
    let columns = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..row.len())
        .map(|index| decode_value(row, index))
        .collect::<ModelResult<Vec<_>>>()?;
    Ok(DataRow::new(columns, values))
}

/// Decode by storage class; declared-type reshaping happens in the row mapper
fn decode_value(row: &SqliteRow, index: usize) -> ModelResult<DatabaseValue> {
    let type_name = {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(DatabaseValue::Null);
        }
        raw.type_info().name().to_string()
    };

    let value = match type_name.as_str() {
        "INTEGER" | "BOOLEAN" => DatabaseValue::Int64(row.try_get_unchecked(index)?),
        "REAL" => DatabaseValue::Float64(row.try_get_unchecked(index)?),
        "BLOB" => DatabaseValue::Bytes(row.try_get_unchecked(index)?),
        _ => DatabaseValue::String(row.try_get_unchecked(index)?),
    };

    Ok(value)
}
