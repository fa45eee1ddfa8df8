//! MySQL Backend
//!
//! sqlx-backed `DataSource` for MySQL and MariaDB. Transaction control is
//! issued as plain statements on the checked-out connection so the resource
//! manager, not sqlx, decides when a unit of work begins and ends.

use async_trait::async_trait;
use sqlx::mysql::{MySql, MySqlArguments, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::pool::PoolConnection;
use sqlx::query::Query;
use sqlx::{Column, Executor, Row, TypeInfo, ValueRef};
use tracing::{debug, warn};

use super::core::{DataSource, DatabaseConnection, DatabasePoolConfig, DatabasePoolStats, ExecuteResult};
use super::row::DataRow;
use super::value::DatabaseValue;
use super::DatabaseBackendType;
use crate::database::IsolationLevel;
use crate::error::{ModelError, ModelResult};

/// Connection pool for MySQL
#[derive(Debug, Clone)]
pub struct MySqlDataSource {
    pool: MySqlPool,
}

impl MySqlDataSource {
    pub async fn connect(database_url: &str, config: &DatabasePoolConfig) -> ModelResult<Self> {
        let mut options = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.acquire_timeout)
            .test_before_acquire(config.test_before_acquire);

        if let Some(idle_timeout) = config.idle_timeout {
            options = options.idle_timeout(idle_timeout);
        }

        if let Some(max_lifetime) = config.max_lifetime {
            options = options.max_lifetime(max_lifetime);
        }

        let pool = options
            .connect(database_url)
            .await
            .map_err(|e| ModelError::Connection(format!("Failed to create MySQL pool: {}", e)))?;

        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: MySqlPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

#[async_trait]
impl DataSource for MySqlDataSource {
    async fn acquire(&self) -> ModelResult<Box<dyn DatabaseConnection>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| ModelError::Connection(format!("Failed to acquire MySQL connection: {}", e)))?;

        Ok(Box::new(MySqlConnection {
            conn,
            in_transaction: false,
        }))
    }

    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::MySql
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

struct MySqlConnection {
    conn: PoolConnection<MySql>,
    in_transaction: bool,
}

impl MySqlConnection {
    async fn control(&mut self, statement: &str) -> ModelResult<()> {
        (&mut *self.conn)
            .execute(statement)
            .await
            .map(|_| ())
            .map_err(|e| ModelError::Connection(format!("{} failed: {}", statement, e)))
    }
}

#[async_trait]
impl DatabaseConnection for MySqlConnection {
    async fn begin(&mut self, isolation: IsolationLevel) -> ModelResult<()> {
        let set_level = format!("SET TRANSACTION ISOLATION LEVEL {}", isolation.as_sql());
        self.control(&set_level).await?;
        self.control("START TRANSACTION").await?;
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
        let last_insert_id = match result.last_insert_id() {
            0 => None,
            id => i64::try_from(id).ok(),
        };

        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            last_insert_id,
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
            warn!("Releasing MySQL connection with an open transaction, rolling back");
            self.rollback().await?;
        }
        debug!("MySQL connection returned to pool");
        Ok(())
    }
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &DatabaseValue,
) -> ModelResult<Query<'q, MySql, MySqlArguments>> {
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

fn decode_row(row: &MySqlRow) -> ModelResult<DataRow> {
    let columns = row.columns().iter().map(|c| c.name().to_string()).collect();
    let values = (0..row.len())
        .map(|index| decode_value(row, index))
        .collect::<ModelResult<Vec<_>>>()?;
    Ok(DataRow::new(columns, values))
}

fn decode_value(row: &MySqlRow, index: usize) -> ModelResult<DatabaseValue> {
    let type_name = {
        let raw = row.try_get_raw(index)?;
        if raw.is_null() {
            return Ok(DatabaseValue::Null);
        }
        raw.type_info().name().to_string()
    };

    let value = match type_name.as_str() {
        "BOOLEAN" => DatabaseValue::Bool(row.try_get_unchecked(index)?),
        "TINYINT" => DatabaseValue::Int32(row.try_get_unchecked::<i8, _>(index)? as i32),
        "TINYINT UNSIGNED" => DatabaseValue::Int32(row.try_get_unchecked::<u8, _>(index)? as i32),
        "SMALLINT" => DatabaseValue::Int32(row.try_get_unchecked::<i16, _>(index)? as i32),
        "SMALLINT UNSIGNED" | "YEAR" => DatabaseValue::Int32(row.try_get_unchecked::<u16, _>(index)? as i32),
        "INT" | "MEDIUMINT" => DatabaseValue::Int32(row.try_get_unchecked(index)?),
        "INT UNSIGNED" | "MEDIUMINT UNSIGNED" => {
            DatabaseValue::Int64(row.try_get_unchecked::<u32, _>(index)? as i64)
        }
        "BIGINT" => DatabaseValue::Int64(row.try_get_unchecked(index)?),
        "BIGINT UNSIGNED" => {
            let value: u64 = row.try_get_unchecked(index)?;
            match i64::try_from(value) {
                Ok(signed) => DatabaseValue::Int64(signed),
                Err(_) => DatabaseValue::String(value.to_string()),
            }
        }
        "FLOAT" => DatabaseValue::Float32(row.try_get_unchecked(index)?),
        "DOUBLE" => DatabaseValue::Float64(row.try_get_unchecked(index)?),
        "DATETIME" => {
            let naive: chrono::NaiveDateTime = row.try_get_unchecked(index)?;
            DatabaseValue::DateTime(naive.and_utc())
        }
        "TIMESTAMP" => DatabaseValue::DateTime(row.try_get_unchecked(index)?),
        "DATE" => DatabaseValue::Date(row.try_get_unchecked(index)?),
        "TIME" => DatabaseValue::Time(row.try_get_unchecked(index)?),
        "JSON" => {
            let text: String = row.try_get_unchecked(index)?;
            DatabaseValue::Json(serde_json::from_str(&text)?)
        }
        "BINARY" | "VARBINARY" | "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
            DatabaseValue::Bytes(row.try_get_unchecked(index)?)
        }
        _ => DatabaseValue::String(row.try_get_unchecked(index)?),
    };

    Ok(value)
}
