//! Connection and transaction resource manager
//!
//! A `Database` backs one serial chain of nested units of work. Every
//! `open_*` call increments a call-depth counter and every `close_*` call
//! decrements it; the physical connection is acquired when the counter
//! leaves zero and released when it returns to zero. Nested calls share that
//! single connection, and only the outermost close decides between commit
//! and rollback.
//!
//! Concurrent chains must use separate `Database` instances over the same
//! data source.

pub mod raw;
pub mod transaction;

use std::fmt;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::backends::{self, DataRow, DataSource, DatabaseBackendType, DatabaseConnection, ExecuteResult};
use crate::config::{DatabaseConfig, OrmConfig};
use crate::criteria::Criteria;
use crate::dialect::{SqlDialect, SqlStatement};
use crate::error::{ModelError, ModelResult};
use crate::model::EntityMeta;

pub use transaction::{IsolationLevel, UnitOfWork};

#[derive(Default)]
struct ConnectionState {
    open_calls: usize,
    connection: Option<Box<dyn DatabaseConnection>>,
    transactional: bool,
}

/// Call-depth counted owner of one physical connection
pub struct Database {
    source: Arc<dyn DataSource>,
    dialect: Arc<dyn SqlDialect>,
    config: OrmConfig,
    state: Mutex<ConnectionState>,
}

impl Database {
    /// Manage connections of `source`, speaking the dialect of its backend
    pub fn new(source: Arc<dyn DataSource>) -> Self {
        Self::with_config(source, OrmConfig::default())
    }

    pub fn with_config(source: Arc<dyn DataSource>, config: OrmConfig) -> Self {
        let dialect = source.backend_type().dialect();
        Self::with_dialect(source, dialect, config)
    }

    pub fn with_dialect(source: Arc<dyn DataSource>, dialect: Arc<dyn SqlDialect>, config: OrmConfig) -> Self {
        Self {
            source,
            dialect,
            config,
            state: Mutex::new(ConnectionState::default()),
        }
    }

    /// Validate `config`, open its pool and wrap it
    pub async fn connect(config: &DatabaseConfig) -> ModelResult<Self> {
        config.validate()?;
        let source = backends::connect(config).await?;
        tracing::info!("Connected to {} database", source.backend_type());
        Ok(Self::with_config(source, config.orm.clone()))
    }

    /// Another manager over the same data source, for an independent call chain
    pub fn fork(&self) -> Self {
        Self::with_dialect(self.source.clone(), self.dialect.clone(), self.config.clone())
    }

    pub fn source(&self) -> &Arc<dyn DataSource> {
        &self.source
    }

    pub fn dialect(&self) -> &dyn SqlDialect {
        self.dialect.as_ref()
    }

    pub fn config(&self) -> &OrmConfig {
        &self.config
    }

    pub fn backend_type(&self) -> DatabaseBackendType {
        self.source.backend_type()
    }

    /// New criteria for `meta` using this database's settings
    pub fn criteria(&self, meta: &'static EntityMeta) -> Criteria {
        Criteria::with_config(meta, &self.config)
    }

    /// Current nesting depth of open calls
    pub async fn depth(&self) -> usize {
        self.state.lock().await.open_calls
    }

    pub async fn is_open(&self) -> bool {
        self.state.lock().await.connection.is_some()
    }

    /// Close the underlying pool
    pub async fn close(&self) {
        self.source.close().await;
    }

    // Opening

    /// Enter a unit of work in autocommit mode
    pub async fn open_connection(&self) -> ModelResult<()> {
        self.open(None).await
    }

    /// Enter a transactional unit of work at the configured isolation level
    pub async fn open_transaction(&self) -> ModelResult<()> {
        self.open(Some(self.config.isolation_level)).await
    }

    pub async fn open_transaction_with(&self, isolation: IsolationLevel) -> ModelResult<()> {
        self.open(Some(isolation)).await
    }

    async fn open(&self, isolation: Option<IsolationLevel>) -> ModelResult<()> {
        let mut state = self.state.lock().await;
        state.open_calls += 1;

        if state.connection.is_some() {
            debug!("Joining open unit of work at depth {}", state.open_calls);
            return Ok(());
        }

        let mut connection = match self.source.acquire().await {
            Ok(connection) => connection,
            Err(e) => {
                state.open_calls -= 1;
                error!("Failed to acquire database connection: {}", e);
                return Err(ModelError::Connection(format!("Failed to acquire connection: {}", e)));
            }
        };

        if let Some(isolation) = isolation {
            if let Err(e) = connection.begin(isolation).await {
                state.open_calls -= 1;
                error!("Failed to begin database transaction: {}", e);
                if let Err(release_error) = connection.release().await {
                    warn!("Failed to release connection after begin failure: {}", release_error);
                }
                return Err(ModelError::Connection(format!("Failed to begin transaction: {}", e)));
            }
            debug!("Database transaction started ({})", isolation);
        } else {
            debug!("Database connection acquired");
        }

        state.connection = Some(connection);
        state.transactional = isolation.is_some();
        Ok(())
    }

    // Closing

    /// Leave a unit of work opened by `open_connection`
    pub async fn close_connection(&self) -> ModelResult<()> {
        let mut state = self.state.lock().await;
        if state.open_calls == 0 {
            return Err(ModelError::Connection("close without a matching open".to_string()));
        }
        state.open_calls -= 1;

        if state.open_calls > 0 {
            return Ok(());
        }

        state.transactional = false;
        match state.connection.take() {
            Some(connection) => {
                debug!("Releasing database connection");
                connection
                    .release()
                    .await
                    .map_err(|e| ModelError::Connection(format!("Failed to release connection: {}", e)))
            }
            None => Ok(()),
        }
    }

    /// Leave a unit of work opened by `open_transaction`.
    ///
    /// Nested calls only decrement the counter and their `commit` flag is
    /// discarded. The outermost call commits or rolls back, then releases
    /// the connection whatever the outcome.
    pub async fn close_transaction(&self, commit: bool) -> ModelResult<()> {
        let mut state = self.state.lock().await;
        if state.open_calls == 0 {
            return Err(ModelError::Connection("close without a matching open".to_string()));
        }
        state.open_calls -= 1;

        if state.open_calls > 0 {
            debug!("Nested unit of work closed (commit: {}), deferring to depth {}", commit, state.open_calls);
            return Ok(());
        }

        let transactional = std::mem::take(&mut state.transactional);
        let Some(mut connection) = state.connection.take() else {
            return Ok(());
        };

        let outcome = if !transactional {
            Ok(())
        } else if commit {
            connection.commit().await.map(|_| debug!("Database transaction committed"))
        } else {
            connection.rollback().await.map(|_| debug!("Database transaction rolled back"))
        };

        let released = connection.release().await;

        outcome
            .map_err(|e| {
                error!("Failed to finish database transaction: {}", e);
                ModelError::Connection(format!("Failed to finish transaction: {}", e))
            })
            .and(released.map_err(|e| ModelError::Connection(format!("Failed to release connection: {}", e))))
    }

    /// Close a plain unit of work after `result` was produced inside it.
    ///
    /// A close failure is returned only when `result` succeeded; otherwise it
    /// is logged and the original error wins.
    pub(crate) async fn finish_connection<R>(&self, result: ModelResult<R>) -> ModelResult<R> {
        let closed = self.close_connection().await;
        Self::merge_close(result, closed)
    }

    /// Close a transactional unit of work, committing only when `result` succeeded
    pub(crate) async fn finish_transaction<R>(&self, result: ModelResult<R>) -> ModelResult<R> {
        let closed = self.close_transaction(result.is_ok()).await;
        Self::merge_close(result, closed)
    }

    fn merge_close<R>(result: ModelResult<R>, closed: ModelResult<()>) -> ModelResult<R> {
        match (result, closed) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(close_error)) => Err(close_error),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(close_error)) => {
                warn!("Ignoring cleanup failure after error: {}", close_error);
                Err(e)
            }
        }
    }

    // Statement execution on the open connection

    pub(crate) async fn run_execute(&self, statement: &SqlStatement) -> ModelResult<ExecuteResult> {
        let mut state = self.state.lock().await;
        let connection = state
            .connection
            .as_mut()
            .ok_or_else(|| ModelError::Connection("No open connection".to_string()))?;
        debug!("Executing SQL: {} ({} params)", statement.sql, statement.params.len());
        connection.execute(&statement.sql, &statement.params).await
    }

    pub(crate) async fn run_fetch(&self, statement: &SqlStatement) -> ModelResult<Vec<DataRow>> {
        let mut state = self.state.lock().await;
        let connection = state
            .connection
            .as_mut()
            .ok_or_else(|| ModelError::Connection("No open connection".to_string()))?;
        debug!("Querying SQL: {} ({} params)", statement.sql, statement.params.len());
        connection.fetch_all(&statement.sql, &statement.params).await
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("backend", &self.source.backend_type())
            .field("dialect", &self.dialect)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;

    use crate::backends::{DatabasePoolStats, DatabaseValue};

    /// Counts every call a `Database` makes against its source
    #[derive(Debug, Default)]
    pub(crate) struct Recorder {
        pub acquired: usize,
        pub released: usize,
        pub begun: usize,
        pub committed: usize,
        pub rolled_back: usize,
        pub statements: Vec<String>,
        pub fail_acquire: bool,
    }

    #[derive(Clone, Default)]
    pub(crate) struct RecordingSource {
        pub recorder: Arc<StdMutex<Recorder>>,
    }

    struct RecordingConnection {
        recorder: Arc<StdMutex<Recorder>>,
    }

    impl RecordingSource {
        pub(crate) fn snapshot<T>(&self, read: impl FnOnce(&Recorder) -> T) -> T {
            read(&self.recorder.lock().unwrap())
        }
    }

    #[async_trait]
    impl DataSource for RecordingSource {
        async fn acquire(&self) -> ModelResult<Box<dyn DatabaseConnection>> {
            let mut recorder = self.recorder.lock().unwrap();
            if recorder.fail_acquire {
                return Err(ModelError::Database("pool exhausted".to_string()));
            }
            recorder.acquired += 1;
            Ok(Box::new(RecordingConnection {
                recorder: self.recorder.clone(),
            }))
        }

        fn backend_type(&self) -> DatabaseBackendType {
            DatabaseBackendType::Sqlite
        }

        fn stats(&self) -> DatabasePoolStats {
            DatabasePoolStats::default()
        }

        async fn close(&self) {}
    }

    #[async_trait]
    impl DatabaseConnection for RecordingConnection {
        async fn begin(&mut self, _isolation: IsolationLevel) -> ModelResult<()> {
            self.recorder.lock().unwrap().begun += 1;
            Ok(())
        }

        async fn commit(&mut self) -> ModelResult<()> {
            self.recorder.lock().unwrap().committed += 1;
            Ok(())
        }

        async fn rollback(&mut self) -> ModelResult<()> {
            self.recorder.lock().unwrap().rolled_back += 1;
            Ok(())
        }

        async fn execute(&mut self, sql: &str, _params: &[DatabaseValue]) -> ModelResult<ExecuteResult> {
            self.recorder.lock().unwrap().statements.push(sql.to_string());
            Ok(ExecuteResult {
                rows_affected: 1,
                last_insert_id: Some(1),
            })
        }

        async fn fetch_all(&mut self, sql: &str, _params: &[DatabaseValue]) -> ModelResult<Vec<DataRow>> {
            self.recorder.lock().unwrap().statements.push(sql.to_string());
            Ok(Vec::new())
        }

        async fn release(self: Box<Self>) -> ModelResult<()> {
            self.recorder.lock().unwrap().released += 1;
            Ok(())
        }
    }

    fn recording_database() -> (Database, RecordingSource) {
        let source = RecordingSource::default();
        (Database::new(Arc::new(source.clone())), source)
    }

    #[tokio::test]
    async fn test_nested_opens_share_one_connection() {
        let (db, source) = recording_database();

        for depth in 1..=5 {
            db.open_transaction().await.unwrap();
            assert_eq!(db.depth().await, depth);
        }
        db.run_execute(&SqlStatement::new("DELETE FROM orders")).await.unwrap();
        for _ in 0..5 {
            db.close_transaction(true).await.unwrap();
        }

        source.snapshot(|r| {
            assert_eq!(r.acquired, 1);
            assert_eq!(r.released, 1);
            assert_eq!(r.begun, 1);
            assert_eq!(r.committed, 1);
        });
        assert!(!db.is_open().await);
    }

    #[tokio::test]
    async fn test_only_outermost_flag_decides() {
        let (db, source) = recording_database();

        db.open_transaction().await.unwrap();
        db.open_transaction().await.unwrap();
        db.close_transaction(false).await.unwrap();
        db.close_transaction(true).await.unwrap();

        source.snapshot(|r| {
            assert_eq!(r.committed, 1);
            assert_eq!(r.rolled_back, 0);
        });

        db.open_transaction().await.unwrap();
        db.open_transaction().await.unwrap();
        db.close_transaction(true).await.unwrap();
        db.close_transaction(false).await.unwrap();

        source.snapshot(|r| {
            assert_eq!(r.committed, 1);
            assert_eq!(r.rolled_back, 1);
            assert_eq!(r.acquired, 2);
            assert_eq!(r.released, 2);
        });
    }

    #[tokio::test]
    async fn test_plain_connection_is_not_upgraded() {
        let (db, source) = recording_database();

        db.open_connection().await.unwrap();
        db.open_transaction().await.unwrap();
        db.close_transaction(true).await.unwrap();
        db.close_connection().await.unwrap();

        source.snapshot(|r| {
            assert_eq!(r.begun, 0);
            assert_eq!(r.committed, 0);
            assert_eq!(r.released, 1);
        });
    }

    #[tokio::test]
    async fn test_failed_acquire_leaves_counter_untouched() {
        let (db, source) = recording_database();
        source.recorder.lock().unwrap().fail_acquire = true;

        let result = db.open_connection().await;
        assert!(matches!(result, Err(ModelError::Connection(_))));
        assert_eq!(db.depth().await, 0);
        assert!(db.close_connection().await.is_err());
    }

    #[tokio::test]
    async fn test_statements_need_an_open_connection() {
        let (db, _source) = recording_database();
        let result = db.run_fetch(&SqlStatement::new("SELECT 1")).await;
        assert!(matches!(result, Err(ModelError::Connection(_))));
    }

    #[tokio::test]
    async fn test_transaction_closure_rolls_back_on_error() {
        let (db, source) = recording_database();

        let result: ModelResult<()> = db
            .transaction(|db| {
                Box::pin(async move {
                    db.run_execute(&SqlStatement::new("DELETE FROM contact")).await?;
                    Err(ModelError::Validation("contact is locked".to_string()))
                })
            })
            .await;

        assert!(matches!(result, Err(ModelError::Validation(_))));
        source.snapshot(|r| {
            assert_eq!(r.rolled_back, 1);
            assert_eq!(r.committed, 0);
            assert_eq!(r.released, 1);
            assert_eq!(r.statements, vec!["DELETE FROM contact".to_string()]);
        });
    }

    #[tokio::test]
    async fn test_read_only_shares_enclosing_transaction() {
        let (db, source) = recording_database();

        let count = db
            .transaction(|db| {
                Box::pin(async move {
                    db.read_only(|db| Box::pin(async move { Ok(db.depth().await) }))
                        .await
                })
            })
            .await
            .unwrap();

        assert_eq!(count, 2);
        source.snapshot(|r| {
            assert_eq!(r.acquired, 1);
            assert_eq!(r.committed, 1);
        });
    }
}
