//! # elif-dao: Criteria based data access for elif.rs
//!
//! Entities declare static field metadata, queries are described with a
//! `Criteria` whose field references and relationship fetches are resolved
//! to deterministic table aliases, and a per-backend dialect compiles them
//! to parameterized SQL. A call-depth counted `Database` shares one physical
//! connection across nested units of work.

pub mod backends;
pub mod config;
pub mod criteria;
pub mod dao;
pub mod database;
pub mod dialect;
pub mod error;
pub mod model;
pub mod paging;

#[cfg(test)]
pub(crate) mod testing;

// Re-export core traits and types
pub use backends::{
    DataRow, DataSource, DatabaseBackendType, DatabaseConnection, DatabasePoolConfig, DatabaseRow,
    DatabaseRowExt, DatabaseValue, ExecuteResult, FromDatabaseValue, FromRow, MySqlDataSource, SqliteDataSource,
};
pub use config::{ConfigError, DatabaseConfig, OrmConfig};
pub use criteria::{Criteria, FilterOperator, JoinDescriptor, LogicalOperator, OrderDirection};
pub use dao::{Dao, ModelInterceptor};
pub use database::{Database, IsolationLevel, UnitOfWork};
pub use dialect::{MySqlDialect, SqlDialect, SqlStatement, SqliteDialect};
pub use error::{ModelError, ModelResult, OrmError, OrmResult};
pub use model::{downcast_related, unknown_field, Entity, EntityMeta, FieldKind, FieldMeta};
pub use paging::{PagedList, Paging};

/// Everything an application module usually needs
pub mod prelude {
    pub use crate::{
        downcast_related, unknown_field, Criteria, Dao, Database, DatabaseValue, Entity, EntityMeta, FieldKind,
        FilterOperator, LogicalOperator, ModelError, ModelInterceptor, ModelResult, OrderDirection, PagedList,
        SqlStatement,
    };
}
