//! Raw SQL passthrough
//!
//! Hand-written statements skip the criteria compiler but still run inside
//! the call-depth counted unit of work, so they share the connection (and
//! transaction) of whatever encloses them.

use super::Database;
use crate::backends::{DataRow, DatabaseValue, FromDatabaseValue, FromRow};
use crate::dialect::SqlStatement;
use crate::error::ModelResult;
use crate::model::{populate, Entity};
use crate::paging::Paging;

impl Database {
    /// Run a query and return its detached rows
    pub async fn query(&self, statement: &SqlStatement) -> ModelResult<Vec<DataRow>> {
        self.open_connection().await?;
        let result = self
            .run_fetch(statement)
            .await
            .map_err(|e| e.in_operation("raw query"));
        self.finish_connection(result).await
    }

    pub async fn query_as<R: FromRow>(&self, statement: &SqlStatement) -> ModelResult<Vec<R>> {
        self.query(statement).await?.iter().map(R::from_row).collect()
    }

    /// Run a query and map every row with `map`
    pub async fn query_with<R, F>(&self, statement: &SqlStatement, map: F) -> ModelResult<Vec<R>>
    where
        F: FnMut(&DataRow) -> ModelResult<R>,
    {
        self.query(statement).await?.iter().map(map).collect()
    }

    /// Run a query and populate one `T` per row from plain column names
    pub async fn query_entities<T: Entity + Default>(&self, statement: &SqlStatement) -> ModelResult<Vec<T>> {
        self.query_with(statement, |row| {
            let mut entity = T::default();
            populate(&mut entity, T::meta(), row, None)?;
            Ok(entity)
        })
        .await
    }

    /// First column of the first row, `None` when there is no row or it is NULL
    pub async fn query_scalar<V: FromDatabaseValue>(&self, statement: &SqlStatement) -> ModelResult<Option<V>> {
        let first = self
            .query(statement)
            .await?
            .into_iter()
            .next()
            .and_then(DataRow::into_first);

        match first {
            None | Some(DatabaseValue::Null) => Ok(None),
            Some(value) => value.into_typed().map(Some),
        }
    }

    /// Run a data-modifying statement in a transactional unit of work and
    /// return the number of affected rows
    pub async fn execute(&self, statement: &SqlStatement) -> ModelResult<u64> {
        self.open_transaction().await?;
        let result = self
            .run_execute(statement)
            .await
            .map(|outcome| outcome.rows_affected)
            .map_err(|e| e.in_operation("raw execution"));
        self.finish_transaction(result).await
    }

    /// Paging state for a hand-written query, its total taken from `count_statement`
    pub async fn build_paging(&self, count_statement: &SqlStatement, page_size: u64, page: u64) -> ModelResult<Paging> {
        let mut paging = Paging::with_page(page_size, page)?;
        let total: Option<i64> = self.query_scalar(count_statement).await?;
        paging.set_total_rows(total.unwrap_or(0).max(0) as u64);
        Ok(paging)
    }
}
