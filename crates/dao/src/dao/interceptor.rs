//! DAO interceptors
//!
//! Hooks run at fixed points of every DAO operation, inside the operation's
//! unit of work. A `before_*` hook that returns an error aborts the
//! operation and, for writes, rolls the transaction back. `after_*` hooks
//! see whether the operation succeeded and run before the unit of work
//! closes.

use async_trait::async_trait;

use crate::criteria::Criteria;
use crate::error::ModelResult;
use crate::model::Entity;

#[async_trait]
pub trait ModelInterceptor<T: Entity>: Send + Sync {
    /// Before an insert or an update of `entity`
    async fn before_save(&self, _entity: &mut T) -> ModelResult<()> {
        Ok(())
    }

    async fn after_save(&self, _entity: &T, _success: bool) -> ModelResult<()> {
        Ok(())
    }

    async fn before_insert(&self, _entity: &mut T) -> ModelResult<()> {
        Ok(())
    }

    async fn after_insert(&self, _entity: &T, _success: bool) -> ModelResult<()> {
        Ok(())
    }

    async fn before_update(&self, _entity: &mut T) -> ModelResult<()> {
        Ok(())
    }

    async fn after_update(&self, _entity: &T, _success: bool) -> ModelResult<()> {
        Ok(())
    }

    /// Before the rows matching `criteria` are deleted
    async fn before_delete(&self, _criteria: &Criteria) -> ModelResult<()> {
        Ok(())
    }

    async fn after_delete(&self, _criteria: &Criteria, _success: bool) -> ModelResult<()> {
        Ok(())
    }

    async fn before_load(&self, _criteria: &Criteria) -> ModelResult<()> {
        Ok(())
    }

    async fn after_load(&self, _criteria: &Criteria, _success: bool) -> ModelResult<()> {
        Ok(())
    }
}
