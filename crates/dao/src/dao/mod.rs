//! Generic data access object
//!
//! `Dao<T>` compiles criteria through the database's dialect and runs the
//! statements inside units of work: writes open a transaction, reads open a
//! plain connection. Both join whatever unit of work is already open on the
//! same `Database`, so DAO calls compose inside `Database::transaction`.

pub mod interceptor;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::backends::{DatabaseRow, DatabaseValue, FromDatabaseValue};
use crate::config::MAIN_TABLE_ALIAS;
use crate::criteria::{Criteria, FilterOperator};
use crate::database::Database;
use crate::dialect::SqlStatement;
use crate::error::{ModelError, ModelResult};
use crate::model::{map_row, BoundField, Entity, EntityMeta};
use crate::paging::{PagedList, Paging};

pub use interceptor::ModelInterceptor;

/// CRUD operations for one entity type
pub struct Dao<'db, T: Entity + Default> {
    db: &'db Database,
    meta: &'static EntityMeta,
    interceptor: Option<Arc<dyn ModelInterceptor<T>>>,
}

impl Database {
    /// DAO for `T` over this database
    pub fn dao<T: Entity + Default>(&self) -> ModelResult<Dao<'_, T>> {
        Dao::new(self)
    }
}

impl<'db, T: Entity + Default> Dao<'db, T> {
    /// Fails when the metadata of `T` is unusable
    pub fn new(db: &'db Database) -> ModelResult<Self> {
        let meta = T::meta();
        meta.validate()?;
        Ok(Self {
            db,
            meta,
            interceptor: None,
        })
    }

    pub fn with_interceptor(mut self, interceptor: Arc<dyn ModelInterceptor<T>>) -> Self {
        self.interceptor = Some(interceptor);
        self
    }

    pub fn database(&self) -> &'db Database {
        self.db
    }

    pub fn meta(&self) -> &'static EntityMeta {
        self.meta
    }

    fn hooks(&self) -> Option<&dyn ModelInterceptor<T>> {
        self.interceptor.as_deref()
    }

    // Criteria factories

    pub fn criteria(&self) -> Criteria {
        self.db.criteria(self.meta)
    }

    pub fn paged_criteria(&self, page_size: u64) -> ModelResult<Criteria> {
        let mut criteria = self.criteria();
        criteria.set_paging(Paging::new(page_size)?);
        Ok(criteria)
    }

    /// Paged criteria with the configured default page size
    pub fn default_paged_criteria(&self) -> ModelResult<Criteria> {
        self.paged_criteria(self.db.config().default_page_size)
    }

    /// Criteria matching the row with identity `id`
    pub fn id_criteria(&self, id: i64) -> ModelResult<Criteria> {
        let identity = self.meta.identity_field()?;
        let mut criteria = self.criteria();
        criteria.add_filter(identity.name, FilterOperator::Equal, id)?;
        Ok(criteria)
    }

    pub fn condition_criteria(&self, template: &str, values: Vec<DatabaseValue>) -> ModelResult<Criteria> {
        let mut criteria = self.criteria();
        criteria.condition(template, values)?;
        Ok(criteria)
    }

    // Units of work

    async fn read<R>(&self, operation: &'static str, work: impl Future<Output = ModelResult<R>>) -> ModelResult<R> {
        self.db.open_connection().await?;
        let result = work.await.map_err(|e| e.in_operation(operation));
        self.db.finish_connection(result).await
    }

    async fn write<R>(&self, operation: &'static str, work: impl Future<Output = ModelResult<R>>) -> ModelResult<R> {
        self.db.open_transaction().await?;
        let result = work.await.map_err(|e| e.in_operation(operation));
        self.db.finish_transaction(result).await
    }

    // Insert, update, save

    /// Insert `entity`, storing the generated identity when it had none
    pub async fn insert(&self, entity: &mut T) -> ModelResult<()> {
        self.write("insertion", self.insert_hooked(entity)).await
    }

    async fn insert_hooked(&self, entity: &mut T) -> ModelResult<()> {
        if let Some(hooks) = self.hooks() {
            hooks.before_save(entity).await?;
            hooks.before_insert(entity).await?;
        }

        let result = self.insert_row(entity).await;

        match self.hooks() {
            Some(hooks) => {
                let success = result.is_ok();
                let after = match hooks.after_insert(entity, success).await {
                    Ok(()) => hooks.after_save(entity, success).await,
                    Err(e) => Err(e),
                };
                merge_after(result, after)
            }
            None => result,
        }
    }

    async fn insert_row(&self, entity: &mut T) -> ModelResult<()> {
        let fields: Vec<BoundField> = self
            .meta
            .bind_values(&*entity)?
            .into_iter()
            .filter(|bound| !(bound.field.identity && bound.value.is_null()))
            .collect();

        let statement = self.db.dialect().build_insert(self.meta.table(), &fields);
        let outcome = self.db.run_execute(&statement).await?;

        if entity.id().is_none() {
            let id = outcome.last_insert_id.ok_or_else(|| ModelError::Execution {
                operation: "insertion",
                message: "the database reported no generated key".to_string(),
            })?;
            entity.set_id(id);
        }
        Ok(())
    }

    /// Update every field of `entity` by its identity
    pub async fn update(&self, entity: &mut T) -> ModelResult<()> {
        let id = entity.id().ok_or(ModelError::MissingPrimaryKey)?;
        self.write("update", self.update_hooked(entity, id)).await
    }

    async fn update_hooked(&self, entity: &mut T, id: i64) -> ModelResult<()> {
        if let Some(hooks) = self.hooks() {
            hooks.before_save(entity).await?;
            hooks.before_update(entity).await?;
        }

        let result = self.update_row(entity, id).await;

        match self.hooks() {
            Some(hooks) => {
                let success = result.is_ok();
                let after = match hooks.after_update(entity, success).await {
                    Ok(()) => hooks.after_save(entity, success).await,
                    Err(e) => Err(e),
                };
                merge_after(result, after)
            }
            None => result,
        }
    }

    async fn update_row(&self, entity: &T, id: i64) -> ModelResult<()> {
        let fields: Vec<BoundField> = self
            .meta
            .bind_values(entity)?
            .into_iter()
            .filter(|bound| !bound.field.identity)
            .collect();

        let criteria = self.id_criteria(id)?;
        let statement = self.db.dialect().build_update(&criteria, &fields);
        let outcome = self.db.run_execute(&statement).await?;
        if outcome.rows_affected == 0 {
            return Err(ModelError::NoRecordAffected { operation: "updated" });
        }
        Ok(())
    }

    /// Insert when `entity` has no identity yet, update otherwise
    pub async fn save(&self, entity: &mut T) -> ModelResult<()> {
        if entity.is_new() {
            self.insert(entity).await
        } else {
            self.update(entity).await
        }
    }

    /// Set `fields` on every row matching `criteria`, returning the rows affected.
    ///
    /// Orderings, groupings, row limits and paging of `criteria` are ignored.
    pub async fn update_fields(&self, fields: &[(&str, DatabaseValue)], criteria: &Criteria) -> ModelResult<u64> {
        let bound = fields
            .iter()
            .map(|(name, value)| Ok(BoundField::new(*self.meta.field(name)?, value.clone())))
            .collect::<ModelResult<Vec<_>>>()?;
        if bound.is_empty() {
            return Err(ModelError::InvalidInput("No fields to update".to_string()));
        }

        let statement = self.db.dialect().build_update(&criteria.row_selection(), &bound);

        self.write("update", async {
            let outcome = self.db.run_execute(&statement).await?;
            Ok::<_, ModelError>(outcome.rows_affected)
        })
        .await
    }

    pub async fn update_all(&self, fields: &[(&str, DatabaseValue)]) -> ModelResult<u64> {
        self.update_fields(fields, &self.criteria()).await
    }

    /// Set `fields` on the row with identity `id`
    pub async fn update_by_id(&self, id: i64, fields: &[(&str, DatabaseValue)]) -> ModelResult<()> {
        match self.update_fields(fields, &self.id_criteria(id)?).await? {
            0 => Err(ModelError::NoRecordAffected { operation: "updated" }),
            _ => Ok(()),
        }
    }

    pub async fn update_by_condition(
        &self,
        fields: &[(&str, DatabaseValue)],
        template: &str,
        values: Vec<DatabaseValue>,
    ) -> ModelResult<u64> {
        self.update_fields(fields, &self.condition_criteria(template, values)?).await
    }

    // Delete

    pub async fn delete(&self, entity: &T) -> ModelResult<()> {
        let id = entity.id().ok_or(ModelError::MissingPrimaryKey)?;
        self.delete_by_id(id).await
    }

    pub async fn delete_by_id(&self, id: i64) -> ModelResult<()> {
        match self.delete_by_criteria(&self.id_criteria(id)?).await? {
            0 => Err(ModelError::NoRecordAffected { operation: "deleted" }),
            _ => Ok(()),
        }
    }

    /// Delete every row matching `criteria`, returning the rows affected.
    ///
    /// Orderings, groupings, row limits and paging of `criteria` are ignored.
    pub async fn delete_by_criteria(&self, criteria: &Criteria) -> ModelResult<u64> {
        let statement = self.db.dialect().build_delete(&criteria.row_selection());

        self.write("deletion", async {
            if let Some(hooks) = self.hooks() {
                hooks.before_delete(criteria).await?;
            }

            let result = self
                .db
                .run_execute(&statement)
                .await
                .map(|outcome| outcome.rows_affected);

            match self.hooks() {
                Some(hooks) => {
                    let after = hooks.after_delete(criteria, result.is_ok()).await;
                    merge_after(result, after)
                }
                None => result,
            }
        })
        .await
    }

    pub async fn delete_by_condition(&self, template: &str, values: Vec<DatabaseValue>) -> ModelResult<u64> {
        self.delete_by_criteria(&self.condition_criteria(template, values)?).await
    }

    pub async fn delete_all(&self) -> ModelResult<u64> {
        self.delete_by_criteria(&self.criteria()).await
    }

    // Cascading delete

    pub async fn delete_cascade(&self, entity: &T) -> ModelResult<()> {
        let id = entity.id().ok_or(ModelError::MissingPrimaryKey)?;
        self.delete_cascade_by_id(id).await
    }

    pub async fn delete_cascade_by_id(&self, id: i64) -> ModelResult<()> {
        match self.delete_cascade_by_criteria(&mut self.id_criteria(id)?).await? {
            0 => Err(ModelError::NoRecordAffected { operation: "deleted" }),
            _ => Ok(()),
        }
    }

    /// Delete the rows matching `criteria` and, first, every dependent row
    /// pointing at them, all in one transaction. Returns the number of root
    /// rows deleted.
    pub async fn delete_cascade_by_criteria(&self, criteria: &mut Criteria) -> ModelResult<u64> {
        let limits = criteria.suspend_limits();
        let select = select_ids_statement(self.db, criteria);
        criteria.restore_limits(limits);
        let select = select?;

        let criteria = &*criteria;
        self.write("deletion", async {
            if let Some(hooks) = self.hooks() {
                hooks.before_delete(criteria).await?;
            }

            let result = self.delete_cascade_rows(&select).await;

            match self.hooks() {
                Some(hooks) => {
                    let after = hooks.after_delete(criteria, result.is_ok()).await;
                    merge_after(result, after)
                }
                None => result,
            }
        })
        .await
    }

    async fn delete_cascade_rows(&self, select: &SqlStatement) -> ModelResult<u64> {
        let ids = fetch_ids(self.db, select).await?;
        if ids.is_empty() {
            return Ok(0);
        }

        let mut dependents = 0;
        for (dependent, join_field) in dependent_links(self.meta) {
            dependents += delete_dependents(self.db, dependent, join_field, ids.clone(), 1).await?;
        }

        let mut roots = self.db.criteria(self.meta);
        roots.add_filter(self.meta.identity_field()?.name, FilterOperator::In, ids)?;
        let deleted = self
            .db
            .run_execute(&self.db.dialect().build_delete(&roots))
            .await?
            .rows_affected;

        debug!(
            "Cascade deleted {} {} rows and {} dependent rows",
            deleted,
            self.meta.table(),
            dependents
        );
        Ok(deleted)
    }

    // Load

    pub async fn load_by_id(&self, id: i64) -> ModelResult<Option<T>> {
        self.load_by_criteria(&mut self.id_criteria(id)?).await
    }

    pub async fn load_by_condition(&self, template: &str, values: Vec<DatabaseValue>) -> ModelResult<Option<T>> {
        self.load_by_criteria(&mut self.condition_criteria(template, values)?).await
    }

    /// First row matching `criteria`, with its fetched relations
    pub async fn load_by_criteria(&self, criteria: &mut Criteria) -> ModelResult<Option<T>> {
        let limits = criteria.suspend_limits();
        criteria.set_result_limit(Some(1));
        let statement = self.db.dialect().build_find(criteria);
        criteria.restore_limits(limits);

        let criteria = &*criteria;
        let found = self.read("load", self.fetch_hooked(criteria, &statement)).await?;
        Ok(found.into_iter().next())
    }

    async fn fetch_hooked(&self, criteria: &Criteria, statement: &SqlStatement) -> ModelResult<Vec<T>> {
        if let Some(hooks) = self.hooks() {
            hooks.before_load(criteria).await?;
        }

        let result = self.fetch(criteria, statement).await;

        match self.hooks() {
            Some(hooks) => {
                let after = hooks.after_load(criteria, result.is_ok()).await;
                merge_after(result, after)
            }
            None => result,
        }
    }

    async fn fetch(&self, criteria: &Criteria, statement: &SqlStatement) -> ModelResult<Vec<T>> {
        self.db
            .run_fetch(statement)
            .await?
            .iter()
            .map(|row| map_row(row, criteria.joins()))
            .collect()
    }

    // Find

    pub async fn find_all(&self) -> ModelResult<Vec<T>> {
        self.find_by_criteria(&self.criteria()).await
    }

    pub async fn find_by_condition(&self, template: &str, values: Vec<DatabaseValue>) -> ModelResult<Vec<T>> {
        self.find_by_criteria(&self.condition_criteria(template, values)?).await
    }

    /// Every row matching `criteria`, honouring its row limit or page
    pub async fn find_by_criteria(&self, criteria: &Criteria) -> ModelResult<Vec<T>> {
        let statement = self.db.dialect().build_find(criteria);
        self.read("find", self.fetch_hooked(criteria, &statement)).await
    }

    /// The current page of a paged `criteria`.
    ///
    /// The total is counted only while it is unknown, so moving between pages
    /// of the same filter set counts once.
    pub async fn find_page(&self, criteria: &mut Criteria) -> ModelResult<PagedList<T>> {
        if criteria.paging().is_none() {
            return Err(ModelError::InvalidInput("find_page needs a paged criteria".to_string()));
        }

        let find = self.db.dialect().build_find(criteria);
        let limits = criteria.suspend_limits();
        let count = self.db.dialect().build_count(criteria);
        criteria.restore_limits(limits);

        let items = self.read("find", self.fetch_hooked(criteria, &find)).await?;

        let needs_count = !items.is_empty() && criteria.paging().is_some_and(|paging| !paging.is_total_known());
        if needs_count {
            let total = self.read("count", self.fetch_count(&count)).await?;
            if let Some(paging) = criteria.paging_mut() {
                paging.set_total_rows(total);
            }
        }

        let paging = criteria
            .paging()
            .copied()
            .ok_or_else(|| ModelError::InvalidInput("find_page needs a paged criteria".to_string()))?;
        Ok(PagedList::new(items, &paging))
    }

    // Projections

    /// Values of `fields` from the first row matching `criteria`
    pub async fn get(&self, fields: &[&str], criteria: &mut Criteria) -> ModelResult<Option<Vec<DatabaseValue>>> {
        let columns = fields
            .iter()
            .map(|field| criteria.resolve_field(field))
            .collect::<ModelResult<Vec<_>>>()?;

        let limits = criteria.suspend_limits();
        criteria.set_result_limit(Some(1));
        let statement = self.db.dialect().build_get(criteria, &columns);
        criteria.restore_limits(limits);

        self.read("get", async {
            let rows = self.db.run_fetch(&statement).await?;
            Ok::<_, ModelError>(rows.into_iter().next().map(|row| row.values().to_vec()))
        })
        .await
    }

    /// Value of one field from the first row matching `criteria`; `None` when
    /// there is no row or the value is NULL
    pub async fn get_value<V: FromDatabaseValue>(&self, field: &str, criteria: &mut Criteria) -> ModelResult<Option<V>> {
        match self.get(&[field], criteria).await?.and_then(|values| values.into_iter().next()) {
            None | Some(DatabaseValue::Null) => Ok(None),
            Some(value) => value.into_typed().map(Some),
        }
    }

    // Count and exists

    pub async fn count_all(&self) -> ModelResult<u64> {
        self.count_by_criteria(&mut self.criteria()).await
    }

    pub async fn count_by_condition(&self, template: &str, values: Vec<DatabaseValue>) -> ModelResult<u64> {
        self.count_by_criteria(&mut self.condition_criteria(template, values)?).await
    }

    /// Rows matching `criteria`, ignoring its row limit and paging
    pub async fn count_by_criteria(&self, criteria: &mut Criteria) -> ModelResult<u64> {
        let limits = criteria.suspend_limits();
        let statement = self.db.dialect().build_count(criteria);
        criteria.restore_limits(limits);

        self.read("count", self.fetch_count(&statement)).await
    }

    async fn fetch_count(&self, statement: &SqlStatement) -> ModelResult<u64> {
        let rows = self.db.run_fetch(statement).await?;
        match rows.first() {
            Some(row) => row.get_by_index(0)?.into_typed(),
            None => Ok(0),
        }
    }

    pub async fn exists_any(&self) -> ModelResult<bool> {
        self.exists_by_criteria(&mut self.criteria()).await
    }

    pub async fn exists_by_id(&self, id: i64) -> ModelResult<bool> {
        self.exists_by_criteria(&mut self.id_criteria(id)?).await
    }

    pub async fn exists_by_condition(&self, template: &str, values: Vec<DatabaseValue>) -> ModelResult<bool> {
        self.exists_by_criteria(&mut self.condition_criteria(template, values)?).await
    }

    pub async fn exists_by_criteria(&self, criteria: &mut Criteria) -> ModelResult<bool> {
        let limits = criteria.suspend_limits();
        criteria.set_result_limit(Some(1));
        let statement = self.db.dialect().build_exists(criteria);
        criteria.restore_limits(limits);

        self.read("exists", async {
            let rows = self.db.run_fetch(&statement).await?;
            Ok::<_, ModelError>(!rows.is_empty())
        })
        .await
    }
}

/// Outcome of an operation after its `after_*` hook ran. A hook failure
/// replaces a success; after a failure it is only logged.
fn merge_after<R>(result: ModelResult<R>, after: ModelResult<()>) -> ModelResult<R> {
    match (result, after) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(hook_error)) => Err(hook_error),
        (Err(e), Ok(())) => Err(e),
        (Err(e), Err(hook_error)) => {
            warn!("Ignoring after-hook failure after error: {}", hook_error);
            Err(e)
        }
    }
}

/// Dependent entity types of `meta` with the field each joins through
fn dependent_links(meta: &'static EntityMeta) -> Vec<(&'static EntityMeta, &'static str)> {
    meta.dependents()
        .flat_map(|dependent| {
            dependent
                .relations_to(meta)
                .map(move |relation| (dependent, relation.join_field))
        })
        .collect()
}

fn select_ids_statement(db: &Database, criteria: &Criteria) -> ModelResult<SqlStatement> {
    let identity = criteria.meta().identity_field()?;
    let column = format!("{}.{}", MAIN_TABLE_ALIAS, identity.column);
    Ok(db.dialect().build_get(criteria, &[column]))
}

async fn fetch_ids(db: &Database, select: &SqlStatement) -> ModelResult<Vec<i64>> {
    db.run_fetch(select)
        .await?
        .iter()
        .map(|row| row.get_by_index(0)?.into_typed())
        .collect()
}

/// Delete the rows of `meta` whose `join_field` points at one of
/// `parent_ids`, after recursively deleting their own dependents
fn delete_dependents<'a>(
    db: &'a Database,
    meta: &'static EntityMeta,
    join_field: &'static str,
    parent_ids: Vec<i64>,
    depth: usize,
) -> Pin<Box<dyn Future<Output = ModelResult<u64>> + Send + 'a>> {
    Box::pin(async move {
        if parent_ids.is_empty() {
            return Ok(0);
        }
        if depth > db.config().join_max_depth {
            return Err(ModelError::Configuration(format!(
                "Cascade from '{}' exceeds the maximum depth of {}",
                meta.table(),
                db.config().join_max_depth
            )));
        }

        let mut criteria = db.criteria(meta);
        criteria.add_filter(join_field, FilterOperator::In, parent_ids)?;

        let select = select_ids_statement(db, &criteria)?;
        let ids = fetch_ids(db, &select).await?;

        let mut deleted = 0;
        for (dependent, dependent_field) in dependent_links(meta) {
            deleted += delete_dependents(db, dependent, dependent_field, ids.clone(), depth + 1).await?;
        }

        deleted += db
            .run_execute(&db.dialect().build_delete(&criteria))
            .await?
            .rows_affected;
        Ok(deleted)
    })
}
