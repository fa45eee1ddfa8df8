//! Criteria Model
//!
//! A `Criteria` accumulates filters, free-form conditions, orderings,
//! groupings, a row limit, relationship fetches and an optional page window
//! for one root entity type. Field references are resolved to aliased column
//! expressions as soon as they are added, so every join a condition needs is
//! registered before the criteria reaches a dialect.

pub mod join;
pub mod types;

use crate::backends::DatabaseValue;
use crate::config::{OrmConfig, FROM_TOKEN, MAIN_TABLE_ALIAS};
use crate::error::{ModelError, ModelResult};
use crate::model::{Entity, EntityMeta};
use crate::paging::Paging;

pub use join::{JoinDescriptor, JoinRegistry};
pub use types::{Condition, FilterOperator, LogicalOperator, OrderDirection};

use types::{count_placeholders, scan_template};

/// Query description scoped to one root entity type
#[derive(Debug, Clone)]
pub struct Criteria {
    meta: &'static EntityMeta,
    join_max_depth: usize,
    marker: char,
    conditions: Vec<Condition>,
    values: Vec<DatabaseValue>,
    orders: Vec<String>,
    groupings: Vec<String>,
    result_limit: Option<u64>,
    joins: JoinRegistry,
    paging: Option<Paging>,
}

/// Row limit and paging switch saved by `Criteria::suspend_limits`
#[derive(Debug, Clone, Copy)]
pub struct LimitState {
    result_limit: Option<u64>,
    paging_enabled: Option<bool>,
}

impl Criteria {
    pub fn new(meta: &'static EntityMeta) -> Self {
        Self::with_config(meta, &OrmConfig::default())
    }

    pub fn with_config(meta: &'static EntityMeta, config: &OrmConfig) -> Self {
        Self {
            meta,
            join_max_depth: config.join_max_depth,
            marker: config.condition_marker,
            conditions: Vec::new(),
            values: Vec::new(),
            orders: Vec::new(),
            groupings: Vec::new(),
            result_limit: None,
            joins: JoinRegistry::new(),
            paging: None,
        }
    }

    pub fn for_entity<T: Entity>() -> Self {
        Self::new(T::meta())
    }

    /// Criteria returning one page of `page_size` rows, starting on page 1
    pub fn paged(meta: &'static EntityMeta, page_size: u64) -> ModelResult<Self> {
        let mut criteria = Self::new(meta);
        criteria.paging = Some(Paging::new(page_size)?);
        Ok(criteria)
    }

    pub fn meta(&self) -> &'static EntityMeta {
        self.meta
    }

    pub fn table(&self) -> &'static str {
        self.meta.table()
    }

    // Filters and conditions

    /// AND a `field operator ?` condition
    pub fn add_filter(
        &mut self,
        field: &str,
        operator: FilterOperator,
        value: impl Into<DatabaseValue>,
    ) -> ModelResult<&mut Self> {
        self.add_filter_with(LogicalOperator::And, field, operator, value)
    }

    /// OR a `field operator ?` condition
    pub fn or_filter(
        &mut self,
        field: &str,
        operator: FilterOperator,
        value: impl Into<DatabaseValue>,
    ) -> ModelResult<&mut Self> {
        self.add_filter_with(LogicalOperator::Or, field, operator, value)
    }

    pub fn add_filter_with(
        &mut self,
        logical: LogicalOperator,
        field: &str,
        operator: FilterOperator,
        value: impl Into<DatabaseValue>,
    ) -> ModelResult<&mut Self> {
        let values = match (operator, value.into()) {
            (_, value) if value.is_null() => {
                return Err(ModelError::InvalidInput("Value cannot be null.".to_string()));
            }
            (FilterOperator::In, DatabaseValue::Array(items)) => {
                if items.is_empty() {
                    return Err(ModelError::InvalidInput(format!(
                        "IN filter on '{}' needs at least one value",
                        field
                    )));
                }
                if items.iter().any(|item| item.is_null() || matches!(item, DatabaseValue::Array(_))) {
                    return Err(ModelError::InvalidInput(format!(
                        "IN filter on '{}' accepts only non-null scalar values",
                        field
                    )));
                }
                items
            }
            (_, DatabaseValue::Array(_)) => {
                return Err(ModelError::InvalidInput(format!(
                    "Only the IN operator accepts a list of values (field '{}')",
                    field
                )));
            }
            (_, scalar) => vec![scalar],
        };

        let column = self.resolve_field(field)?;
        let sql = match operator {
            FilterOperator::In => format!("{} IN ({})", column, vec!["?"; values.len()].join(", ")),
            operator => format!("{} {} ?", column, operator),
        };

        self.push_condition(logical, sql, values);
        Ok(self)
    }

    /// Add a raw condition template.
    ///
    /// `@field` and `@relation.field` tokens are replaced by aliased column
    /// expressions, `@from` by the root alias. `values` bind the template's
    /// `?` placeholders in order.
    pub fn add_condition(
        &mut self,
        logical: LogicalOperator,
        template: &str,
        values: Vec<DatabaseValue>,
    ) -> ModelResult<&mut Self> {
        if template.trim().is_empty() {
            return Err(ModelError::InvalidInput("Condition cannot be null.".to_string()));
        }

        if values
            .iter()
            .any(|value| value.is_null() || matches!(value, DatabaseValue::Array(_)))
        {
            return Err(ModelError::InvalidInput(
                "Condition values must be non-null scalars.".to_string(),
            ));
        }

        let sql = self.keeping_joins_on_success(|criteria| {
            let sql = criteria.resolve_template(template)?;
            let placeholders = count_placeholders(&sql);
            if placeholders != values.len() {
                return Err(ModelError::InvalidInput(format!(
                    "Condition '{}' has {} placeholders but {} values",
                    template,
                    placeholders,
                    values.len()
                )));
            }
            Ok(sql)
        })?;

        self.push_condition(logical, format!("({})", sql), values);
        Ok(self)
    }

    /// AND a raw condition template
    pub fn condition(&mut self, template: &str, values: Vec<DatabaseValue>) -> ModelResult<&mut Self> {
        self.add_condition(LogicalOperator::And, template, values)
    }

    fn push_condition(&mut self, connector: LogicalOperator, sql: String, values: Vec<DatabaseValue>) {
        self.conditions.push(Condition { connector, sql });
        self.values.extend(values);
        if let Some(paging) = self.paging.as_mut() {
            paging.reset_total();
        }
    }

    // Orderings, groupings and fetches

    pub fn add_order(&mut self, field: &str, direction: OrderDirection) -> ModelResult<&mut Self> {
        let column = self.resolve_field(field)?;
        self.orders.push(format!("{} {}", column, direction));
        Ok(self)
    }

    pub fn add_grouping(&mut self, field: &str) -> ModelResult<&mut Self> {
        let column = self.resolve_field(field)?;
        self.groupings.push(column);
        Ok(self)
    }

    /// Fetch the relationship at a dot-joined `path`, e.g. `client.address`
    pub fn add_fetch(&mut self, path: &str) -> ModelResult<&mut Self> {
        let segments: Vec<&str> = path.split('.').collect();
        self.add_fetch_path(&segments)
    }

    pub fn add_fetch_path(&mut self, path: &[&str]) -> ModelResult<&mut Self> {
        self.keeping_joins_on_success(|criteria| {
            criteria
                .joins
                .resolve(criteria.meta, path, criteria.join_max_depth)
                .map(|_| ())
        })?;
        Ok(self)
    }

    /// Fetch every path in `paths`, or none of them when one is invalid
    pub fn add_fetches(&mut self, paths: &[&str]) -> ModelResult<&mut Self> {
        self.keeping_joins_on_success(|criteria| {
            for path in paths {
                criteria.add_fetch(path)?;
            }
            Ok(())
        })?;
        Ok(self)
    }

    pub fn set_result_limit(&mut self, limit: Option<u64>) -> &mut Self {
        self.result_limit = limit;
        self
    }

    // Paging

    pub fn set_paging(&mut self, paging: Paging) -> &mut Self {
        self.paging = Some(paging);
        self
    }

    /// Move a paged criteria to `page`
    pub fn set_page(&mut self, page: u64) -> ModelResult<&mut Self> {
        let paging = self
            .paging
            .as_mut()
            .ok_or_else(|| ModelError::InvalidInput("Criteria is not paged".to_string()))?;
        paging.set_page(page)?;
        Ok(self)
    }

    pub fn paging(&self) -> Option<&Paging> {
        self.paging.as_ref()
    }

    pub fn paging_mut(&mut self) -> Option<&mut Paging> {
        self.paging.as_mut()
    }

    pub fn is_paging_enabled(&self) -> bool {
        self.paging.map(|paging| paging.is_enabled()).unwrap_or(false)
    }

    /// Drop the row limit and disable paging, returning what was there
    pub fn suspend_limits(&mut self) -> LimitState {
        let state = LimitState {
            result_limit: self.result_limit.take(),
            paging_enabled: self.paging.map(|paging| paging.is_enabled()),
        };
        if let Some(paging) = self.paging.as_mut() {
            paging.set_enabled(false);
        }
        state
    }

    pub fn restore_limits(&mut self, state: LimitState) {
        self.result_limit = state.result_limit;
        if let (Some(paging), Some(enabled)) = (self.paging.as_mut(), state.paging_enabled) {
            paging.set_enabled(enabled);
        }
    }

    // Clearing

    pub fn clear_conditions(&mut self) -> &mut Self {
        self.conditions.clear();
        self.values.clear();
        if let Some(paging) = self.paging.as_mut() {
            paging.reset_total();
        }
        self
    }

    pub fn clear_orders(&mut self) -> &mut Self {
        self.orders.clear();
        self
    }

    pub fn clear_groupings(&mut self) -> &mut Self {
        self.groupings.clear();
        self
    }

    /// Forget every fetch. Conditions that referenced joined columns must be
    /// cleared too.
    pub fn clear_fetches(&mut self) -> &mut Self {
        self.joins.clear();
        self
    }

    /// Copy keeping only what selects rows: conditions and joins. Writes
    /// compile from this, since multi-table UPDATE and DELETE take no
    /// ORDER BY, GROUP BY or LIMIT.
    pub fn row_selection(&self) -> Criteria {
        Criteria {
            orders: Vec::new(),
            groupings: Vec::new(),
            result_limit: None,
            paging: None,
            ..self.clone()
        }
    }

    pub fn clear_result_limit(&mut self) -> &mut Self {
        self.result_limit = None;
        self
    }

    pub fn clear_paging(&mut self) -> &mut Self {
        self.paging = None;
        self
    }

    pub fn clear(&mut self) -> &mut Self {
        self.clear_conditions()
            .clear_orders()
            .clear_groupings()
            .clear_fetches()
            .clear_result_limit()
    }

    // Resolution

    /// Resolve `name` or `relation.path.name` to an aliased column expression,
    /// registering the joins the path needs
    pub fn resolve_field(&mut self, name: &str) -> ModelResult<String> {
        self.keeping_joins_on_success(|criteria| criteria.resolve_path(name))
    }

    fn resolve_path(&mut self, name: &str) -> ModelResult<String> {
        match name.rsplit_once('.') {
            Some((path, field)) => {
                let segments: Vec<&str> = path.split('.').collect();
                let join = self.joins.resolve(self.meta, &segments, self.join_max_depth)?;
                let column = join.target().column_name(field)?;
                Ok(format!("{}.{}", join.alias(), column))
            }
            None => Ok(format!("{}.{}", MAIN_TABLE_ALIAS, self.meta.column_name(name)?)),
        }
    }

    fn resolve_template(&mut self, template: &str) -> ModelResult<String> {
        let marker = self.marker;
        scan_template(template, marker, |token| {
            if token == FROM_TOKEN {
                return Ok(MAIN_TABLE_ALIAS.to_string());
            }
            if let Some(column) = token.strip_prefix(FROM_TOKEN).and_then(|rest| rest.strip_prefix('.')) {
                return Ok(format!("{}.{}", MAIN_TABLE_ALIAS, column));
            }
            self.resolve_path(token)
        })
    }

    /// Run `apply`, putting the registered joins back as they were when it fails
    fn keeping_joins_on_success<R>(&mut self, apply: impl FnOnce(&mut Self) -> ModelResult<R>) -> ModelResult<R> {
        let saved = self.joins.clone();
        let result = apply(self);
        if result.is_err() {
            self.joins = saved;
        }
        result
    }

    // Accessors used by dialects

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    pub fn has_conditions(&self) -> bool {
        !self.conditions.is_empty()
    }

    /// Conditions joined with their connectors, `None` when there are none
    pub fn where_sql(&self) -> Option<String> {
        let mut conditions = self.conditions.iter();
        let first = conditions.next()?;
        let mut sql = first.sql.clone();
        for condition in conditions {
            sql.push(' ');
            sql.push_str(&condition.connector.to_string());
            sql.push(' ');
            sql.push_str(&condition.sql);
        }
        Some(sql)
    }

    /// Parameters of every condition, in placeholder order
    pub fn values(&self) -> &[DatabaseValue] {
        &self.values
    }

    pub fn orders(&self) -> &[String] {
        &self.orders
    }

    pub fn groupings(&self) -> &[String] {
        &self.groupings
    }

    pub fn result_limit(&self) -> Option<u64> {
        self.result_limit
    }

    pub fn joins(&self) -> &JoinRegistry {
        &self.joins
    }

    /// Registered joins, sorted by identifier
    pub fn join_descriptors(&self) -> Vec<&JoinDescriptor> {
        self.joins.descriptors().collect()
    }
}
