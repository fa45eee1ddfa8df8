//! SQL compilation
//!
//! A dialect turns a `Criteria` (and, for writes, a list of bound fields)
//! into SQL text with `?` placeholders plus the matching parameter list.
//! Compilation is pure: the same criteria always compiles to the same text
//! and parameters.

pub mod mysql;
pub mod sqlite;

use std::fmt;

use crate::backends::{DatabaseBackendType, DatabaseValue};
use crate::config::MAIN_TABLE_ALIAS;
use crate::criteria::Criteria;
use crate::model::BoundField;
use crate::paging::Paging;

pub use mysql::MySqlDialect;
pub use sqlite::SqliteDialect;

/// SQL text and its positional parameters
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<DatabaseValue>,
}

impl SqlStatement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<DatabaseValue>) -> Self {
        Self { sql: sql.into(), params }
    }

    /// Append a fragment of SQL text
    pub fn append(mut self, fragment: &str) -> Self {
        self.sql.push_str(fragment);
        self
    }

    /// Bind the next positional parameter
    pub fn bind(mut self, value: impl Into<DatabaseValue>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[DatabaseValue] {
        &self.params
    }
}

impl fmt::Display for SqlStatement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Dialect-specific SQL generation.
///
/// Backends differ in identifier quoting, paging syntax and the shape of
/// UPDATE and DELETE statements that involve joins. Everything else is
/// shared through the provided methods.
pub trait SqlDialect: Send + Sync + fmt::Debug {
    fn backend_type(&self) -> DatabaseBackendType;

    fn quote_identifier(&self, identifier: &str) -> String;

    /// Clause selecting the current page, with a leading space
    fn paging_clause(&self, paging: &Paging) -> String;

    /// Statement inserting a row made only of column defaults
    fn empty_insert(&self, table: &str) -> String;

    fn build_update(&self, criteria: &Criteria, fields: &[BoundField]) -> SqlStatement;

    fn build_delete(&self, criteria: &Criteria) -> SqlStatement;

    fn limit_clause(&self, limit: u64) -> String {
        format!(" LIMIT {}", limit)
    }

    /// `alias.column AS "alias.column"`, the projection every find uses
    fn labeled_column(&self, alias: &str, column: &str) -> String {
        let qualified = format!("{}.{}", alias, column);
        format!("{} AS {}", qualified, self.quote_identifier(&qualified))
    }

    /// `"table" t_main`
    fn root_table(&self, criteria: &Criteria) -> String {
        format!("{} {}", self.quote_identifier(criteria.table()), MAIN_TABLE_ALIAS)
    }

    /// One LEFT JOIN per registered fetch, in identifier order
    fn join_clauses(&self, criteria: &Criteria) -> String {
        criteria
            .joins()
            .descriptors()
            .map(|join| {
                format!(
                    " LEFT JOIN {} {} ON {}.{} = {}.{}",
                    self.quote_identifier(join.table()),
                    join.alias(),
                    join.alias(),
                    join.id_column(),
                    join.base_alias(),
                    join.base_column()
                )
            })
            .collect()
    }

    /// Trailing clauses of a statement in fixed order: joins (when
    /// `with_joins`), WHERE, GROUP BY, ORDER BY, then paging or a row limit
    fn add_clauses(&self, criteria: &Criteria, with_joins: bool) -> String {
        let mut clauses = Vec::new();

        if with_joins {
            let joins = self.join_clauses(criteria);
            if !joins.is_empty() {
                clauses.push(joins);
            }
        }

        if let Some(conditions) = criteria.where_sql() {
            clauses.push(format!(" WHERE {}", conditions));
        }

        if !criteria.groupings().is_empty() {
            clauses.push(format!(" GROUP BY {}", criteria.groupings().join(", ")));
        }

        if !criteria.orders().is_empty() {
            clauses.push(format!(" ORDER BY {}", criteria.orders().join(", ")));
        }

        match (criteria.paging().filter(|paging| paging.is_enabled()), criteria.result_limit()) {
            (Some(paging), _) => clauses.push(self.paging_clause(paging)),
            (None, Some(limit)) => clauses.push(self.limit_clause(limit)),
            (None, None) => {}
        }

        clauses.concat()
    }

    fn build_insert(&self, table: &str, fields: &[BoundField]) -> SqlStatement {
        if fields.is_empty() {
            return SqlStatement::new(self.empty_insert(table));
        }

        let columns: Vec<String> = fields
            .iter()
            .map(|field| self.quote_identifier(field.column()))
            .collect();
        let placeholders = vec!["?"; fields.len()].join(", ");

        SqlStatement::with_params(
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                self.quote_identifier(table),
                columns.join(", "),
                placeholders
            ),
            fields.iter().map(|field| field.value.clone()).collect(),
        )
    }

    /// SELECT of every column of the root entity and of each fetched relation
    fn build_find(&self, criteria: &Criteria) -> SqlStatement {
        let mut columns: Vec<String> = criteria
            .meta()
            .fields()
            .iter()
            .map(|field| self.labeled_column(MAIN_TABLE_ALIAS, field.column))
            .collect();

        for join in criteria.joins().descriptors() {
            columns.extend(
                join.target()
                    .fields()
                    .iter()
                    .map(|field| self.labeled_column(join.alias(), field.column)),
            );
        }

        SqlStatement::with_params(
            format!(
                "SELECT {} FROM {}{}",
                columns.join(", "),
                self.root_table(criteria),
                self.add_clauses(criteria, true)
            ),
            criteria.values().to_vec(),
        )
    }

    /// SELECT of the given resolved column expressions
    fn build_get(&self, criteria: &Criteria, columns: &[String]) -> SqlStatement {
        SqlStatement::with_params(
            format!(
                "SELECT {} FROM {}{}",
                columns.join(", "),
                self.root_table(criteria),
                self.add_clauses(criteria, true)
            ),
            criteria.values().to_vec(),
        )
    }

    fn build_count(&self, criteria: &Criteria) -> SqlStatement {
        SqlStatement::with_params(
            format!(
                "SELECT COUNT(1) FROM {}{}",
                self.root_table(criteria),
                self.add_clauses(criteria, true)
            ),
            criteria.values().to_vec(),
        )
    }

    fn build_exists(&self, criteria: &Criteria) -> SqlStatement {
        SqlStatement::with_params(
            format!(
                "SELECT 1 FROM {}{}",
                self.root_table(criteria),
                self.add_clauses(criteria, true)
            ),
            criteria.values().to_vec(),
        )
    }
}

/// Field values followed by criteria values, the parameter order of UPDATE
pub(crate) fn update_params(fields: &[BoundField], criteria: &Criteria) -> Vec<DatabaseValue> {
    fields
        .iter()
        .map(|field| field.value.clone())
        .chain(criteria.values().iter().cloned())
        .collect()
}
