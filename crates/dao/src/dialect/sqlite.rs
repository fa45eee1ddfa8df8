//! SQLite dialect
//!
//! SQLite has no multi-table UPDATE or DELETE, so writes that need joins,
//! conditions or limits select the affected rows by `rowid` in a subquery
//! that carries the full clause set.

use super::{update_params, SqlDialect, SqlStatement};
use crate::backends::DatabaseBackendType;
use crate::config::MAIN_TABLE_ALIAS;
use crate::criteria::Criteria;
use crate::model::BoundField;
use crate::paging::Paging;

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl SqliteDialect {
    /// ` WHERE rowid IN (SELECT t_main.rowid ...)`, or nothing when the
    /// criteria matches every row
    fn rowid_restriction(&self, criteria: &Criteria) -> String {
        if self.add_clauses(criteria, false).is_empty() {
            return String::new();
        }
        format!(
            " WHERE rowid IN (SELECT {}.rowid FROM {}{})",
            MAIN_TABLE_ALIAS,
            self.root_table(criteria),
            self.add_clauses(criteria, true)
        )
    }
}

impl SqlDialect for SqliteDialect {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::Sqlite
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        format!("\"{}\"", identifier.replace('"', "\"\""))
    }

    fn paging_clause(&self, paging: &Paging) -> String {
        format!(" LIMIT {} OFFSET {}", paging.page_size(), paging.start_index())
    }

    fn empty_insert(&self, table: &str) -> String {
        format!("INSERT INTO {} DEFAULT VALUES", self.quote_identifier(table))
    }

    fn build_update(&self, criteria: &Criteria, fields: &[BoundField]) -> SqlStatement {
        let assignments: Vec<String> = fields
            .iter()
            .map(|field| format!("{} = ?", self.quote_identifier(field.column())))
            .collect();

        SqlStatement::with_params(
            format!(
                "UPDATE {} SET {}{}",
                self.quote_identifier(criteria.table()),
                assignments.join(", "),
                self.rowid_restriction(criteria)
            ),
            update_params(fields, criteria),
        )
    }

    fn build_delete(&self, criteria: &Criteria) -> SqlStatement {
        SqlStatement::with_params(
            format!(
                "DELETE FROM {}{}",
                self.quote_identifier(criteria.table()),
                self.rowid_restriction(criteria)
            ),
            criteria.values().to_vec(),
        )
    }
}
