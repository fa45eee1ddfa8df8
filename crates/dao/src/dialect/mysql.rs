//! MySQL dialect

use super::{update_params, SqlDialect, SqlStatement};
use crate::backends::DatabaseBackendType;
use crate::config::MAIN_TABLE_ALIAS;
use crate::criteria::Criteria;
use crate::model::BoundField;
use crate::paging::Paging;

/// Backtick quoting, `LIMIT offset, size` paging and multi-table
/// UPDATE/DELETE through the root alias
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl SqlDialect for MySqlDialect {
    fn backend_type(&self) -> DatabaseBackendType {
        DatabaseBackendType::MySql
    }

    fn quote_identifier(&self, identifier: &str) -> String {
        format!("`{}`", identifier.replace('`', "``"))
    }

    fn paging_clause(&self, paging: &Paging) -> String {
        format!(" LIMIT {}, {}", paging.start_index(), paging.page_size())
    }

    fn empty_insert(&self, table: &str) -> String {
        format!("INSERT INTO {} () VALUES ()", self.quote_identifier(table))
    }

    fn build_update(&self, criteria: &Criteria, fields: &[BoundField]) -> SqlStatement {
        let assignments: Vec<String> = fields
            .iter()
            .map(|field| format!("{}.{} = ?", MAIN_TABLE_ALIAS, field.column()))
            .collect();

        SqlStatement::with_params(
            format!(
                "UPDATE {}{} SET {}{}",
                self.root_table(criteria),
                self.join_clauses(criteria),
                assignments.join(", "),
                self.add_clauses(criteria, false)
            ),
            update_params(fields, criteria),
        )
    }

    fn build_delete(&self, criteria: &Criteria) -> SqlStatement {
        SqlStatement::with_params(
            format!(
                "DELETE {} FROM {}{}",
                MAIN_TABLE_ALIAS,
                self.root_table(criteria),
                self.add_clauses(criteria, true)
            ),
            criteria.values().to_vec(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::DatabaseValue;
    use crate::criteria::{FilterOperator, LogicalOperator, OrderDirection};
    use crate::model::{Entity, FieldKind, FieldMeta};
    use crate::testing::{Client, Order};

    fn bound(name: &'static str, value: impl Into<DatabaseValue>) -> BoundField {
        BoundField::new(
            FieldMeta {
                name,
                column: name,
                kind: FieldKind::Text,
                identity: false,
            },
            value.into(),
        )
    }

    fn acme_with_address() -> Criteria {
        let mut criteria = Criteria::for_entity::<Client>();
        criteria.add_fetch("address").unwrap();
        criteria.add_filter("name", FilterOperator::Equal, "Acme").unwrap();
        criteria
    }

    #[test]
    fn test_find_with_fetch_and_filter() {
        let statement = MySqlDialect.build_find(&acme_with_address());

        assert_eq!(
            statement.sql,
            "SELECT t_main.id AS `t_main.id`, t_main.name AS `t_main.name`, t_main.age AS `t_main.age`, \
             t_main.active AS `t_main.active`, t_main.address_id AS `t_main.address_id`, \
             t_main.referrer_id AS `t_main.referrer_id`, t_1.id AS `t_1.id`, t_1.street AS `t_1.street`, \
             t_1.city_id AS `t_1.city_id` \
             FROM `client` t_main LEFT JOIN `address` t_1 ON t_1.id = t_main.address_id \
             WHERE t_main.name = ?"
        );
        assert_eq!(statement.params, vec![DatabaseValue::String("Acme".into())]);
    }

    #[test]
    fn test_compilation_is_deterministic() {
        let mut criteria = acme_with_address();
        criteria.add_fetch("referrer.address").unwrap();
        criteria
            .add_condition(LogicalOperator::Or, "@referrer.age > ?", vec![18.into()])
            .unwrap();

        let first = MySqlDialect.build_find(&criteria);
        let second = MySqlDialect.build_find(&criteria);
        assert_eq!(first, second);
        assert_eq!(MySqlDialect.build_count(&criteria), MySqlDialect.build_count(&criteria));
    }

    #[test]
    fn test_second_page_of_ten() {
        let mut criteria = Criteria::paged(Client::meta(), 10).unwrap();
        criteria.set_page(2).unwrap();
        criteria.add_order("name", OrderDirection::Asc).unwrap();

        let sql = MySqlDialect.build_find(&criteria).sql;
        assert!(sql.ends_with(" FROM `client` t_main ORDER BY t_main.name ASC LIMIT 10, 10"), "{}", sql);
    }

    #[test]
    fn test_paging_takes_precedence_over_limit() {
        let mut criteria = Criteria::paged(Client::meta(), 5).unwrap();
        criteria.set_result_limit(Some(1));
        assert_eq!(MySqlDialect.add_clauses(&criteria, true), " LIMIT 0, 5");

        criteria.paging_mut().unwrap().set_enabled(false);
        assert_eq!(MySqlDialect.add_clauses(&criteria, true), " LIMIT 1");
    }

    #[test]
    fn test_clause_order() {
        let mut criteria = Criteria::for_entity::<Order>();
        criteria.add_filter("client.age", FilterOperator::GreaterThan, 18).unwrap();
        criteria.add_grouping("status").unwrap();
        criteria.add_order("status", OrderDirection::Desc).unwrap();
        criteria.set_result_limit(Some(3));

        assert_eq!(
            MySqlDialect.build_get(&criteria, &["t_main.status".into(), "COUNT(1)".into()]).sql,
            "SELECT t_main.status, COUNT(1) FROM `orders` t_main \
             LEFT JOIN `client` t_1 ON t_1.id = t_main.client_id \
             WHERE t_1.age > ? GROUP BY t_main.status ORDER BY t_main.status DESC LIMIT 3"
        );
    }

    #[test]
    fn test_insert() {
        let statement = MySqlDialect.build_insert("client", &[bound("name", "Acme"), bound("age", 40)]);
        assert_eq!(statement.sql, "INSERT INTO `client` (`name`, `age`) VALUES (?, ?)");
        assert_eq!(statement.params.len(), 2);

        assert_eq!(MySqlDialect.build_insert("client", &[]).sql, "INSERT INTO `client` () VALUES ()");
    }

    #[test]
    fn test_update_with_join() {
        let mut criteria = Criteria::for_entity::<Order>();
        criteria.add_filter("client.name", FilterOperator::Equal, "Acme").unwrap();

        let statement = MySqlDialect.build_update(&criteria, &[bound("status", 3)]);
        assert_eq!(
            statement.sql,
            "UPDATE `orders` t_main LEFT JOIN `client` t_1 ON t_1.id = t_main.client_id \
             SET t_main.status = ? WHERE t_1.name = ?"
        );
        assert_eq!(
            statement.params,
            vec![DatabaseValue::Int32(3), DatabaseValue::String("Acme".into())]
        );
    }

    #[test]
    fn test_delete() {
        let mut criteria = Criteria::for_entity::<Order>();
        criteria.add_filter("id", FilterOperator::In, vec![1i64, 2, 3]).unwrap();

        let statement = MySqlDialect.build_delete(&criteria);
        assert_eq!(statement.sql, "DELETE t_main FROM `orders` t_main WHERE t_main.id IN (?, ?, ?)");
        assert_eq!(statement.params.len(), 3);
    }

    #[test]
    fn test_writes_from_row_selection_drop_order_and_limit() {
        let mut criteria = Criteria::paged(Order::meta(), 5).unwrap();
        criteria
            .add_filter("client.name", FilterOperator::Equal, "Acme")
            .unwrap()
            .add_order("total", OrderDirection::Desc)
            .unwrap();
        let selection = criteria.row_selection();

        assert_eq!(
            MySqlDialect.build_delete(&selection).sql,
            "DELETE t_main FROM `orders` t_main LEFT JOIN `client` t_1 ON t_1.id = t_main.client_id \
             WHERE t_1.name = ?"
        );
        assert_eq!(
            MySqlDialect.build_update(&selection, &[bound("status", 0)]).sql,
            "UPDATE `orders` t_main LEFT JOIN `client` t_1 ON t_1.id = t_main.client_id \
             SET t_main.status = ? WHERE t_1.name = ?"
        );
    }

    #[test]
    fn test_count_and_exists() {
        let criteria = Criteria::for_entity::<Client>();
        assert_eq!(MySqlDialect.build_count(&criteria).sql, "SELECT COUNT(1) FROM `client` t_main");
        assert_eq!(MySqlDialect.build_exists(&criteria).sql, "SELECT 1 FROM `client` t_main");
    }

    #[test]
    fn test_quote_identifier_escapes_backticks() {
        assert_eq!(MySqlDialect.quote_identifier("odd`name"), "`odd``name`");
    }
}
