//! Row mapping
//!
//! A find projects every column as `alias.column`, so one row carries the
//! root entity under `t_main` and each fetched relation under its join
//! alias. The mapper builds one instance per alias and wires them into a
//! graph following the fetch tree.

use std::collections::BTreeMap;

use super::entity::{Entity, IntoAny};
use super::metadata::EntityMeta;
use crate::backends::{DataRow, DatabaseRow, DatabaseValue};
use crate::config::MAIN_TABLE_ALIAS;
use crate::criteria::JoinRegistry;
use crate::error::{ModelError, ModelResult};

/// Build a `T` and its fetched relations from one row of a find.
///
/// A join whose identity column is NULL produced no match and is skipped,
/// along with everything fetched through it.
pub fn map_row<T: Entity + Default>(row: &DataRow, joins: &JoinRegistry) -> ModelResult<T> {
    let mut root = T::default();
    populate(&mut root, T::meta(), row, Some(MAIN_TABLE_ALIAS))?;

    let mut related: BTreeMap<&str, Box<dyn Entity>> = BTreeMap::new();
    for join in joins.descriptors() {
        let mut instance = join.target().construct();
        populate(instance.as_mut(), join.target(), row, Some(join.alias()))?;
        if instance.id().is_some() {
            related.insert(join.identifier(), instance);
        }
    }

    // Deeper joins sort after their base, so walking backwards attaches every
    // child before its base is itself attached.
    for join in joins.descriptors().collect::<Vec<_>>().into_iter().rev() {
        let Some(instance) = related.remove(join.identifier()) else {
            continue;
        };
        match join.base() {
            None => root.attach(join.relation(), IntoAny::into_any(instance))?,
            Some(base) => {
                if let Some(owner) = related.get_mut(base) {
                    owner.attach(join.relation(), IntoAny::into_any(instance))?;
                }
            }
        }
    }

    Ok(root)
}

/// Copy the columns of `meta` found in `row` into `entity`.
///
/// Columns are looked up as `alias.column` when an alias is given. Missing
/// columns and NULL values leave the field at its current value.
pub fn populate(
    entity: &mut dyn Entity,
    meta: &EntityMeta,
    row: &DataRow,
    alias: Option<&str>,
) -> ModelResult<()> {
    for field in meta.fields() {
        let column = match alias {
            Some(alias) => format!("{}.{}", alias, field.column),
            None => field.column.to_string(),
        };

        let value = match row.get_by_name(&column) {
            Ok(DatabaseValue::Null) => continue,
            Ok(value) => value,
            Err(ModelError::InvalidField { .. }) => continue,
            Err(e) => return Err(e),
        };

        entity.set_value(field.name, value.coerce(field.kind))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::criteria::Criteria;
    use crate::testing::{Address, City, Client, Order};

    fn row(columns: &[(&str, DatabaseValue)]) -> DataRow {
        DataRow::new(
            columns.iter().map(|(name, _)| name.to_string()).collect(),
            columns.iter().map(|(_, value)| value.clone()).collect(),
        )
    }

    #[test]
    fn test_maps_root_columns() {
        let criteria = Criteria::for_entity::<Client>();
        let row = row(&[
            ("t_main.id", DatabaseValue::Int64(4)),
            ("t_main.name", DatabaseValue::String("Acme".into())),
            ("t_main.age", DatabaseValue::Int64(31)),
            ("t_main.active", DatabaseValue::Int64(1)),
            ("t_main.address_id", DatabaseValue::Null),
        ]);

        let client: Client = map_row(&row, criteria.joins()).unwrap();
        assert_eq!(client.id, Some(4));
        assert_eq!(client.name, "Acme");
        assert_eq!(client.age, 31);
        assert!(client.active);
        assert_eq!(client.address_id, None);
        assert!(client.address.is_none());
    }

    #[test]
    fn test_nested_fetch_builds_graph() {
        let mut criteria = Criteria::for_entity::<Order>();
        criteria.add_fetch("client.address.city").unwrap();

        let row = row(&[
            ("t_main.id", DatabaseValue::Int64(1)),
            ("t_main.status", DatabaseValue::Int64(2)),
            ("t_main.total", DatabaseValue::Float64(9.5)),
            ("t_main.client_id", DatabaseValue::Int64(7)),
            ("t_1.id", DatabaseValue::Int64(7)),
            ("t_1.name", DatabaseValue::String("Acme".into())),
            ("t_1.address_id", DatabaseValue::Int64(3)),
            ("t_1_1.id", DatabaseValue::Int64(3)),
            ("t_1_1.street", DatabaseValue::String("Main St".into())),
            ("t_1_1.city_id", DatabaseValue::Int64(11)),
            ("t_1_1_1.id", DatabaseValue::Int64(11)),
            ("t_1_1_1.name", DatabaseValue::String("Lisbon".into())),
        ]);

        let order: Order = map_row(&row, criteria.joins()).unwrap();
        let client = order.client.expect("client fetched");
        assert_eq!(client.name, "Acme");
        let address = client.address.expect("address fetched");
        assert_eq!(address.street, "Main St");
        assert_eq!(
            address.city,
            Some(City {
                id: Some(11),
                name: "Lisbon".into()
            })
        );
    }

    #[test]
    fn test_unmatched_join_is_skipped() {
        let mut criteria = Criteria::for_entity::<Client>();
        criteria.add_fetches(&["address", "referrer"]).unwrap();

        let row = row(&[
            ("t_main.id", DatabaseValue::Int64(2)),
            ("t_main.name", DatabaseValue::String("Beta".into())),
            ("t_1.id", DatabaseValue::Null),
            ("t_1.street", DatabaseValue::Null),
            ("t_2.id", DatabaseValue::Int64(1)),
            ("t_2.name", DatabaseValue::String("Alpha".into())),
        ]);

        let client: Client = map_row(&row, criteria.joins()).unwrap();
        assert!(client.address.is_none());
        assert_eq!(client.referrer.map(|r| r.name), Some("Alpha".to_string()));
    }

    #[test]
    fn test_populate_without_alias() {
        let mut address = Address::default();
        let row = row(&[
            ("id", DatabaseValue::Int64(5)),
            ("street", DatabaseValue::String("Rua Augusta".into())),
        ]);
        populate(&mut address, Address::meta(), &row, None).unwrap();
        assert_eq!(address.id, Some(5));
        assert_eq!(address.street, "Rua Augusta");
        assert_eq!(address.city_id, None);
    }
}
