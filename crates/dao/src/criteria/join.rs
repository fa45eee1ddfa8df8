//! Join alias resolution
//!
//! Fetch paths are walked segment by segment. Every prefix of a path gets
//! exactly one `JoinDescriptor`, keyed by its dot-joined identifier, so two
//! fetches sharing a prefix share its join. Aliases are derived from the
//! descriptor's position in the fetch tree: the n-th top-level join is
//! `t_n`, and the m-th join hanging off `t_n` is `t_n_m`.

use std::collections::BTreeMap;

use crate::config::{ALIAS_PREFIX, MAIN_TABLE_ALIAS};
use crate::error::{ModelError, ModelResult};
use crate::model::EntityMeta;

/// One LEFT JOIN of a criteria
#[derive(Debug, Clone)]
pub struct JoinDescriptor {
    identifier: String,
    depth: usize,
    base: Option<String>,
    base_alias: String,
    relation: &'static str,
    base_column: &'static str,
    target: &'static EntityMeta,
    id_column: &'static str,
    alias: String,
    alias_slots: Vec<u32>,
    children: u32,
}

impl JoinDescriptor {
    /// Dot-joined fetch path, e.g. `client.address`
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// 0-based position of the last segment in the path
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Identifier of the join this one hangs off, `None` at depth 0
    pub fn base(&self) -> Option<&str> {
        self.base.as_deref()
    }

    pub fn base_alias(&self) -> &str {
        &self.base_alias
    }

    /// Relation name on the base entity
    pub fn relation(&self) -> &'static str {
        self.relation
    }

    /// Foreign-key column on the base side
    pub fn base_column(&self) -> &'static str {
        self.base_column
    }

    pub fn target(&self) -> &'static EntityMeta {
        self.target
    }

    pub fn table(&self) -> &'static str {
        self.target.table()
    }

    pub fn id_column(&self) -> &'static str {
        self.id_column
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }
}

/// Registry of the joins requested by one criteria
#[derive(Debug, Clone, Default)]
pub struct JoinRegistry {
    joins: BTreeMap<String, JoinDescriptor>,
    top_level: u32,
}

impl JoinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve `path` from `root`, registering a descriptor for every prefix
    /// not seen before, and return the descriptor of the full path
    pub fn resolve(
        &mut self,
        root: &'static EntityMeta,
        path: &[&str],
        max_depth: usize,
    ) -> ModelResult<&JoinDescriptor> {
        if path.is_empty() || path.iter().any(|segment| segment.is_empty()) {
            return Err(ModelError::Configuration(format!(
                "Malformed fetch path '{}'",
                path.join(".")
            )));
        }

        if path.len() > max_depth {
            return Err(ModelError::Configuration(format!(
                "Fetch path '{}' exceeds the maximum join depth of {}",
                path.join("."),
                max_depth
            )));
        }

        let mut identifier = String::new();
        let mut base: Option<String> = None;

        for (depth, segment) in path.iter().enumerate() {
            if depth > 0 {
                identifier.push('.');
            }
            identifier.push_str(segment);

            if !self.joins.contains_key(&identifier) {
                let descriptor = self.create(root, base.as_deref(), &identifier, depth, segment)?;
                self.joins.insert(identifier.clone(), descriptor);
            }

            base = Some(identifier.clone());
        }

        self.joins
            .get(&identifier)
            .ok_or_else(|| ModelError::Configuration(format!("Join '{}' was not registered", identifier)))
    }

    fn create(
        &mut self,
        root: &'static EntityMeta,
        base: Option<&str>,
        identifier: &str,
        depth: usize,
        segment: &str,
    ) -> ModelResult<JoinDescriptor> {
        let (base_meta, base_alias) = match base {
            None => (root, MAIN_TABLE_ALIAS.to_string()),
            Some(base_id) => {
                let base_join = self.base_join(base_id)?;
                (base_join.target, base_join.alias.clone())
            }
        };

        let relation = base_meta.relation(segment)?;
        let target = relation.target();
        let id_column = target.identity_field()?.column;
        let base_column = base_meta.column_name(relation.join_field)?;

        let alias_slots = match base {
            None => {
                self.top_level += 1;
                vec![self.top_level]
            }
            Some(base_id) => {
                let base_join = self.base_join_mut(base_id)?;
                base_join.children += 1;
                let mut slots = base_join.alias_slots.clone();
                slots.truncate(depth);
                slots.push(base_join.children);
                slots
            }
        };

        let alias = format!(
            "{}{}",
            ALIAS_PREFIX,
            alias_slots
                .iter()
                .map(|slot| slot.to_string())
                .collect::<Vec<_>>()
                .join("_")
        );

        Ok(JoinDescriptor {
            identifier: identifier.to_string(),
            depth,
            base: base.map(str::to_string),
            base_alias,
            relation: relation.name,
            base_column,
            target,
            id_column,
            alias,
            alias_slots,
            children: 0,
        })
    }

    fn base_join(&self, identifier: &str) -> ModelResult<&JoinDescriptor> {
        self.joins
            .get(identifier)
            .ok_or_else(|| ModelError::Configuration(format!("Join '{}' was not registered", identifier)))
    }

    fn base_join_mut(&mut self, identifier: &str) -> ModelResult<&mut JoinDescriptor> {
        self.joins
            .get_mut(identifier)
            .ok_or_else(|| ModelError::Configuration(format!("Join '{}' was not registered", identifier)))
    }

    pub fn get(&self, identifier: &str) -> Option<&JoinDescriptor> {
        self.joins.get(identifier)
    }

    /// Every descriptor, in lexical order of identifier
    pub fn descriptors(&self) -> impl Iterator<Item = &JoinDescriptor> {
        self.joins.values()
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    pub fn clear(&mut self) {
        self.joins.clear();
        self.top_level = 0;
    }
}
