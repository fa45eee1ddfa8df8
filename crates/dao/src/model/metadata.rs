//! Field metadata registry
//!
//! Every entity type declares a static `EntityMeta`: its table, the ordered
//! persistent fields with their columns, the identity field, the
//! relationships it can fetch and the dependent entity types that point back
//! at it. The metadata is built once (usually inside a `once_cell::sync::Lazy`)
//! and read-only afterwards.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::entity::Entity;
use crate::backends::DatabaseValue;
use crate::error::{ModelError, ModelResult};

/// Declared type of a persistent field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Boolean,
    Integer,
    BigInt,
    Float,
    Double,
    Text,
    Bytes,
    Uuid,
    Timestamp,
    Date,
    Time,
    Json,
}

/// Static description of one persistent field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMeta {
    pub name: &'static str,
    pub column: &'static str,
    pub kind: FieldKind,
    pub identity: bool,
}

/// A field descriptor carrying the value read from one entity instance
#[derive(Debug, Clone, PartialEq)]
pub struct BoundField {
    pub field: FieldMeta,
    pub value: DatabaseValue,
}

impl BoundField {
    pub fn new(field: FieldMeta, value: DatabaseValue) -> Self {
        Self { field, value }
    }

    pub fn column(&self) -> &'static str {
        self.field.column
    }
}

/// A many-to-one relationship joined through a foreign key on the owning side
#[derive(Clone, Copy)]
pub struct RelationMeta {
    pub name: &'static str,
    /// Field on the owning entity holding the foreign key
    pub join_field: &'static str,
    target: fn() -> &'static EntityMeta,
}

impl RelationMeta {
    pub fn target(&self) -> &'static EntityMeta {
        (self.target)()
    }
}

impl fmt::Debug for RelationMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RelationMeta")
            .field("name", &self.name)
            .field("join_field", &self.join_field)
            .field("target", &self.target().table)
            .finish()
    }
}

/// Metadata for one entity type
pub struct EntityMeta {
    type_name: &'static str,
    table: &'static str,
    fields: Vec<FieldMeta>,
    relations: Vec<RelationMeta>,
    dependents: Vec<fn() -> &'static EntityMeta>,
    construct: fn() -> Box<dyn Entity>,
}

fn construct_default<T: Entity + Default>() -> Box<dyn Entity> {
    Box::new(T::default())
}

impl EntityMeta {
    /// Start declaring the metadata of `T`, stored in `table`
    pub fn builder<T: Entity + Default>(table: &'static str) -> EntityMetaBuilder {
        EntityMetaBuilder {
            meta: EntityMeta {
                type_name: std::any::type_name::<T>(),
                table,
                fields: Vec::new(),
                relations: Vec::new(),
                dependents: Vec::new(),
                construct: construct_default::<T>,
            },
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    /// Persistent fields in declaration order
    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> ModelResult<&FieldMeta> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .ok_or_else(|| ModelError::invalid_field(self.type_name, name))
    }

    pub fn identity_field(&self) -> ModelResult<&FieldMeta> {
        let mut identities = self.fields.iter().filter(|field| field.identity);
        match (identities.next(), identities.next()) {
            (Some(identity), None) => Ok(identity),
            (None, _) => Err(ModelError::Configuration(format!(
                "Entity '{}' declares no identity field",
                self.type_name
            ))),
            (Some(_), Some(_)) => Err(ModelError::Configuration(format!(
                "Entity '{}' declares more than one identity field",
                self.type_name
            ))),
        }
    }

    pub fn column_name(&self, field: &str) -> ModelResult<&'static str> {
        self.field(field).map(|field| field.column)
    }

    pub fn relations(&self) -> &[RelationMeta] {
        &self.relations
    }

    pub fn relation(&self, name: &str) -> ModelResult<&RelationMeta> {
        self.relations
            .iter()
            .find(|relation| relation.name == name)
            .ok_or_else(|| ModelError::invalid_field(self.type_name, name))
    }

    /// Entity types holding a relation that targets this one
    pub fn dependents(&self) -> impl Iterator<Item = &'static EntityMeta> + '_ {
        self.dependents.iter().map(|dependent| dependent())
    }

    /// Relations of `self` whose target is `other`
    pub fn relations_to<'a>(&'a self, other: &'a EntityMeta) -> impl Iterator<Item = &'a RelationMeta> + 'a {
        self.relations
            .iter()
            .filter(move |relation| std::ptr::eq(relation.target(), other))
    }

    /// Create an empty instance of the entity type
    pub fn construct(&self) -> Box<dyn Entity> {
        (self.construct)()
    }

    /// Read every persistent field of `entity` into data-bearing descriptors
    pub fn bind_values(&self, entity: &dyn Entity) -> ModelResult<Vec<BoundField>> {
        self.fields
            .iter()
            .map(|field| Ok(BoundField::new(*field, entity.value_of(field.name)?)))
            .collect()
    }

    /// Check the declaration is usable: exactly one identity, unique names and
    /// columns, and relations joined through declared fields
    pub fn validate(&self) -> ModelResult<()> {
        self.identity_field()?;

        let mut names = HashSet::new();
        let mut columns = HashSet::new();
        for field in &self.fields {
            if !names.insert(field.name) {
                return Err(ModelError::Configuration(format!(
                    "Entity '{}' declares field '{}' twice",
                    self.type_name, field.name
                )));
            }
            if !columns.insert(field.column) {
                return Err(ModelError::Configuration(format!(
                    "Entity '{}' maps column '{}' twice",
                    self.type_name, field.column
                )));
            }
        }

        for relation in &self.relations {
            if !names.insert(relation.name) {
                return Err(ModelError::Configuration(format!(
                    "Entity '{}' reuses name '{}' for a relation",
                    self.type_name, relation.name
                )));
            }
            self.field(relation.join_field)?;
        }

        Ok(())
    }
}

impl fmt::Debug for EntityMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityMeta")
            .field("type_name", &self.type_name)
            .field("table", &self.table)
            .field("fields", &self.fields)
            .field("relations", &self.relations)
            .finish()
    }
}

/// Builder returned by `EntityMeta::builder`
pub struct EntityMetaBuilder {
    meta: EntityMeta,
}

impl EntityMetaBuilder {
    /// Integer identity column
    pub fn id(self, name: &'static str, column: &'static str) -> Self {
        self.identity(name, column, FieldKind::BigInt)
    }

    pub fn identity(mut self, name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        self.meta.fields.push(FieldMeta {
            name,
            column,
            kind,
            identity: true,
        });
        self
    }

    pub fn field(mut self, name: &'static str, column: &'static str, kind: FieldKind) -> Self {
        self.meta.fields.push(FieldMeta {
            name,
            column,
            kind,
            identity: false,
        });
        self
    }

    /// Relation `name` to `target`, joined through the foreign key held in `join_field`
    pub fn relation(
        mut self,
        name: &'static str,
        join_field: &'static str,
        target: fn() -> &'static EntityMeta,
    ) -> Self {
        self.meta.relations.push(RelationMeta {
            name,
            join_field,
            target,
        });
        self
    }

    /// Entity type whose rows are deleted along with this one by cascading deletes
    pub fn dependent(mut self, dependent: fn() -> &'static EntityMeta) -> Self {
        self.meta.dependents.push(dependent);
        self
    }

    pub fn build(self) -> EntityMeta {
        self.meta
    }
}

/// Persistent fields of `T`, in declaration order
pub fn fields_of<T: Entity>() -> &'static [FieldMeta] {
    T::meta().fields()
}

pub fn identity_field_of<T: Entity>() -> ModelResult<&'static FieldMeta> {
    T::meta().identity_field()
}

pub fn column_name_of<T: Entity>(field: &str) -> ModelResult<&'static str> {
    T::meta().column_name(field)
}
