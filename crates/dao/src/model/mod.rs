//! Entity model: metadata registry, entity trait and row mapping

pub mod entity;
pub mod mapper;
pub mod metadata;

pub use entity::{downcast_related, unknown_field, Entity, IntoAny};
pub use mapper::{map_row, populate};
pub use metadata::{
    column_name_of, fields_of, identity_field_of, BoundField, EntityMeta, EntityMetaBuilder, FieldKind,
    FieldMeta, RelationMeta,
};
