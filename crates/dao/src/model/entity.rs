//! Entity trait
//!
//! An entity exposes its fields by name so the data access layer can read
//! and populate instances without reflection. Implementations are plain
//! `match` statements over the field names declared in the entity's
//! `EntityMeta`.

use std::any::Any;
use std::fmt;

use super::metadata::EntityMeta;
use crate::backends::DatabaseValue;
use crate::error::{ModelError, ModelResult};

/// Conversion of a boxed entity into `Any`, implemented for every sized type
pub trait IntoAny {
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send>;
}

impl<T: Any + Send> IntoAny for T {
    fn into_any(self: Box<Self>) -> Box<dyn Any + Send> {
        self
    }
}

/// A mapped record with a static metadata declaration
pub trait Entity: IntoAny + Send + Sync + fmt::Debug + 'static {
    fn meta() -> &'static EntityMeta
    where
        Self: Sized;

    /// Value of the identity field, `None` before the first insert
    fn id(&self) -> Option<i64>;

    fn set_id(&mut self, id: i64);

    fn value_of(&self, field: &str) -> ModelResult<DatabaseValue>;

    fn set_value(&mut self, field: &str, value: DatabaseValue) -> ModelResult<()>;

    /// Store a related instance produced by a fetch of `relation`
    fn attach(&mut self, relation: &str, related: Box<dyn Any + Send>) -> ModelResult<()> {
        drop(related);
        Err(ModelError::invalid_field(std::any::type_name::<Self>(), relation))
    }

    fn is_new(&self) -> bool {
        self.id().is_none()
    }
}

/// Recover a concrete related entity inside an `Entity::attach` implementation
pub fn downcast_related<T: Entity>(relation: &str, related: Box<dyn Any + Send>) -> ModelResult<T> {
    related.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
        ModelError::Configuration(format!(
            "relation '{}' does not hold a {}",
            relation,
            std::any::type_name::<T>()
        ))
    })
}

/// Error for a field name an entity does not know
pub fn unknown_field<T: ?Sized>(field: &str) -> ModelError {
    ModelError::invalid_field(std::any::type_name::<T>(), field)
}
