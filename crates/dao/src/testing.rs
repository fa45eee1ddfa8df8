//! Entity fixtures shared by unit tests

use std::any::Any;

use once_cell::sync::Lazy;

use crate::backends::DatabaseValue;
use crate::error::ModelResult;
use crate::model::{downcast_related, unknown_field, Entity, EntityMeta, FieldKind};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct City {
    pub id: Option<i64>,
    pub name: String,
}

impl Entity for City {
    fn meta() -> &'static EntityMeta {
        static META: Lazy<EntityMeta> = Lazy::new(|| {
            EntityMeta::builder::<City>("city")
                .id("id", "id")
                .field("name", "name", FieldKind::Text)
                .build()
        });
        &META
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn value_of(&self, field: &str) -> ModelResult<DatabaseValue> {
        match field {
            "id" => Ok(self.id.into()),
            "name" => Ok(self.name.clone().into()),
            _ => Err(unknown_field::<Self>(field)),
        }
    }

    fn set_value(&mut self, field: &str, value: DatabaseValue) -> ModelResult<()> {
        match field {
            "id" => self.id = value.into_typed()?,
            "name" => self.name = value.into_typed()?,
            _ => return Err(unknown_field::<Self>(field)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Address {
    pub id: Option<i64>,
    pub street: String,
    pub city_id: Option<i64>,
    pub city: Option<City>,
}

impl Entity for Address {
    fn meta() -> &'static EntityMeta {
        static META: Lazy<EntityMeta> = Lazy::new(|| {
            EntityMeta::builder::<Address>("address")
                .id("id", "id")
                .field("street", "street", FieldKind::Text)
                .field("city_id", "city_id", FieldKind::BigInt)
                .relation("city", "city_id", City::meta)
                .build()
        });
        &META
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn value_of(&self, field: &str) -> ModelResult<DatabaseValue> {
        match field {
            "id" => Ok(self.id.into()),
            "street" => Ok(self.street.clone().into()),
            "city_id" => Ok(self.city_id.into()),
            _ => Err(unknown_field::<Self>(field)),
        }
    }

    fn set_value(&mut self, field: &str, value: DatabaseValue) -> ModelResult<()> {
        match field {
            "id" => self.id = value.into_typed()?,
            "street" => self.street = value.into_typed()?,
            "city_id" => self.city_id = value.into_typed()?,
            _ => return Err(unknown_field::<Self>(field)),
        }
        Ok(())
    }

    fn attach(&mut self, relation: &str, related: Box<dyn Any + Send>) -> ModelResult<()> {
        match relation {
            "city" => self.city = Some(downcast_related(relation, related)?),
            _ => return Err(unknown_field::<Self>(relation)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Client {
    pub id: Option<i64>,
    pub name: String,
    pub age: i32,
    pub active: bool,
    pub address_id: Option<i64>,
    pub referrer_id: Option<i64>,
    pub address: Option<Address>,
    pub referrer: Option<Box<Client>>,
}

impl Entity for Client {
    fn meta() -> &'static EntityMeta {
        static META: Lazy<EntityMeta> = Lazy::new(|| {
            EntityMeta::builder::<Client>("client")
                .id("id", "id")
                .field("name", "name", FieldKind::Text)
                .field("age", "age", FieldKind::Integer)
                .field("active", "active", FieldKind::Boolean)
                .field("address_id", "address_id", FieldKind::BigInt)
                .field("referrer_id", "referrer_id", FieldKind::BigInt)
                .relation("address", "address_id", Address::meta)
                .relation("referrer", "referrer_id", Client::meta)
                .dependent(Order::meta)
                .dependent(Contact::meta)
                .build()
        });
        &META
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn value_of(&self, field: &str) -> ModelResult<DatabaseValue> {
        match field {
            "id" => Ok(self.id.into()),
            "name" => Ok(self.name.clone().into()),
            "age" => Ok(self.age.into()),
            "active" => Ok(self.active.into()),
            "address_id" => Ok(self.address_id.into()),
            "referrer_id" => Ok(self.referrer_id.into()),
            _ => Err(unknown_field::<Self>(field)),
        }
    }

    fn set_value(&mut self, field: &str, value: DatabaseValue) -> ModelResult<()> {
        match field {
            "id" => self.id = value.into_typed()?,
            "name" => self.name = value.into_typed()?,
            "age" => self.age = value.into_typed()?,
            "active" => self.active = value.into_typed()?,
            "address_id" => self.address_id = value.into_typed()?,
            "referrer_id" => self.referrer_id = value.into_typed()?,
            _ => return Err(unknown_field::<Self>(field)),
        }
        Ok(())
    }

    fn attach(&mut self, relation: &str, related: Box<dyn Any + Send>) -> ModelResult<()> {
        match relation {
            "address" => self.address = Some(downcast_related(relation, related)?),
            "referrer" => self.referrer = Some(Box::new(downcast_related(relation, related)?)),
            _ => return Err(unknown_field::<Self>(relation)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order {
    pub id: Option<i64>,
    pub status: i32,
    pub total: f64,
    pub client_id: Option<i64>,
    pub client: Option<Client>,
}

impl Entity for Order {
    fn meta() -> &'static EntityMeta {
        static META: Lazy<EntityMeta> = Lazy::new(|| {
            EntityMeta::builder::<Order>("orders")
                .id("id", "id")
                .field("status", "status", FieldKind::Integer)
                .field("total", "total", FieldKind::Double)
                .field("client_id", "client_id", FieldKind::BigInt)
                .relation("client", "client_id", Client::meta)
                .build()
        });
        &META
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn value_of(&self, field: &str) -> ModelResult<DatabaseValue> {
        match field {
            "id" => Ok(self.id.into()),
            "status" => Ok(self.status.into()),
            "total" => Ok(self.total.into()),
            "client_id" => Ok(self.client_id.into()),
            _ => Err(unknown_field::<Self>(field)),
        }
    }

    fn set_value(&mut self, field: &str, value: DatabaseValue) -> ModelResult<()> {
        match field {
            "id" => self.id = value.into_typed()?,
            "status" => self.status = value.into_typed()?,
            "total" => self.total = value.into_typed()?,
            "client_id" => self.client_id = value.into_typed()?,
            _ => return Err(unknown_field::<Self>(field)),
        }
        Ok(())
    }

    fn attach(&mut self, relation: &str, related: Box<dyn Any + Send>) -> ModelResult<()> {
        match relation {
            "client" => self.client = Some(downcast_related(relation, related)?),
            _ => return Err(unknown_field::<Self>(relation)),
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Contact {
    pub id: Option<i64>,
    pub email: String,
    pub client_id: Option<i64>,
}

impl Entity for Contact {
    fn meta() -> &'static EntityMeta {
        static META: Lazy<EntityMeta> = Lazy::new(|| {
            EntityMeta::builder::<Contact>("contact")
                .id("id", "id")
                .field("email", "email", FieldKind::Text)
                .field("client_id", "client_id", FieldKind::BigInt)
                .relation("client", "client_id", Client::meta)
                .build()
        });
        &META
    }

    fn id(&self) -> Option<i64> {
        self.id
    }

    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }

    fn value_of(&self, field: &str) -> ModelResult<DatabaseValue> {
        match field {
            "id" => Ok(self.id.into()),
            "email" => Ok(self.email.clone().into()),
            "client_id" => Ok(self.client_id.into()),
            _ => Err(unknown_field::<Self>(field)),
        }
    }

    fn set_value(&mut self, field: &str, value: DatabaseValue) -> ModelResult<()> {
        match field {
            "id" => self.id = value.into_typed()?,
            "email" => self.email = value.into_typed()?,
            "client_id" => self.client_id = value.into_typed()?,
            _ => return Err(unknown_field::<Self>(field)),
        }
        Ok(())
    }
}
