//! Shared fixtures for integration tests

#![allow(dead_code)]

use std::any::Any;
use std::sync::Arc;

use elif_dao::prelude::*;
use elif_dao::SqliteDataSource;
use once_cell::sync::Lazy;

pub const SCHEMA: &[&str] = &[
    "CREATE TABLE address (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        street TEXT NOT NULL
    )",
    "CREATE TABLE client (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        age INTEGER NOT NULL,
        active BOOLEAN NOT NULL DEFAULT 1,
        address_id INTEGER REFERENCES address (id)
    )",
    "CREATE TABLE orders (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        status INTEGER NOT NULL,
        total REAL NOT NULL,
        client_id INTEGER REFERENCES client (id)
    )",
    "CREATE TABLE contact (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        email TEXT NOT NULL,
        client_id INTEGER REFERENCES client (id)
    )",
    "CREATE TRIGGER client_locked BEFORE DELETE ON client
     WHEN old.name = 'Locked'
     BEGIN
        SELECT RAISE(ABORT, 'client is locked');
     END",
];

/// In-memory database with the fixture schema
pub async fn setup() -> Database {
    let source = SqliteDataSource::in_memory().await.expect("in-memory sqlite");
    let db = Database::new(Arc::new(source));
    create_schema(&db).await;
    db
}

pub async fn create_schema(db: &Database) {
    for ddl in SCHEMA {
        db.execute(&SqlStatement::new(*ddl)).await.expect("schema");
    }
}

/// Count rows of `table` with raw SQL
pub async fn row_count(db: &Database, table: &str) -> i64 {
    db.query_scalar(&SqlStatement::new(format!("SELECT COUNT(*) FROM {}", table)))
        .await
        .expect("count")
        .unwrap_or(0)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Address {
    pub id: Option<i64>,
    pub street: String,
}

impl Address {
    pub fn new(street: &str) -> Self {
        Self {
            id: None,
            street: street.to_string(),
        }
    }
}

impl Entity for Address {
    fn meta() -> &'static EntityMeta {
        static META: Lazy<EntityMeta> = Lazy::new(|| {
            EntityMeta::builder::<Address>("address")
                .id("id", "id")
                .field("street", "street", FieldKind::Text)
                .dependent(Client::meta)
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
            _ => Err(unknown_field::<Self>(field)),
        }
    }

    fn set_value(&mut self, field: &str, value: DatabaseValue) -> ModelResult<()> {
        match field {
            "id" => self.id = value.into_typed()?,
            "street" => self.street = value.into_typed()?,
            _ => return Err(unknown_field::<Self>(field)),
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
    pub address: Option<Address>,
}

impl Client {
    pub fn new(name: &str, age: i32) -> Self {
        Self {
            name: name.to_string(),
            age,
            active: true,
            ..Self::default()
        }
    }
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
                .relation("address", "address_id", Address::meta)
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
            _ => return Err(unknown_field::<Self>(field)),
        }
        Ok(())
    }

    fn attach(&mut self, relation: &str, related: Box<dyn Any + Send>) -> ModelResult<()> {
        match relation {
            "address" => self.address = Some(downcast_related(relation, related)?),
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

impl Order {
    pub fn new(client_id: i64, status: i32, total: f64) -> Self {
        Self {
            id: None,
            status,
            total,
            client_id: Some(client_id),
            client: None,
        }
    }
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

impl Contact {
    pub fn new(client_id: i64, email: &str) -> Self {
        Self {
            id: None,
            email: email.to_string(),
            client_id: Some(client_id),
        }
    }
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
