//! Entity store boundary for the business-records service.
//!
//! This crate defines the rows the service persists (customers, products,
//! orders), the typed queries the store can evaluate, and the
//! [`EntityStore`] / [`StoreTransaction`] traits that the domain layer
//! drives. Two implementations are provided:
//! - [`InMemoryStore`] for tests and embedded use
//! - [`PostgresStore`] backed by sqlx

pub mod entity;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use common::{CustomerId, Money, OrderId, ProductId};
pub use entity::{Customer, Order, Product};
pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::{CustomerQuery, LOW_STOCK_THRESHOLD, OrderQuery, ProductQuery};
pub use store::{CustomerStream, EntityStore, OrderStream, ProductStream, StoreTransaction};
