//! Core domain layer for the business-records service.
//!
//! This crate provides:
//! - Validation rules for customer, product, and order input
//! - The filter engine translating string-keyed filter maps into typed
//!   store queries
//! - The aggregation engine keeping an order's total equal to the sum
//!   of its associated product prices
//! - The mutation orchestrator ([`RecordService`]) sequencing
//!   validation, writes, and aggregation into atomic mutations with
//!   structured results

pub mod aggregation;
pub mod error;
pub mod filter;
pub mod input;
pub mod result;
pub mod service;
pub mod validation;

pub use common::{CustomerId, Money, OrderId, ProductId};
pub use entity_store::{Customer, EntityStore, Order, Product};
pub use error::DomainError;
pub use filter::{FilterMap, FilterValue};
pub use input::{CustomerInput, OrderInput, ProductInput};
pub use result::{BulkMutationResult, MutationResult};
pub use service::{EntityKind, Record, RecordService};
pub use validation::ValidationError;
