//! The filter engine.
//!
//! Callers describe a query as a map of recognized string keys to
//! values; each entity has a dispatch function translating that map
//! into the typed store query. The contract is forward-compatible:
//! unrecognized keys are silently ignored (as are values of the wrong
//! type for a key), absent keys impose no constraint, and falsy
//! convenience filters (`low_stock=false`, an empty `phone_pattern`, a
//! nil `product_id`) are no-ops rather than exclusions.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use common::{Money, ProductId};
use entity_store::{CustomerQuery, OrderQuery, ProductQuery};
use uuid::Uuid;

/// A value supplied for a filter key.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Substring or pattern text.
    Text(String),

    /// Integer, used for stock levels.
    Integer(i64),

    /// Money amount, used for prices and totals.
    Amount(Money),

    /// Convenience filter toggle.
    Boolean(bool),

    /// Timestamp, used for creation and order dates.
    Timestamp(DateTime<Utc>),

    /// Entity identifier.
    Id(Uuid),
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<Money> for FilterValue {
    fn from(value: Money) -> Self {
        Self::Amount(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<DateTime<Utc>> for FilterValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<Uuid> for FilterValue {
    fn from(value: Uuid) -> Self {
        Self::Id(value)
    }
}

impl From<ProductId> for FilterValue {
    fn from(value: ProductId) -> Self {
        Self::Id(value.as_uuid())
    }
}

/// A filter request: recognized keys to values.
pub type FilterMap = HashMap<String, FilterValue>;

/// Translates a filter map into a customer query.
///
/// Recognized keys: `name`, `email`, `created_at`, `created_at__gte`,
/// `created_at__lte`, `phone_pattern`.
pub fn customer_query(filters: &FilterMap) -> CustomerQuery {
    let mut query = CustomerQuery::new();
    for (key, value) in filters {
        match (key.as_str(), value) {
            ("name", FilterValue::Text(v)) => query = query.name_contains(v.clone()),
            ("email", FilterValue::Text(v)) => query = query.email_contains(v.clone()),
            ("created_at", FilterValue::Timestamp(t)) => query = query.created_at(*t),
            ("created_at__gte", FilterValue::Timestamp(t)) => query = query.created_at_gte(*t),
            ("created_at__lte", FilterValue::Timestamp(t)) => query = query.created_at_lte(*t),
            ("phone_pattern", FilterValue::Text(v)) if !v.is_empty() => {
                query = query.phone_contains(v.clone());
            }
            _ => {}
        }
    }
    query
}

/// Translates a filter map into a product query.
///
/// Recognized keys: `name`, `price`, `price__gte`, `price__lte`,
/// `stock`, `stock__gte`, `stock__lte`, `low_stock`.
pub fn product_query(filters: &FilterMap) -> ProductQuery {
    let mut query = ProductQuery::new();
    for (key, value) in filters {
        match (key.as_str(), value) {
            ("name", FilterValue::Text(v)) => query = query.name_contains(v.clone()),
            ("price", FilterValue::Amount(m)) => query = query.price(*m),
            ("price__gte", FilterValue::Amount(m)) => query = query.price_gte(*m),
            ("price__lte", FilterValue::Amount(m)) => query = query.price_lte(*m),
            ("stock", FilterValue::Integer(s)) => query = query.stock(*s),
            ("stock__gte", FilterValue::Integer(s)) => query = query.stock_gte(*s),
            ("stock__lte", FilterValue::Integer(s)) => query = query.stock_lte(*s),
            ("low_stock", FilterValue::Boolean(true)) => query = query.low_stock(),
            _ => {}
        }
    }
    query
}

/// Translates a filter map into an order query.
///
/// Recognized keys: `total_amount` (plus `__gte`/`__lte`), `order_date`
/// (plus `__gte`/`__lte`), `customer_name`, `customer_email`,
/// `product_name`, `product_id`.
pub fn order_query(filters: &FilterMap) -> OrderQuery {
    let mut query = OrderQuery::new();
    for (key, value) in filters {
        match (key.as_str(), value) {
            ("total_amount", FilterValue::Amount(m)) => query = query.total_amount(*m),
            ("total_amount__gte", FilterValue::Amount(m)) => query = query.total_amount_gte(*m),
            ("total_amount__lte", FilterValue::Amount(m)) => query = query.total_amount_lte(*m),
            ("order_date", FilterValue::Timestamp(t)) => query = query.order_date(*t),
            ("order_date__gte", FilterValue::Timestamp(t)) => query = query.order_date_gte(*t),
            ("order_date__lte", FilterValue::Timestamp(t)) => query = query.order_date_lte(*t),
            ("customer_name", FilterValue::Text(v)) => {
                query = query.customer_name_contains(v.clone());
            }
            ("customer_email", FilterValue::Text(v)) => {
                query = query.customer_email_contains(v.clone());
            }
            ("product_name", FilterValue::Text(v)) => {
                query = query.product_name_contains(v.clone());
            }
            ("product_id", FilterValue::Id(id)) if !id.is_nil() => {
                query = query.product_id(ProductId::from_uuid(*id));
            }
            _ => {}
        }
    }
    query
}
