//! Persisted entity rows.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, ProductId};
use serde::{Deserialize, Serialize};

/// A customer row.
///
/// `email` is globally unique (case-sensitive exact match); the store
/// enforces the constraint on commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Creates a new customer row with a fresh ID and current timestamps.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        phone: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: CustomerId::new(),
            name: name.into(),
            email: email.into(),
            phone,
            created_at: now,
            updated_at: now,
        }
    }
}

impl std::fmt::Display for Customer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.email)
    }
}

/// A product row.
///
/// Stock is informational; orders do not decrement it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub price: Money,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Creates a new product row with a fresh ID and current timestamps.
    pub fn new(name: impl Into<String>, price: Money, stock: i64) -> Self {
        let now = Utc::now();
        Self {
            id: ProductId::new(),
            name: name.into(),
            price,
            stock,
            created_at: now,
            updated_at: now,
        }
    }
}

impl std::fmt::Display for Product {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} - {}", self.name, self.price)
    }
}

/// An order row, including its product association.
///
/// `total_amount` is derived: after any associate/recompute step it
/// equals the exact sum of the prices of the currently associated
/// products. Callers never set it directly; the aggregation step does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub customer_id: CustomerId,
    pub product_ids: Vec<ProductId>,
    pub total_amount: Money,
    pub order_date: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Creates a new order row for a customer.
    ///
    /// The order starts with no association and a zero total; the
    /// creation transaction sets products and recomputes the total
    /// before committing.
    pub fn new(customer_id: CustomerId, order_date: Option<DateTime<Utc>>) -> Self {
        let now = Utc::now();
        Self {
            id: OrderId::new(),
            customer_id,
            product_ids: Vec::new(),
            total_amount: Money::zero(),
            order_date: order_date.unwrap_or(now),
            created_at: now,
            updated_at: now,
        }
    }
}
