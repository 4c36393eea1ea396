//! Raw mutation input.

use chrono::{DateTime, Utc};
use common::{CustomerId, Money, ProductId};
use serde::{Deserialize, Serialize};

/// Input for creating a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

impl CustomerInput {
    /// Creates customer input without a phone number.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: None,
        }
    }

    /// Sets the phone number.
    pub fn with_phone(mut self, phone: impl Into<String>) -> Self {
        self.phone = Some(phone.into());
        self
    }
}

/// Input for creating a product.
///
/// Stock defaults to 0 when omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInput {
    pub name: String,
    pub price: Money,
    #[serde(default)]
    pub stock: Option<i64>,
}

impl ProductInput {
    /// Creates product input with the default stock.
    pub fn new(name: impl Into<String>, price: Money) -> Self {
        Self {
            name: name.into(),
            price,
            stock: None,
        }
    }

    /// Sets the initial stock level.
    pub fn with_stock(mut self, stock: i64) -> Self {
        self.stock = Some(stock);
        self
    }
}

/// Input for creating an order.
///
/// The order date defaults to the creation time when omitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderInput {
    pub customer_id: CustomerId,
    pub product_ids: Vec<ProductId>,
    #[serde(default)]
    pub order_date: Option<DateTime<Utc>>,
}

impl OrderInput {
    /// Creates order input dated at creation time.
    pub fn new(customer_id: CustomerId, product_ids: Vec<ProductId>) -> Self {
        Self {
            customer_id,
            product_ids,
            order_date: None,
        }
    }

    /// Sets an explicit order date.
    pub fn with_order_date(mut self, order_date: DateTime<Utc>) -> Self {
        self.order_date = Some(order_date);
        self
    }
}
