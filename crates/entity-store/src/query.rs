//! Typed queries over the entity collections.
//!
//! Each query struct carries the optional predicate fields for one
//! entity; absent fields impose no constraint and all present fields
//! compose conjunctively. The `matches` methods are the reference
//! (in-memory) evaluation; the Postgres store translates the same
//! fields to SQL.

use chrono::{DateTime, Utc};
use common::{Money, ProductId};

use crate::entity::{Customer, Order, Product};

/// Stock level below which a product counts as low stock.
pub const LOW_STOCK_THRESHOLD: i64 = 10;

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Query over the customer collection.
#[derive(Debug, Clone, Default)]
pub struct CustomerQuery {
    /// Case-insensitive substring match on the name.
    pub name_contains: Option<String>,

    /// Case-insensitive substring match on the email.
    pub email_contains: Option<String>,

    /// Exact creation timestamp.
    pub created_at: Option<DateTime<Utc>>,

    /// Creation timestamp lower bound (inclusive).
    pub created_at_gte: Option<DateTime<Utc>>,

    /// Creation timestamp upper bound (inclusive).
    pub created_at_lte: Option<DateTime<Utc>>,

    /// Case-insensitive substring match on the phone number.
    pub phone_contains: Option<String>,
}

impl CustomerQuery {
    /// Creates a new unconstrained query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by name substring (case-insensitive).
    pub fn name_contains(mut self, value: impl Into<String>) -> Self {
        self.name_contains = Some(value.into());
        self
    }

    /// Filters by email substring (case-insensitive).
    pub fn email_contains(mut self, value: impl Into<String>) -> Self {
        self.email_contains = Some(value.into());
        self
    }

    /// Filters by exact creation timestamp.
    pub fn created_at(mut self, value: DateTime<Utc>) -> Self {
        self.created_at = Some(value);
        self
    }

    /// Filters to customers created at or after this timestamp.
    pub fn created_at_gte(mut self, value: DateTime<Utc>) -> Self {
        self.created_at_gte = Some(value);
        self
    }

    /// Filters to customers created at or before this timestamp.
    pub fn created_at_lte(mut self, value: DateTime<Utc>) -> Self {
        self.created_at_lte = Some(value);
        self
    }

    /// Filters by phone substring. Customers without a phone never match.
    pub fn phone_contains(mut self, value: impl Into<String>) -> Self {
        self.phone_contains = Some(value.into());
        self
    }

    /// Evaluates the query against a single customer row.
    pub fn matches(&self, customer: &Customer) -> bool {
        if let Some(v) = &self.name_contains
            && !contains_ci(&customer.name, v)
        {
            return false;
        }
        if let Some(v) = &self.email_contains
            && !contains_ci(&customer.email, v)
        {
            return false;
        }
        if let Some(t) = self.created_at
            && customer.created_at != t
        {
            return false;
        }
        if let Some(t) = self.created_at_gte
            && customer.created_at < t
        {
            return false;
        }
        if let Some(t) = self.created_at_lte
            && customer.created_at > t
        {
            return false;
        }
        if let Some(v) = &self.phone_contains {
            match &customer.phone {
                Some(phone) => {
                    if !contains_ci(phone, v) {
                        return false;
                    }
                }
                None => return false,
            }
        }
        true
    }
}

/// Query over the product collection.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    /// Case-insensitive substring match on the name.
    pub name_contains: Option<String>,

    /// Exact price.
    pub price: Option<Money>,

    /// Price lower bound (inclusive).
    pub price_gte: Option<Money>,

    /// Price upper bound (inclusive).
    pub price_lte: Option<Money>,

    /// Exact stock level.
    pub stock: Option<i64>,

    /// Stock lower bound (inclusive).
    pub stock_gte: Option<i64>,

    /// Stock upper bound (inclusive).
    pub stock_lte: Option<i64>,

    /// Restrict to products with stock below [`LOW_STOCK_THRESHOLD`].
    pub low_stock: bool,
}

impl ProductQuery {
    /// Creates a new unconstrained query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by name substring (case-insensitive).
    pub fn name_contains(mut self, value: impl Into<String>) -> Self {
        self.name_contains = Some(value.into());
        self
    }

    /// Filters by exact price.
    pub fn price(mut self, value: Money) -> Self {
        self.price = Some(value);
        self
    }

    /// Filters to products priced at or above this amount.
    pub fn price_gte(mut self, value: Money) -> Self {
        self.price_gte = Some(value);
        self
    }

    /// Filters to products priced at or below this amount.
    pub fn price_lte(mut self, value: Money) -> Self {
        self.price_lte = Some(value);
        self
    }

    /// Filters by exact stock level.
    pub fn stock(mut self, value: i64) -> Self {
        self.stock = Some(value);
        self
    }

    /// Filters to products with at least this much stock.
    pub fn stock_gte(mut self, value: i64) -> Self {
        self.stock_gte = Some(value);
        self
    }

    /// Filters to products with at most this much stock.
    pub fn stock_lte(mut self, value: i64) -> Self {
        self.stock_lte = Some(value);
        self
    }

    /// Restricts to low-stock products (stock < 10).
    pub fn low_stock(mut self) -> Self {
        self.low_stock = true;
        self
    }

    /// Evaluates the query against a single product row.
    pub fn matches(&self, product: &Product) -> bool {
        if let Some(v) = &self.name_contains
            && !contains_ci(&product.name, v)
        {
            return false;
        }
        if let Some(p) = self.price
            && product.price != p
        {
            return false;
        }
        if let Some(p) = self.price_gte
            && product.price < p
        {
            return false;
        }
        if let Some(p) = self.price_lte
            && product.price > p
        {
            return false;
        }
        if let Some(s) = self.stock
            && product.stock != s
        {
            return false;
        }
        if let Some(s) = self.stock_gte
            && product.stock < s
        {
            return false;
        }
        if let Some(s) = self.stock_lte
            && product.stock > s
        {
            return false;
        }
        if self.low_stock && product.stock >= LOW_STOCK_THRESHOLD {
            return false;
        }
        true
    }
}

/// Query over the order collection.
///
/// The customer and product predicates traverse the order's related
/// rows; an order matched through more than one associated product
/// still appears once in the result.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    /// Exact total amount.
    pub total_amount: Option<Money>,

    /// Total amount lower bound (inclusive).
    pub total_amount_gte: Option<Money>,

    /// Total amount upper bound (inclusive).
    pub total_amount_lte: Option<Money>,

    /// Exact order date.
    pub order_date: Option<DateTime<Utc>>,

    /// Order date lower bound (inclusive).
    pub order_date_gte: Option<DateTime<Utc>>,

    /// Order date upper bound (inclusive).
    pub order_date_lte: Option<DateTime<Utc>>,

    /// Case-insensitive substring match on the owning customer's name.
    pub customer_name_contains: Option<String>,

    /// Case-insensitive substring match on the owning customer's email.
    pub customer_email_contains: Option<String>,

    /// Case-insensitive substring match on any associated product's name.
    pub product_name_contains: Option<String>,

    /// Restrict to orders containing this product.
    pub product_id: Option<ProductId>,
}

impl OrderQuery {
    /// Creates a new unconstrained query.
    pub fn new() -> Self {
        Self::default()
    }

    /// Filters by exact total amount.
    pub fn total_amount(mut self, value: Money) -> Self {
        self.total_amount = Some(value);
        self
    }

    /// Filters to orders totalling at least this amount.
    pub fn total_amount_gte(mut self, value: Money) -> Self {
        self.total_amount_gte = Some(value);
        self
    }

    /// Filters to orders totalling at most this amount.
    pub fn total_amount_lte(mut self, value: Money) -> Self {
        self.total_amount_lte = Some(value);
        self
    }

    /// Filters by exact order date.
    pub fn order_date(mut self, value: DateTime<Utc>) -> Self {
        self.order_date = Some(value);
        self
    }

    /// Filters to orders placed at or after this timestamp.
    pub fn order_date_gte(mut self, value: DateTime<Utc>) -> Self {
        self.order_date_gte = Some(value);
        self
    }

    /// Filters to orders placed at or before this timestamp.
    pub fn order_date_lte(mut self, value: DateTime<Utc>) -> Self {
        self.order_date_lte = Some(value);
        self
    }

    /// Filters by owning customer name substring (case-insensitive).
    pub fn customer_name_contains(mut self, value: impl Into<String>) -> Self {
        self.customer_name_contains = Some(value.into());
        self
    }

    /// Filters by owning customer email substring (case-insensitive).
    pub fn customer_email_contains(mut self, value: impl Into<String>) -> Self {
        self.customer_email_contains = Some(value.into());
        self
    }

    /// Filters by associated product name substring (case-insensitive).
    pub fn product_name_contains(mut self, value: impl Into<String>) -> Self {
        self.product_name_contains = Some(value.into());
        self
    }

    /// Filters to orders containing the given product.
    pub fn product_id(mut self, value: ProductId) -> Self {
        self.product_id = Some(value);
        self
    }

    /// Returns true if the query needs the associated product rows.
    pub fn joins_products(&self) -> bool {
        self.product_name_contains.is_some() || self.product_id.is_some()
    }

    /// Evaluates the query against an order together with its owning
    /// customer and associated products.
    pub fn matches(&self, order: &Order, customer: &Customer, products: &[Product]) -> bool {
        if let Some(m) = self.total_amount
            && order.total_amount != m
        {
            return false;
        }
        if let Some(m) = self.total_amount_gte
            && order.total_amount < m
        {
            return false;
        }
        if let Some(m) = self.total_amount_lte
            && order.total_amount > m
        {
            return false;
        }
        if let Some(t) = self.order_date
            && order.order_date != t
        {
            return false;
        }
        if let Some(t) = self.order_date_gte
            && order.order_date < t
        {
            return false;
        }
        if let Some(t) = self.order_date_lte
            && order.order_date > t
        {
            return false;
        }
        if let Some(v) = &self.customer_name_contains
            && !contains_ci(&customer.name, v)
        {
            return false;
        }
        if let Some(v) = &self.customer_email_contains
            && !contains_ci(&customer.email, v)
        {
            return false;
        }
        if let Some(v) = &self.product_name_contains
            && !products.iter().any(|p| contains_ci(&p.name, v))
        {
            return false;
        }
        if let Some(id) = self.product_id
            && !order.product_ids.contains(&id)
        {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::CustomerId;

    fn customer(name: &str, email: &str, phone: Option<&str>) -> Customer {
        Customer::new(name, email, phone.map(str::to_string))
    }

    #[test]
    fn empty_customer_query_matches_everything() {
        let query = CustomerQuery::new();
        assert!(query.matches(&customer("Ana", "a@x.com", None)));
        assert!(query.matches(&customer("Bob", "b@x.com", Some("123-456-7890"))));
    }

    #[test]
    fn name_substring_is_case_insensitive() {
        let query = CustomerQuery::new().name_contains("ANA");
        assert!(query.matches(&customer("Ana Lima", "a@x.com", None)));
        assert!(!query.matches(&customer("Bob", "b@x.com", None)));
    }

    #[test]
    fn phone_filter_never_matches_missing_phone() {
        let query = CustomerQuery::new().phone_contains("+1");
        assert!(query.matches(&customer("Ana", "a@x.com", Some("+14155550100"))));
        assert!(!query.matches(&customer("Bob", "b@x.com", None)));
    }

    #[test]
    fn created_at_range_is_inclusive() {
        let c = customer("Ana", "a@x.com", None);
        let query = CustomerQuery::new()
            .created_at_gte(c.created_at)
            .created_at_lte(c.created_at);
        assert!(query.matches(&c));
    }

    #[test]
    fn low_stock_threshold_is_exclusive_at_ten() {
        let query = ProductQuery::new().low_stock();
        assert!(query.matches(&Product::new("A", Money::from_cents(100), 9)));
        assert!(!query.matches(&Product::new("B", Money::from_cents(100), 10)));
        assert!(!query.matches(&Product::new("C", Money::from_cents(100), 12)));
    }

    #[test]
    fn price_range_filters_compose() {
        let query = ProductQuery::new()
            .price_gte(Money::from_cents(500))
            .price_lte(Money::from_cents(1500));
        assert!(query.matches(&Product::new("A", Money::from_cents(500), 0)));
        assert!(query.matches(&Product::new("B", Money::from_cents(1500), 0)));
        assert!(!query.matches(&Product::new("C", Money::from_cents(1501), 0)));
    }

    #[test]
    fn order_query_traverses_related_rows() {
        let c = customer("Ana Lima", "ana@example.com", None);
        let widget = Product::new("Widget", Money::from_cents(1000), 5);
        let mut order = Order::new(CustomerId::new(), None);
        order.product_ids = vec![widget.id];
        order.total_amount = widget.price;

        let by_customer = OrderQuery::new().customer_name_contains("lima");
        assert!(by_customer.matches(&order, &c, std::slice::from_ref(&widget)));

        let by_product = OrderQuery::new().product_name_contains("widg");
        assert!(by_product.matches(&order, &c, std::slice::from_ref(&widget)));

        let by_product_id = OrderQuery::new().product_id(widget.id);
        assert!(by_product_id.matches(&order, &c, std::slice::from_ref(&widget)));

        let by_other_product = OrderQuery::new().product_id(ProductId::new());
        assert!(!by_other_product.matches(&order, &c, std::slice::from_ref(&widget)));
    }

    #[test]
    fn order_total_range_is_inclusive() {
        let c = customer("Ana", "a@x.com", None);
        let mut order = Order::new(CustomerId::new(), None);
        order.total_amount = Money::from_cents(1550);

        let query = OrderQuery::new()
            .total_amount_gte(Money::from_cents(1550))
            .total_amount_lte(Money::from_cents(1550));
        assert!(query.matches(&order, &c, &[]));
    }
}
