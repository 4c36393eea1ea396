use std::pin::Pin;

use async_trait::async_trait;
use common::{CustomerId, Money, OrderId, ProductId};
use futures_core::Stream;

use crate::entity::{Customer, Order, Product};
use crate::query::{CustomerQuery, OrderQuery, ProductQuery};
use crate::Result;

/// A lazy stream of customer rows.
pub type CustomerStream = Pin<Box<dyn Stream<Item = Result<Customer>> + Send>>;

/// A lazy stream of product rows.
pub type ProductStream = Pin<Box<dyn Stream<Item = Result<Product>> + Send>>;

/// A lazy stream of order rows.
pub type OrderStream = Pin<Box<dyn Stream<Item = Result<Order>> + Send>>;

/// Core trait for entity store implementations.
///
/// The store provides indexed reads, predicate query evaluation, and
/// transactional writes. All implementations must be thread-safe
/// (Send + Sync); read methods see only committed state.
#[async_trait]
pub trait EntityStore: Send + Sync {
    /// Opens a transaction for a group of writes.
    ///
    /// Writes staged on the transaction become visible to readers
    /// atomically at commit; dropping the transaction without committing
    /// discards them.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>>;

    /// Looks up a customer by ID.
    async fn customer(&self, id: CustomerId) -> Result<Option<Customer>>;

    /// Looks up a product by ID.
    async fn product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Looks up an order by ID, including its product association.
    async fn order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Resolves a set of product IDs to rows.
    ///
    /// Unknown IDs are silently dropped and duplicates resolve once, so
    /// the caller can detect a partial resolution by comparing
    /// cardinalities.
    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Returns true if a customer with this exact email exists.
    ///
    /// The comparison is case-sensitive. This is an advisory check; the
    /// unique constraint enforced at commit is authoritative.
    async fn email_exists(&self, email: &str) -> Result<bool>;

    /// Returns the products associated with an order.
    async fn order_products(&self, id: OrderId) -> Result<Vec<Product>>;

    /// Evaluates a customer query, yielding matches ordered by name.
    async fn query_customers(&self, query: CustomerQuery) -> Result<CustomerStream>;

    /// Evaluates a product query, yielding matches ordered by name.
    async fn query_products(&self, query: ProductQuery) -> Result<ProductStream>;

    /// Evaluates an order query, yielding matches ordered by order date
    /// (newest first). Each matching order appears exactly once even
    /// when matched through several associated products.
    async fn query_orders(&self, query: OrderQuery) -> Result<OrderStream>;
}

/// A scoped group of writes that commits or rolls back as a unit.
///
/// Reads through the transaction (`products_for_order`) observe writes
/// staged earlier in the same transaction.
#[async_trait]
pub trait StoreTransaction: Send {
    /// Stages a customer insert.
    ///
    /// Fails with [`crate::StoreError::DuplicateEmail`] if the email is
    /// already taken; the check is repeated authoritatively at commit.
    /// A duplicate failure leaves the transaction usable: subsequent
    /// writes and a final commit still apply, which the bulk creation
    /// path depends on.
    async fn insert_customer(&mut self, customer: &Customer) -> Result<()>;

    /// Stages a product insert.
    async fn insert_product(&mut self, product: &Product) -> Result<()>;

    /// Stages an order insert. The association is set separately via
    /// [`Self::set_order_products`].
    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// Stages the order's product association, replacing any previous
    /// association.
    async fn set_order_products(
        &mut self,
        order_id: OrderId,
        product_ids: &[ProductId],
    ) -> Result<()>;

    /// Reads the products currently associated with an order, including
    /// associations staged in this transaction.
    async fn products_for_order(&mut self, order_id: OrderId) -> Result<Vec<Product>>;

    /// Stages an update of the order's derived total.
    async fn update_order_total(&mut self, order_id: OrderId, total: Money) -> Result<()>;

    /// Commits all staged writes atomically.
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discards all staged writes.
    async fn rollback(self: Box<Self>) -> Result<()>;
}
