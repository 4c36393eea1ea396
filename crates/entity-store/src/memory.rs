use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CustomerId, Money, OrderId, ProductId};
use futures_util::stream;
use tokio::sync::RwLock;

use crate::entity::{Customer, Order, Product};
use crate::query::{CustomerQuery, OrderQuery, ProductQuery};
use crate::store::{CustomerStream, EntityStore, OrderStream, ProductStream, StoreTransaction};
use crate::{Result, StoreError};

#[derive(Debug, Clone, Default)]
struct Tables {
    customers: HashMap<CustomerId, Customer>,
    products: HashMap<ProductId, Product>,
    orders: HashMap<OrderId, Order>,
}

impl Tables {
    fn email_taken(&self, email: &str) -> bool {
        // Case-sensitive exact match, like the database unique constraint.
        self.customers.values().any(|c| c.email == email)
    }
}

/// In-memory entity store implementation for testing and embedded use.
///
/// Transactions stage their writes privately and apply them under a
/// single write lock at commit, so readers never observe a partially
/// applied mutation (an order without its association, or an
/// association without its recomputed total).
#[derive(Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of committed customers.
    pub async fn customer_count(&self) -> usize {
        self.tables.read().await.customers.len()
    }

    /// Returns the number of committed orders.
    pub async fn order_count(&self) -> usize {
        self.tables.read().await.orders.len()
    }

    /// Clears all committed rows.
    pub async fn clear(&self) {
        let mut tables = self.tables.write().await;
        tables.customers.clear();
        tables.products.clear();
        tables.orders.clear();
    }
}

#[async_trait]
impl EntityStore for InMemoryStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        Ok(Box::new(MemoryTransaction {
            tables: self.tables.clone(),
            staged: Tables::default(),
        }))
    }

    async fn customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        Ok(self.tables.read().await.customers.get(&id).cloned())
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        let mut seen = Vec::with_capacity(ids.len());
        let mut products = Vec::with_capacity(ids.len());
        for id in ids {
            if seen.contains(id) {
                continue;
            }
            seen.push(*id);
            if let Some(product) = tables.products.get(id) {
                products.push(product.clone());
            }
        }
        Ok(products)
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        Ok(self.tables.read().await.email_taken(email))
    }

    async fn order_products(&self, id: OrderId) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        let Some(order) = tables.orders.get(&id) else {
            return Ok(Vec::new());
        };
        Ok(order
            .product_ids
            .iter()
            .filter_map(|pid| tables.products.get(pid).cloned())
            .collect())
    }

    async fn query_customers(&self, query: CustomerQuery) -> Result<CustomerStream> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Customer> = tables
            .customers
            .values()
            .filter(|c| query.matches(c))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Box::pin(stream::iter(rows.into_iter().map(Ok))))
    }

    async fn query_products(&self, query: ProductQuery) -> Result<ProductStream> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Product> = tables
            .products
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Box::pin(stream::iter(rows.into_iter().map(Ok))))
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<OrderStream> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Order> = Vec::new();
        for order in tables.orders.values() {
            // An order always has an owning customer; a dangling row is
            // simply not a match.
            let Some(customer) = tables.customers.get(&order.customer_id) else {
                continue;
            };
            let products: Vec<Product> = order
                .product_ids
                .iter()
                .filter_map(|pid| tables.products.get(pid).cloned())
                .collect();
            if query.matches(order, customer, &products) {
                rows.push(order.clone());
            }
        }
        rows.sort_by(|a, b| b.order_date.cmp(&a.order_date));
        Ok(Box::pin(stream::iter(rows.into_iter().map(Ok))))
    }
}

/// A transaction over the in-memory store.
pub struct MemoryTransaction {
    tables: Arc<RwLock<Tables>>,
    staged: Tables,
}

impl MemoryTransaction {
    /// Copies the order row into the staged set if it is not there yet,
    /// so updates in this transaction stay invisible until commit.
    async fn stage_order(&mut self, order_id: OrderId) -> Result<()> {
        if self.staged.orders.contains_key(&order_id) {
            return Ok(());
        }
        let committed = self.tables.read().await.orders.get(&order_id).cloned();
        match committed {
            Some(order) => {
                self.staged.orders.insert(order_id, order);
                Ok(())
            }
            None => Err(StoreError::MissingRow {
                entity: "order",
                id: order_id.to_string(),
            }),
        }
    }
}

#[async_trait]
impl StoreTransaction for MemoryTransaction {
    async fn insert_customer(&mut self, customer: &Customer) -> Result<()> {
        if self.staged.email_taken(&customer.email)
            || self.tables.read().await.email_taken(&customer.email)
        {
            return Err(StoreError::DuplicateEmail {
                email: customer.email.clone(),
            });
        }
        self.staged.customers.insert(customer.id, customer.clone());
        Ok(())
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        self.staged.products.insert(product.id, product.clone());
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.staged.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn set_order_products(
        &mut self,
        order_id: OrderId,
        product_ids: &[ProductId],
    ) -> Result<()> {
        self.stage_order(order_id).await?;
        if let Some(order) = self.staged.orders.get_mut(&order_id) {
            order.product_ids = product_ids.to_vec();
            order.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn products_for_order(&mut self, order_id: OrderId) -> Result<Vec<Product>> {
        let tables = self.tables.read().await;
        let product_ids = if let Some(order) = self.staged.orders.get(&order_id) {
            order.product_ids.clone()
        } else if let Some(order) = tables.orders.get(&order_id) {
            order.product_ids.clone()
        } else {
            return Err(StoreError::MissingRow {
                entity: "order",
                id: order_id.to_string(),
            });
        };

        let mut products = Vec::with_capacity(product_ids.len());
        for id in &product_ids {
            if let Some(product) = self
                .staged
                .products
                .get(id)
                .or_else(|| tables.products.get(id))
            {
                products.push(product.clone());
            }
        }
        Ok(products)
    }

    async fn update_order_total(&mut self, order_id: OrderId, total: Money) -> Result<()> {
        self.stage_order(order_id).await?;
        if let Some(order) = self.staged.orders.get_mut(&order_id) {
            order.total_amount = total;
            order.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let staged = self.staged;
        let mut tables = self.tables.write().await;

        // The authoritative uniqueness check: the advisory pre-check at
        // insert time can race with a commit from another transaction.
        for customer in staged.customers.values() {
            if tables
                .customers
                .values()
                .any(|c| c.email == customer.email && c.id != customer.id)
            {
                return Err(StoreError::DuplicateEmail {
                    email: customer.email.clone(),
                });
            }
        }

        tracing::debug!(
            customers = staged.customers.len(),
            products = staged.products.len(),
            orders = staged.orders.len(),
            "committing staged writes"
        );

        tables.customers.extend(staged.customers);
        tables.products.extend(staged.products);
        tables.orders.extend(staged.orders);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        // Staged writes are dropped with the transaction.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::TryStreamExt;

    fn widget(price_cents: i64, stock: i64) -> Product {
        Product::new("Widget", Money::from_cents(price_cents), stock)
    }

    #[tokio::test]
    async fn committed_writes_are_visible() {
        let store = InMemoryStore::new();
        let customer = Customer::new("Ana", "a@x.com", None);

        let mut tx = store.begin().await.unwrap();
        tx.insert_customer(&customer).await.unwrap();
        tx.commit().await.unwrap();

        let found = store.customer(customer.id).await.unwrap();
        assert_eq!(found, Some(customer));
    }

    #[tokio::test]
    async fn uncommitted_writes_are_invisible() {
        let store = InMemoryStore::new();
        let customer = Customer::new("Ana", "a@x.com", None);

        let mut tx = store.begin().await.unwrap();
        tx.insert_customer(&customer).await.unwrap();

        assert_eq!(store.customer_count().await, 0);
        tx.rollback().await.unwrap();
        assert_eq!(store.customer_count().await, 0);
    }

    #[tokio::test]
    async fn duplicate_email_rejected_at_insert() {
        let store = InMemoryStore::new();

        let mut tx = store.begin().await.unwrap();
        tx.insert_customer(&Customer::new("Ana", "a@x.com", None))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        let result = tx
            .insert_customer(&Customer::new("Ana Again", "a@x.com", None))
            .await;
        assert!(matches!(result, Err(StoreError::DuplicateEmail { .. })));
    }

    #[tokio::test]
    async fn transaction_stays_usable_after_duplicate_insert() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_customer(&Customer::new("Taken", "taken@x.com", None))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        // A rejected insert must not poison the batch: later writes on
        // the same transaction still stage and commit.
        let mut tx = store.begin().await.unwrap();
        let result = tx
            .insert_customer(&Customer::new("Dup", "taken@x.com", None))
            .await;
        assert!(matches!(result, Err(StoreError::DuplicateEmail { .. })));

        tx.insert_customer(&Customer::new("Fresh", "fresh@x.com", None))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.customer_count().await, 2);
        assert!(store.email_exists("fresh@x.com").await.unwrap());
    }

    #[tokio::test]
    async fn duplicate_email_race_caught_at_commit() {
        let store = InMemoryStore::new();

        // Both transactions pass the advisory check before either commits.
        let mut tx1 = store.begin().await.unwrap();
        let mut tx2 = store.begin().await.unwrap();
        tx1.insert_customer(&Customer::new("First", "race@x.com", None))
            .await
            .unwrap();
        tx2.insert_customer(&Customer::new("Second", "race@x.com", None))
            .await
            .unwrap();

        tx1.commit().await.unwrap();
        let result = tx2.commit().await;
        assert!(matches!(result, Err(StoreError::DuplicateEmail { .. })));
        assert_eq!(store.customer_count().await, 1);
    }

    #[tokio::test]
    async fn email_check_is_case_sensitive() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_customer(&Customer::new("Ana", "a@x.com", None))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        assert!(store.email_exists("a@x.com").await.unwrap());
        assert!(!store.email_exists("A@X.COM").await.unwrap());
    }

    #[tokio::test]
    async fn transaction_reads_see_staged_association() {
        let store = InMemoryStore::new();
        let customer = Customer::new("Ana", "a@x.com", None);
        let p1 = widget(1000, 5);
        let p2 = widget(550, 5);
        let order = Order::new(customer.id, None);

        let mut tx = store.begin().await.unwrap();
        tx.insert_customer(&customer).await.unwrap();
        tx.insert_product(&p1).await.unwrap();
        tx.insert_product(&p2).await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.set_order_products(order.id, &[p1.id, p2.id])
            .await
            .unwrap();

        let products = tx.products_for_order(order.id).await.unwrap();
        assert_eq!(products.len(), 2);

        tx.update_order_total(order.id, Money::from_cents(1550))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let stored = store.order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.total_amount, Money::from_cents(1550));
        assert_eq!(stored.product_ids, vec![p1.id, p2.id]);
    }

    #[tokio::test]
    async fn setting_products_on_missing_order_fails() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        let result = tx.set_order_products(OrderId::new(), &[]).await;
        assert!(matches!(result, Err(StoreError::MissingRow { .. })));
    }

    #[tokio::test]
    async fn products_by_ids_drops_unknown_and_duplicate_ids() {
        let store = InMemoryStore::new();
        let p1 = widget(1000, 5);

        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&p1).await.unwrap();
        tx.commit().await.unwrap();

        let resolved = store
            .products_by_ids(&[p1.id, p1.id, ProductId::new()])
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, p1.id);
    }

    #[tokio::test]
    async fn customers_are_ordered_by_name() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_customer(&Customer::new("Zoe", "z@x.com", None))
            .await
            .unwrap();
        tx.insert_customer(&Customer::new("Ana", "a@x.com", None))
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let rows: Vec<Customer> = store
            .query_customers(CustomerQuery::new())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let names: Vec<&str> = rows.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Ana", "Zoe"]);
    }

    #[tokio::test]
    async fn orders_are_ordered_newest_first() {
        let store = InMemoryStore::new();
        let customer = Customer::new("Ana", "a@x.com", None);
        let older = Order::new(customer.id, Some(Utc::now() - chrono::Duration::days(2)));
        let newer = Order::new(customer.id, None);

        let mut tx = store.begin().await.unwrap();
        tx.insert_customer(&customer).await.unwrap();
        tx.insert_order(&older).await.unwrap();
        tx.insert_order(&newer).await.unwrap();
        tx.commit().await.unwrap();

        let rows: Vec<Order> = store
            .query_orders(OrderQuery::new())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows[0].id, newer.id);
        assert_eq!(rows[1].id, older.id);
    }

    #[tokio::test]
    async fn repeated_query_returns_same_set() {
        let store = InMemoryStore::new();
        let mut tx = store.begin().await.unwrap();
        tx.insert_product(&widget(1000, 5)).await.unwrap();
        tx.insert_product(&widget(550, 12)).await.unwrap();
        tx.commit().await.unwrap();

        let query = ProductQuery::new().low_stock();
        let first: Vec<Product> = store
            .query_products(query.clone())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        let second: Vec<Product> = store
            .query_products(query)
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 1);
    }
}
