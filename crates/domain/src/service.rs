//! The mutation orchestrator.
//!
//! [`RecordService`] sequences validation, store writes, and total
//! aggregation into atomic mutations, and exposes the filter-map query
//! surface. Mutation methods never return an error: every outcome,
//! including infrastructure failures, is converted into a structured
//! [`MutationResult`] / [`BulkMutationResult`].

use common::{CustomerId, Money, OrderId, ProductId};
use entity_store::{
    Customer, CustomerStream, EntityStore, Order, OrderStream, Product, ProductStream, StoreError,
    StoreTransaction,
};
use uuid::Uuid;

use crate::aggregation;
use crate::error::DomainError;
use crate::filter::{self, FilterMap};
use crate::input::{CustomerInput, OrderInput, ProductInput};
use crate::result::{BulkMutationResult, MutationResult};
use crate::validation::{self, ValidationError};

/// The kind of entity addressed by a generic lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Customer,
    Product,
    Order,
}

/// A record returned by a generic lookup.
#[derive(Debug, Clone)]
pub enum Record {
    Customer(Customer),
    Product(Product),
    Order(Order),
}

/// Converts an internal failure into the caller-facing message.
///
/// Validation failures carry their own message. A duplicate-email
/// constraint violation is a validation race, so it reads the same as
/// the advisory check. Everything else is an infrastructure failure
/// reported with its description.
fn failure_message(entity: &str, err: &DomainError) -> String {
    match err {
        DomainError::Validation(e) => e.to_string(),
        DomainError::Store(StoreError::DuplicateEmail { .. }) => {
            ValidationError::EmailExists.to_string()
        }
        DomainError::Store(e) => format!("Error creating {entity}: {e}"),
    }
}

/// Service for managing business records.
///
/// Provides the validated-mutation and compound-query API over an
/// entity store. Each mutation runs as one logical transaction; readers
/// never observe a partially applied mutation.
pub struct RecordService<S: EntityStore> {
    store: S,
}

impl<S: EntityStore> RecordService<S> {
    /// Creates a new record service over the given store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    // Mutations

    /// Creates a customer.
    #[tracing::instrument(skip(self))]
    pub async fn create_customer(&self, input: CustomerInput) -> MutationResult<Customer> {
        match self.try_create_customer(&input).await {
            Ok(customer) => {
                metrics::counter!("customers_created").increment(1);
                MutationResult::created(customer, "Customer created successfully")
            }
            Err(err) => {
                tracing::warn!(error = %err, email = %input.email, "customer creation failed");
                MutationResult::rejected(failure_message("customer", &err))
            }
        }
    }

    async fn try_create_customer(&self, input: &CustomerInput) -> Result<Customer, DomainError> {
        // Advisory uniqueness check; the store constraint at commit is
        // authoritative under concurrency.
        if self.store.email_exists(&input.email).await? {
            return Err(ValidationError::EmailExists.into());
        }
        validation::validate_phone(input.phone.as_deref())?;

        let customer = Customer::new(input.name.clone(), input.email.clone(), input.phone.clone());
        let mut tx = self.store.begin().await?;
        tx.insert_customer(&customer).await?;
        tx.commit().await?;
        Ok(customer)
    }

    /// Creates a batch of customers inside one transaction.
    ///
    /// Items are validated and written independently: a rejected item
    /// contributes an error string and the loop continues, so one bad
    /// item never discards the batch. Only an infrastructure failure
    /// aborts the batch as a whole.
    #[tracing::instrument(skip(self, inputs), fields(count = inputs.len()))]
    pub async fn bulk_create_customers(
        &self,
        inputs: Vec<CustomerInput>,
    ) -> BulkMutationResult<Customer> {
        let mut tx = match self.store.begin().await {
            Ok(tx) => tx,
            Err(e) => return BulkMutationResult::aborted(format!("Transaction failed: {e}")),
        };

        match self.stage_customer_batch(tx.as_mut(), &inputs).await {
            Ok((created, errors)) => match tx.commit().await {
                Ok(()) => {
                    metrics::counter!("customers_created").increment(created.len() as u64);
                    BulkMutationResult::from_outcome(created, errors)
                }
                Err(e) => BulkMutationResult::aborted(format!("Transaction failed: {e}")),
            },
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "bulk rollback failed");
                }
                BulkMutationResult::aborted(format!("Transaction failed: {e}"))
            }
        }
    }

    /// Runs the per-item half of the bulk protocol, staging every valid
    /// customer on the transaction.
    ///
    /// Returns `Err` only for infrastructure failures; per-item
    /// rejections end up in the error list.
    async fn stage_customer_batch(
        &self,
        tx: &mut dyn StoreTransaction,
        inputs: &[CustomerInput],
    ) -> Result<(Vec<Customer>, Vec<String>), StoreError> {
        let mut created: Vec<Customer> = Vec::new();
        let mut errors: Vec<String> = Vec::new();

        for (index, input) in inputs.iter().enumerate() {
            let position = index + 1;

            // Check committed rows and rows staged earlier in this batch.
            let taken = created.iter().any(|c| c.email == input.email)
                || self.store.email_exists(&input.email).await?;
            if taken {
                errors.push(format!("Customer {position}: Email already exists"));
                continue;
            }
            if validation::validate_phone(input.phone.as_deref()).is_err() {
                errors.push(format!("Customer {position}: Invalid phone format"));
                continue;
            }

            let customer =
                Customer::new(input.name.clone(), input.email.clone(), input.phone.clone());
            match tx.insert_customer(&customer).await {
                Ok(()) => created.push(customer),
                Err(StoreError::DuplicateEmail { .. }) => {
                    errors.push(format!("Customer {position}: Email already exists"));
                }
                Err(e) => return Err(e),
            }
        }

        Ok((created, errors))
    }

    /// Creates a product.
    #[tracing::instrument(skip(self))]
    pub async fn create_product(&self, input: ProductInput) -> MutationResult<Product> {
        match self.try_create_product(&input).await {
            Ok(product) => {
                metrics::counter!("products_created").increment(1);
                MutationResult::created(product, "Product created successfully")
            }
            Err(err) => {
                tracing::warn!(error = %err, name = %input.name, "product creation failed");
                MutationResult::rejected(failure_message("product", &err))
            }
        }
    }

    async fn try_create_product(&self, input: &ProductInput) -> Result<Product, DomainError> {
        validation::validate_price(input.price)?;
        let stock = input.stock.unwrap_or(0);
        validation::validate_stock(stock)?;

        let product = Product::new(input.name.clone(), input.price, stock);
        let mut tx = self.store.begin().await?;
        tx.insert_product(&product).await?;
        tx.commit().await?;
        Ok(product)
    }

    /// Creates an order for a customer with an associated product set.
    ///
    /// The creation protocol: resolve the customer, validate and resolve
    /// the product list, then inside a single transaction insert the
    /// order, set the association, and recompute the total. Any failure
    /// after the transaction opens rolls the whole order back; readers
    /// never observe an order without its recomputed total.
    #[tracing::instrument(skip(self))]
    pub async fn create_order(&self, input: OrderInput) -> MutationResult<Order> {
        match self.try_create_order(&input).await {
            Ok(order) => {
                metrics::counter!("orders_created").increment(1);
                MutationResult::created(order, "Order created successfully")
            }
            Err(err) => {
                tracing::warn!(error = %err, customer_id = %input.customer_id, "order creation failed");
                MutationResult::rejected(failure_message("order", &err))
            }
        }
    }

    async fn try_create_order(&self, input: &OrderInput) -> Result<Order, DomainError> {
        if self.store.customer(input.customer_id).await?.is_none() {
            return Err(ValidationError::UnknownCustomer.into());
        }
        validation::validate_order_products(&input.product_ids)?;

        // Duplicate requested IDs collapse to one association row.
        let mut product_ids: Vec<ProductId> = Vec::with_capacity(input.product_ids.len());
        for id in &input.product_ids {
            if !product_ids.contains(id) {
                product_ids.push(*id);
            }
        }
        let resolved = self.store.products_by_ids(&product_ids).await?;
        validation::validate_resolved_products(&input.product_ids, resolved.len())?;

        let order = Order::new(input.customer_id, input.order_date);
        let mut tx = self.store.begin().await?;
        match Self::stage_order(tx.as_mut(), &order, &product_ids).await {
            Ok(_) => {
                tx.commit().await?;
                // Re-read so the returned entity carries the committed
                // association, total, and refreshed timestamps.
                let stored = self.store.order(order.id).await?.ok_or(StoreError::MissingRow {
                    entity: "order",
                    id: order.id.to_string(),
                })?;
                Ok(stored)
            }
            Err(e) => {
                if let Err(rollback_err) = tx.rollback().await {
                    tracing::warn!(error = %rollback_err, "order rollback failed");
                }
                Err(e.into())
            }
        }
    }

    /// Stages the order row, its association, and the recomputed total
    /// on one transaction.
    async fn stage_order(
        tx: &mut dyn StoreTransaction,
        order: &Order,
        product_ids: &[ProductId],
    ) -> Result<Money, StoreError> {
        tx.insert_order(order).await?;
        tx.set_order_products(order.id, product_ids).await?;
        aggregation::recompute_total(tx, order.id).await
    }

    // Queries

    /// Queries customers with a filter map.
    #[tracing::instrument(skip(self, filters))]
    pub async fn customers(&self, filters: &FilterMap) -> Result<CustomerStream, DomainError> {
        Ok(self
            .store
            .query_customers(filter::customer_query(filters))
            .await?)
    }

    /// Queries products with a filter map.
    #[tracing::instrument(skip(self, filters))]
    pub async fn products(&self, filters: &FilterMap) -> Result<ProductStream, DomainError> {
        Ok(self
            .store
            .query_products(filter::product_query(filters))
            .await?)
    }

    /// Queries orders with a filter map.
    #[tracing::instrument(skip(self, filters))]
    pub async fn orders(&self, filters: &FilterMap) -> Result<OrderStream, DomainError> {
        Ok(self.store.query_orders(filter::order_query(filters)).await?)
    }

    /// Looks up a customer by ID.
    pub async fn customer_by_id(&self, id: CustomerId) -> Result<Option<Customer>, DomainError> {
        Ok(self.store.customer(id).await?)
    }

    /// Looks up a product by ID.
    pub async fn product_by_id(&self, id: ProductId) -> Result<Option<Product>, DomainError> {
        Ok(self.store.product(id).await?)
    }

    /// Looks up an order by ID.
    pub async fn order_by_id(&self, id: OrderId) -> Result<Option<Order>, DomainError> {
        Ok(self.store.order(id).await?)
    }

    /// Returns the products associated with an order.
    pub async fn order_products(&self, id: OrderId) -> Result<Vec<Product>, DomainError> {
        Ok(self.store.order_products(id).await?)
    }

    /// Generic lookup by entity kind and raw ID.
    pub async fn record_by_id(
        &self,
        kind: EntityKind,
        id: Uuid,
    ) -> Result<Option<Record>, DomainError> {
        let record = match kind {
            EntityKind::Customer => self
                .store
                .customer(CustomerId::from_uuid(id))
                .await?
                .map(Record::Customer),
            EntityKind::Product => self
                .store
                .product(ProductId::from_uuid(id))
                .await?
                .map(Record::Product),
            EntityKind::Order => self
                .store
                .order(OrderId::from_uuid(id))
                .await?
                .map(Record::Order),
        };
        Ok(record)
    }
}
