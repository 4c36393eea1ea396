use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use common::{CustomerId, Money, OrderId, ProductId};
use futures_util::stream;
use sqlx::{PgPool, Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use crate::entity::{Customer, Order, Product};
use crate::query::{CustomerQuery, LOW_STOCK_THRESHOLD, OrderQuery, ProductQuery};
use crate::store::{CustomerStream, EntityStore, OrderStream, ProductStream, StoreTransaction};
use crate::{Result, StoreError};

const CUSTOMER_COLUMNS: &str = "id, name, email, phone, created_at, updated_at";
const PRODUCT_COLUMNS: &str = "id, name, price_cents, stock, created_at, updated_at";

fn like_pattern(value: &str) -> String {
    let escaped = value
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{escaped}%")
}

/// PostgreSQL-backed entity store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Creates a new PostgreSQL entity store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_customer(row: PgRow) -> Result<Customer> {
        Ok(Customer {
            id: CustomerId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            price: Money::from_cents(row.try_get("price_cents")?),
            stock: row.try_get("stock")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: PgRow, product_ids: Vec<ProductId>) -> Result<Order> {
        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            customer_id: CustomerId::from_uuid(row.try_get::<Uuid, _>("customer_id")?),
            product_ids,
            total_amount: Money::from_cents(row.try_get("total_cents")?),
            order_date: row.try_get("order_date")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    /// Loads the product associations for a set of orders in one round
    /// trip.
    async fn load_associations(
        &self,
        order_ids: &[Uuid],
    ) -> Result<HashMap<OrderId, Vec<ProductId>>> {
        let rows = sqlx::query(
            "SELECT order_id, product_id FROM order_products WHERE order_id = ANY($1)",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut associations: HashMap<OrderId, Vec<ProductId>> = HashMap::new();
        for row in rows {
            let order_id = OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?);
            let product_id = ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?);
            associations.entry(order_id).or_default().push(product_id);
        }
        Ok(associations)
    }
}

#[async_trait]
impl EntityStore for PostgresStore {
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PostgresTransaction { tx }))
    }

    async fn customer(&self, id: CustomerId) -> Result<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_customer).transpose()
    }

    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        let row = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_product).transpose()
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(
            "SELECT id, customer_id, total_cents, order_date, created_at, updated_at \
             FROM orders WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut associations = self.load_associations(&[id.as_uuid()]).await?;
        let product_ids = associations.remove(&id).unwrap_or_default();
        Ok(Some(Self::row_to_order(row, product_ids)?))
    }

    async fn products_by_ids(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"
        ))
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn email_exists(&self, email: &str) -> Result<bool> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM customers WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn order_products(&self, id: OrderId) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            "SELECT p.id, p.name, p.price_cents, p.stock, p.created_at, p.updated_at \
             FROM products p \
             JOIN order_products op ON op.product_id = p.id \
             WHERE op.order_id = $1 ORDER BY p.name",
        )
        .bind(id.as_uuid())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn query_customers(&self, query: CustomerQuery) -> Result<CustomerStream> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE TRUE"
        ));
        if let Some(v) = &query.name_contains {
            builder.push(" AND name ILIKE ").push_bind(like_pattern(v));
        }
        if let Some(v) = &query.email_contains {
            builder.push(" AND email ILIKE ").push_bind(like_pattern(v));
        }
        if let Some(t) = query.created_at {
            builder.push(" AND created_at = ").push_bind(t);
        }
        if let Some(t) = query.created_at_gte {
            builder.push(" AND created_at >= ").push_bind(t);
        }
        if let Some(t) = query.created_at_lte {
            builder.push(" AND created_at <= ").push_bind(t);
        }
        if let Some(v) = &query.phone_contains {
            builder.push(" AND phone ILIKE ").push_bind(like_pattern(v));
        }
        builder.push(" ORDER BY name");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let customers: Vec<Customer> = rows
            .into_iter()
            .map(Self::row_to_customer)
            .collect::<Result<_>>()?;
        Ok(Box::pin(stream::iter(customers.into_iter().map(Ok))))
    }

    async fn query_products(&self, query: ProductQuery) -> Result<ProductStream> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PRODUCT_COLUMNS} FROM products WHERE TRUE"
        ));
        if let Some(v) = &query.name_contains {
            builder.push(" AND name ILIKE ").push_bind(like_pattern(v));
        }
        if let Some(p) = query.price {
            builder.push(" AND price_cents = ").push_bind(p.cents());
        }
        if let Some(p) = query.price_gte {
            builder.push(" AND price_cents >= ").push_bind(p.cents());
        }
        if let Some(p) = query.price_lte {
            builder.push(" AND price_cents <= ").push_bind(p.cents());
        }
        if let Some(s) = query.stock {
            builder.push(" AND stock = ").push_bind(s);
        }
        if let Some(s) = query.stock_gte {
            builder.push(" AND stock >= ").push_bind(s);
        }
        if let Some(s) = query.stock_lte {
            builder.push(" AND stock <= ").push_bind(s);
        }
        if query.low_stock {
            builder.push(" AND stock < ").push_bind(LOW_STOCK_THRESHOLD);
        }
        builder.push(" ORDER BY name");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let products: Vec<Product> = rows
            .into_iter()
            .map(Self::row_to_product)
            .collect::<Result<_>>()?;
        Ok(Box::pin(stream::iter(products.into_iter().map(Ok))))
    }

    async fn query_orders(&self, query: OrderQuery) -> Result<OrderStream> {
        // DISTINCT keeps an order matched through several associated
        // products from appearing more than once.
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT DISTINCT o.id, o.customer_id, o.total_cents, o.order_date, \
             o.created_at, o.updated_at \
             FROM orders o JOIN customers c ON c.id = o.customer_id",
        );
        if query.joins_products() {
            builder.push(
                " LEFT JOIN order_products op ON op.order_id = o.id \
                 LEFT JOIN products p ON p.id = op.product_id",
            );
        }
        builder.push(" WHERE TRUE");
        if let Some(m) = query.total_amount {
            builder.push(" AND o.total_cents = ").push_bind(m.cents());
        }
        if let Some(m) = query.total_amount_gte {
            builder.push(" AND o.total_cents >= ").push_bind(m.cents());
        }
        if let Some(m) = query.total_amount_lte {
            builder.push(" AND o.total_cents <= ").push_bind(m.cents());
        }
        if let Some(t) = query.order_date {
            builder.push(" AND o.order_date = ").push_bind(t);
        }
        if let Some(t) = query.order_date_gte {
            builder.push(" AND o.order_date >= ").push_bind(t);
        }
        if let Some(t) = query.order_date_lte {
            builder.push(" AND o.order_date <= ").push_bind(t);
        }
        if let Some(v) = &query.customer_name_contains {
            builder.push(" AND c.name ILIKE ").push_bind(like_pattern(v));
        }
        if let Some(v) = &query.customer_email_contains {
            builder
                .push(" AND c.email ILIKE ")
                .push_bind(like_pattern(v));
        }
        if let Some(v) = &query.product_name_contains {
            builder.push(" AND p.name ILIKE ").push_bind(like_pattern(v));
        }
        if let Some(id) = query.product_id {
            builder.push(" AND op.product_id = ").push_bind(id.as_uuid());
        }
        builder.push(" ORDER BY o.order_date DESC");

        let rows = builder.build().fetch_all(&self.pool).await?;
        let order_uuids: Vec<Uuid> = rows
            .iter()
            .map(|row| row.try_get::<Uuid, _>("id"))
            .collect::<std::result::Result<_, _>>()?;
        let mut associations = self.load_associations(&order_uuids).await?;

        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let order_id = OrderId::from_uuid(row.try_get::<Uuid, _>("id")?);
            let product_ids = associations.remove(&order_id).unwrap_or_default();
            orders.push(Self::row_to_order(row, product_ids)?);
        }
        Ok(Box::pin(stream::iter(orders.into_iter().map(Ok))))
    }
}

/// A transaction over the PostgreSQL store.
///
/// Dropping the transaction without committing rolls it back.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn insert_customer(&mut self, customer: &Customer) -> Result<()> {
        // A unique violation puts the enclosing Postgres transaction
        // into the aborted state; the savepoint confines the failure to
        // this insert so callers can keep using the transaction after a
        // DuplicateEmail, as the trait contract requires.
        sqlx::query("SAVEPOINT customer_insert")
            .execute(&mut *self.tx)
            .await?;

        let inserted = sqlx::query(
            "INSERT INTO customers (id, name, email, phone, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(customer.id.as_uuid())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(customer.created_at)
        .bind(customer.updated_at)
        .execute(&mut *self.tx)
        .await;

        match inserted {
            Ok(_) => {
                sqlx::query("RELEASE SAVEPOINT customer_insert")
                    .execute(&mut *self.tx)
                    .await?;
                Ok(())
            }
            Err(e) => {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.constraint() == Some("customers_email_key")
                {
                    sqlx::query("ROLLBACK TO SAVEPOINT customer_insert")
                        .execute(&mut *self.tx)
                        .await?;
                    return Err(StoreError::DuplicateEmail {
                        email: customer.email.clone(),
                    });
                }
                Err(StoreError::Database(e))
            }
        }
    }

    async fn insert_product(&mut self, product: &Product) -> Result<()> {
        sqlx::query(
            "INSERT INTO products (id, name, price_cents, stock, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(product.price.cents())
        .bind(product.stock)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        sqlx::query(
            "INSERT INTO orders (id, customer_id, total_cents, order_date, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(order.id.as_uuid())
        .bind(order.customer_id.as_uuid())
        .bind(order.total_amount.cents())
        .bind(order.order_date)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn set_order_products(
        &mut self,
        order_id: OrderId,
        product_ids: &[ProductId],
    ) -> Result<()> {
        sqlx::query("DELETE FROM order_products WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;

        for product_id in product_ids {
            sqlx::query(
                "INSERT INTO order_products (order_id, product_id) VALUES ($1, $2) \
                 ON CONFLICT DO NOTHING",
            )
            .bind(order_id.as_uuid())
            .bind(product_id.as_uuid())
            .execute(&mut *self.tx)
            .await?;
        }

        let touched = sqlx::query("UPDATE orders SET updated_at = $2 WHERE id = $1")
            .bind(order_id.as_uuid())
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await?;
        if touched.rows_affected() == 0 {
            return Err(StoreError::MissingRow {
                entity: "order",
                id: order_id.to_string(),
            });
        }
        Ok(())
    }

    async fn products_for_order(&mut self, order_id: OrderId) -> Result<Vec<Product>> {
        let rows = sqlx::query(
            "SELECT p.id, p.name, p.price_cents, p.stock, p.created_at, p.updated_at \
             FROM products p \
             JOIN order_products op ON op.product_id = p.id \
             WHERE op.order_id = $1",
        )
        .bind(order_id.as_uuid())
        .fetch_all(&mut *self.tx)
        .await?;
        rows.into_iter().map(PostgresStore::row_to_product).collect()
    }

    async fn update_order_total(&mut self, order_id: OrderId, total: Money) -> Result<()> {
        let updated = sqlx::query("UPDATE orders SET total_cents = $2, updated_at = $3 WHERE id = $1")
            .bind(order_id.as_uuid())
            .bind(total.cents())
            .bind(Utc::now())
            .execute(&mut *self.tx)
            .await?;
        if updated.rows_affected() == 0 {
            return Err(StoreError::MissingRow {
                entity: "order",
                id: order_id.to_string(),
            });
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("widget"), "%widget%");
        assert_eq!(like_pattern("50%"), "%50\\%%");
        assert_eq!(like_pattern("a_b"), "%a\\_b%");
        assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
    }
}
