//! The aggregation engine.
//!
//! An order's `total_amount` is derived state: it must equal the exact
//! sum of the prices of the currently associated products. There is no
//! implicit save hook; the orchestrator calls [`recompute_total`]
//! explicitly after every association change, inside the same
//! transaction as the change itself.

use common::{Money, OrderId};
use entity_store::{Product, StoreError, StoreTransaction};

/// Sums product prices with exact fixed-point arithmetic.
pub fn order_total(products: &[Product]) -> Money {
    products.iter().map(|p| p.price).sum()
}

/// Recomputes and persists an order's total from its current
/// association, as staged in the given transaction.
///
/// Idempotent: a second call with no association change writes the same
/// total.
pub async fn recompute_total(
    tx: &mut dyn StoreTransaction,
    order_id: OrderId,
) -> Result<Money, StoreError> {
    let products = tx.products_for_order(order_id).await?;
    let total = order_total(&products);
    tx.update_order_total(order_id, total).await?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use entity_store::{Customer, EntityStore, InMemoryStore, Order};

    #[test]
    fn total_of_no_products_is_zero() {
        assert_eq!(order_total(&[]), Money::zero());
    }

    #[test]
    fn total_sums_prices_exactly() {
        let products = vec![
            Product::new("A", Money::from_cents(1000), 0),
            Product::new("B", Money::from_cents(550), 0),
        ];
        assert_eq!(order_total(&products), Money::from_cents(1550));
    }

    #[tokio::test]
    async fn recompute_persists_the_association_sum() {
        let store = InMemoryStore::new();
        let customer = Customer::new("Ana", "a@x.com", None);
        let p1 = Product::new("Widget", Money::from_cents(1000), 5);
        let p2 = Product::new("Gadget", Money::from_cents(550), 5);
        let order = Order::new(customer.id, None);

        let mut tx = store.begin().await.unwrap();
        tx.insert_customer(&customer).await.unwrap();
        tx.insert_product(&p1).await.unwrap();
        tx.insert_product(&p2).await.unwrap();
        tx.insert_order(&order).await.unwrap();
        tx.set_order_products(order.id, &[p1.id, p2.id])
            .await
            .unwrap();

        let total = recompute_total(tx.as_mut(), order.id).await.unwrap();
        assert_eq!(total, Money::from_cents(1550));

        // Idempotent with no association change.
        let again = recompute_total(tx.as_mut(), order.id).await.unwrap();
        assert_eq!(again, total);

        tx.commit().await.unwrap();
        let stored = store.order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.total_amount, Money::from_cents(1550));
    }
}
