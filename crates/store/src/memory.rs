use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AttemptId, OrderId, ReservationId, UserId};
use domain::{Order, OrderItem, OrderStatus, Product, ProductId};
use tokio::sync::{RwLock, broadcast, mpsc};

use crate::store::{CommerceStore, NewOrder, NewOrderItem, StockReservation};
use crate::subscription::StatusSubscription;
use crate::{Result, StoreError};

const FEED_CAPACITY: usize = 16;

#[derive(Default)]
struct Inner {
    products: HashMap<ProductId, Product>,
    reservations: Vec<StockReservation>,
    orders: HashMap<OrderId, Order>,
    items: HashMap<OrderId, Vec<OrderItem>>,
    feeds: HashMap<OrderId, broadcast::Sender<OrderStatus>>,
    faults_remaining: u32,
}

impl Inner {
    fn take_fault(&mut self) -> Result<()> {
        if self.faults_remaining > 0 {
            self.faults_remaining -= 1;
            return Err(StoreError::Unavailable(
                "injected store fault".to_string(),
            ));
        }
        Ok(())
    }

    fn active_reserved(&self, product_id: &ProductId, now: DateTime<Utc>) -> u64 {
        self.reservations
            .iter()
            .filter(|r| &r.product_id == product_id && r.expires_at > now)
            .map(|r| u64::from(r.quantity))
            .sum()
    }
}

/// In-memory commerce store for tests and the demo binary.
///
/// A single write lock around the whole state is what makes
/// `reserve_stock` and `reduce_on_hand` atomic with their predicates; the
/// PostgreSQL implementation gets the same guarantee from row locking.
#[derive(Clone, Default)]
pub struct InMemoryCommerceStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryCommerceStore {
    /// Creates a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `count` operations fail with a transient error.
    pub async fn inject_unavailable(&self, count: u32) {
        self.inner.write().await.faults_remaining = count;
    }

    /// Returns the total number of reservation rows, expired ones included.
    pub async fn reservation_count(&self) -> usize {
        self.inner.read().await.reservations.len()
    }

    /// Returns the number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.inner.read().await.orders.len()
    }
}

#[async_trait]
impl CommerceStore for InMemoryCommerceStore {
    async fn upsert_product(&self, product: Product) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.take_fault()?;
        inner.products.insert(product.id.clone(), product);
        Ok(())
    }

    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>> {
        let mut inner = self.inner.write().await;
        inner.take_fault()?;
        Ok(inner.products.get(id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>> {
        let mut inner = self.inner.write().await;
        inner.take_fault()?;
        let mut products: Vec<_> = inner
            .products
            .values()
            .filter(|p| p.is_active)
            .cloned()
            .collect();
        products.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));
        Ok(products)
    }

    async fn reserve_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
        attempt_id: AttemptId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<StockReservation> {
        // Check and insert under one write lock: this is the linearization
        // point for concurrent reservations on the same product.
        let mut inner = self.inner.write().await;
        inner.take_fault()?;

        let product = inner
            .products
            .get(product_id)
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;
        if !product.is_active {
            return Err(StoreError::PredicateFailed(format!(
                "product {} is inactive",
                product_id
            )));
        }

        let on_hand = u64::from(product.on_hand);
        let reserved = inner.active_reserved(product_id, now);
        if on_hand.saturating_sub(reserved) < u64::from(quantity) {
            return Err(StoreError::PredicateFailed(format!(
                "insufficient available stock for {}",
                product_id
            )));
        }

        let reservation = StockReservation {
            id: ReservationId::new(),
            product_id: product_id.clone(),
            quantity,
            attempt_id,
            expires_at,
        };
        inner.reservations.push(reservation.clone());
        Ok(reservation)
    }

    async fn reserved_quantity(&self, product_id: &ProductId, now: DateTime<Utc>) -> Result<u32> {
        let mut inner = self.inner.write().await;
        inner.take_fault()?;
        let total = inner.active_reserved(product_id, now);
        u32::try_from(total).map_err(|_| StoreError::InvalidRow("reserved sum overflow".to_string()))
    }

    async fn release_attempt(&self, attempt_id: AttemptId) -> Result<u64> {
        let mut inner = self.inner.write().await;
        inner.take_fault()?;
        let before = inner.reservations.len();
        inner.reservations.retain(|r| r.attempt_id != attempt_id);
        Ok((before - inner.reservations.len()) as u64)
    }

    async fn delete_expired_reservations(&self, now: DateTime<Utc>) -> Result<u64> {
        let mut inner = self.inner.write().await;
        inner.take_fault()?;
        let before = inner.reservations.len();
        inner.reservations.retain(|r| r.expires_at > now);
        Ok((before - inner.reservations.len()) as u64)
    }

    async fn reduce_on_hand(
        &self,
        product_id: &ProductId,
        quantity: u32,
        attempt_id: AttemptId,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        inner.take_fault()?;

        let product = inner
            .products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::ProductNotFound(product_id.clone()))?;
        if product.on_hand < quantity {
            return Err(StoreError::PredicateFailed(format!(
                "decrement of {} would take {} below zero",
                quantity, product_id
            )));
        }
        product.on_hand -= quantity;
        inner
            .reservations
            .retain(|r| !(r.attempt_id == attempt_id && &r.product_id == product_id));
        Ok(())
    }

    async fn insert_order(&self, order: NewOrder, items: Vec<NewOrderItem>) -> Result<Order> {
        let mut inner = self.inner.write().await;
        inner.take_fault()?;

        let now = Utc::now();
        let record = Order {
            id: order.id,
            user_id: order.user_id,
            status: order.status,
            total_amount: order.total_amount,
            shipping_address: order.shipping_address,
            billing_address: order.billing_address,
            authorization_id: order.authorization_id,
            created_at: now,
            updated_at: now,
        };
        let lines = items
            .into_iter()
            .map(|i| OrderItem {
                order_id: order.id,
                product_id: i.product_id,
                quantity: i.quantity,
                unit_price: i.unit_price,
            })
            .collect();

        inner.orders.insert(order.id, record.clone());
        inner.items.insert(order.id, lines);
        Ok(record)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        let mut inner = self.inner.write().await;
        inner.take_fault()?;
        Ok(inner.orders.get(&id).cloned())
    }

    async fn order_items(&self, id: OrderId) -> Result<Vec<OrderItem>> {
        let mut inner = self.inner.write().await;
        inner.take_fault()?;
        Ok(inner.items.get(&id).cloned().unwrap_or_default())
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        let mut inner = self.inner.write().await;
        inner.take_fault()?;
        let mut orders: Vec<_> = inner
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn set_order_status(&self, id: OrderId, status: OrderStatus) -> Result<Order> {
        let mut inner = self.inner.write().await;
        inner.take_fault()?;

        let order = inner
            .orders
            .get_mut(&id)
            .ok_or(StoreError::OrderNotFound(id))?;
        order.status = status;
        order.updated_at = Utc::now();
        let updated = order.clone();

        if let Some(feed) = inner.feeds.get(&id) {
            // A send error only means no live subscribers.
            let _ = feed.send(status);
        }
        Ok(updated)
    }

    async fn subscribe_order_status(&self, id: OrderId) -> Result<StatusSubscription> {
        let mut feed_rx = {
            let mut inner = self.inner.write().await;
            inner.take_fault()?;
            inner
                .feeds
                .entry(id)
                .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
                .subscribe()
        };

        let (tx, rx) = mpsc::channel(FEED_CAPACITY);
        let forwarder = tokio::spawn(async move {
            loop {
                match feed_rx.recv().await {
                    Ok(status) => {
                        if tx.send(status).await.is_err() {
                            break;
                        }
                    }
                    // Lagging coalesces missed changes; the next value is
                    // still the current status.
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(StatusSubscription::with_forwarder(rx, forwarder))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domain::{Address, Money};

    fn product(id: &str, on_hand: u32) -> Product {
        Product::new(id, format!("Product {}", id), Money::from_cents(1000), on_hand)
    }

    async fn seeded() -> InMemoryCommerceStore {
        let store = InMemoryCommerceStore::new();
        store.upsert_product(product("AQ-1", 5)).await.unwrap();
        store
    }

    fn new_order(user_id: UserId) -> NewOrder {
        NewOrder {
            id: OrderId::new(),
            user_id,
            status: OrderStatus::Paid,
            total_amount: Money::from_cents(2000),
            shipping_address: Address::parse("1 Main St").unwrap(),
            billing_address: Address::parse("1 Main St").unwrap(),
            authorization_id: Some("auth_1".to_string()),
        }
    }

    #[tokio::test]
    async fn reserve_within_available_stock() {
        let store = seeded().await;
        let now = Utc::now();
        let r = store
            .reserve_stock(&"AQ-1".into(), 3, AttemptId::new(), now, now + Duration::minutes(15))
            .await
            .unwrap();
        assert_eq!(r.quantity, 3);
        assert_eq!(store.reserved_quantity(&"AQ-1".into(), now).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn reserve_beyond_available_stock_fails() {
        let store = seeded().await;
        let now = Utc::now();
        let expires = now + Duration::minutes(15);
        store
            .reserve_stock(&"AQ-1".into(), 4, AttemptId::new(), now, expires)
            .await
            .unwrap();

        let err = store
            .reserve_stock(&"AQ-1".into(), 2, AttemptId::new(), now, expires)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PredicateFailed(_)));
    }

    #[tokio::test]
    async fn expired_reservations_are_not_counted() {
        let store = seeded().await;
        let now = Utc::now();
        // Insert a hold that is already past its expiry.
        store
            .reserve_stock(&"AQ-1".into(), 5, AttemptId::new(), now - Duration::minutes(20), now - Duration::minutes(5))
            .await
            .unwrap();

        assert_eq!(store.reserved_quantity(&"AQ-1".into(), now).await.unwrap(), 0);
        // Full stock is available again without any sweep having run.
        store
            .reserve_stock(&"AQ-1".into(), 5, AttemptId::new(), now, now + Duration::minutes(15))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn concurrent_reservations_never_oversell() {
        let store = InMemoryCommerceStore::new();
        store.upsert_product(product("AQ-LAST", 1)).await.unwrap();
        let now = Utc::now();
        let expires = now + Duration::minutes(15);

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .reserve_stock(&"AQ-LAST".into(), 1, AttemptId::new(), now, expires)
                    .await
            }));
        }

        let mut won = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                won += 1;
            }
        }
        assert_eq!(won, 1);
    }

    #[tokio::test]
    async fn release_is_scoped_to_the_attempt() {
        let store = seeded().await;
        let now = Utc::now();
        let expires = now + Duration::minutes(15);
        let mine = AttemptId::new();
        let theirs = AttemptId::new();

        store.reserve_stock(&"AQ-1".into(), 2, mine, now, expires).await.unwrap();
        store.reserve_stock(&"AQ-1".into(), 2, theirs, now, expires).await.unwrap();

        assert_eq!(store.release_attempt(mine).await.unwrap(), 1);
        // The other shopper's hold survives.
        assert_eq!(store.reserved_quantity(&"AQ-1".into(), now).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn reduce_on_hand_clears_the_attempts_hold() {
        let store = seeded().await;
        let now = Utc::now();
        let attempt = AttemptId::new();
        store
            .reserve_stock(&"AQ-1".into(), 2, attempt, now, now + Duration::minutes(15))
            .await
            .unwrap();

        store.reduce_on_hand(&"AQ-1".into(), 2, attempt).await.unwrap();

        let product = store.get_product(&"AQ-1".into()).await.unwrap().unwrap();
        assert_eq!(product.on_hand, 3);
        assert_eq!(store.reservation_count().await, 0);
    }

    #[tokio::test]
    async fn reduce_on_hand_never_goes_negative() {
        let store = seeded().await;
        let err = store
            .reduce_on_hand(&"AQ-1".into(), 6, AttemptId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::PredicateFailed(_)));

        let product = store.get_product(&"AQ-1".into()).await.unwrap().unwrap();
        assert_eq!(product.on_hand, 5);
    }

    #[tokio::test]
    async fn sweep_deletes_only_expired_rows() {
        let store = seeded().await;
        let now = Utc::now();
        store
            .reserve_stock(&"AQ-1".into(), 1, AttemptId::new(), now - Duration::minutes(30), now - Duration::minutes(10))
            .await
            .unwrap();
        store
            .reserve_stock(&"AQ-1".into(), 1, AttemptId::new(), now, now + Duration::minutes(15))
            .await
            .unwrap();

        assert_eq!(store.delete_expired_reservations(now).await.unwrap(), 1);
        assert_eq!(store.reservation_count().await, 1);
    }

    #[tokio::test]
    async fn order_roundtrip_with_items() {
        let store = seeded().await;
        let user = UserId::new();
        let order = store
            .insert_order(
                new_order(user),
                vec![NewOrderItem {
                    product_id: "AQ-1".into(),
                    quantity: 2,
                    unit_price: Money::from_cents(1000),
                }],
            )
            .await
            .unwrap();

        let fetched = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(fetched.status, OrderStatus::Paid);

        let items = store.order_items(order.id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].quantity, 2);

        let mine = store.orders_for_user(user).await.unwrap();
        assert_eq!(mine.len(), 1);
    }

    #[tokio::test]
    async fn status_change_reaches_subscribers() {
        let store = seeded().await;
        let order = store.insert_order(new_order(UserId::new()), vec![]).await.unwrap();

        let mut sub = store.subscribe_order_status(order.id).await.unwrap();
        store.set_order_status(order.id, OrderStatus::Processing).await.unwrap();
        store.set_order_status(order.id, OrderStatus::Shipped).await.unwrap();

        assert_eq!(sub.next_status().await, Some(OrderStatus::Processing));
        assert_eq!(sub.next_status().await, Some(OrderStatus::Shipped));
    }

    #[tokio::test]
    async fn injected_faults_are_transient_and_bounded() {
        let store = seeded().await;
        store.inject_unavailable(1).await;

        let err = store.get_product(&"AQ-1".into()).await.unwrap_err();
        assert!(err.is_transient());
        // The next call goes through.
        assert!(store.get_product(&"AQ-1".into()).await.unwrap().is_some());
    }
}
