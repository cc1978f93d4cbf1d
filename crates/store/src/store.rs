use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{AttemptId, OrderId, ReservationId, UserId};
use domain::{Address, Money, Order, OrderItem, OrderStatus, Product, ProductId};
use serde::{Deserialize, Serialize};

use crate::Result;
use crate::subscription::StatusSubscription;

/// A soft hold on stock for one in-progress checkout attempt.
///
/// A reservation reduces *available* stock without mutating `on_hand`. It is
/// deleted on fulfillment, on explicit release, or by the expiry sweep; a
/// reservation whose `expires_at` has passed is never counted regardless of
/// whether it has been swept yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockReservation {
    /// Row identifier.
    pub id: ReservationId,

    /// The reserved product.
    pub product_id: ProductId,

    /// Units held.
    pub quantity: u32,

    /// The checkout attempt that owns this hold.
    pub attempt_id: AttemptId,

    /// Instant after which the hold no longer counts.
    pub expires_at: DateTime<Utc>,
}

/// Fields of an order to be inserted.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub id: OrderId,
    pub user_id: UserId,
    pub status: OrderStatus,
    pub total_amount: Money,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub authorization_id: Option<String>,
}

/// One line of an order to be inserted alongside it.
#[derive(Debug, Clone)]
pub struct NewOrderItem {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

/// A row-level order status change, as published on the change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub order_id: OrderId,
    pub status: OrderStatus,
}

/// Boundary trait over the relational store owning the commerce tables.
///
/// All implementations must be thread-safe (`Send + Sync`). Conditional
/// operations (`reserve_stock`, `reduce_on_hand`) must be atomic with their
/// predicate: a plain read-then-write pair is unsafe under concurrent
/// checkouts.
#[async_trait]
pub trait CommerceStore: Send + Sync {
    /// Inserts a product, replacing any existing row with the same id.
    async fn upsert_product(&self, product: Product) -> Result<()>;

    /// Fetches a product by id.
    async fn get_product(&self, id: &ProductId) -> Result<Option<Product>>;

    /// Lists all active products.
    async fn list_products(&self) -> Result<Vec<Product>>;

    /// Atomically checks availability and inserts a reservation.
    ///
    /// The predicate is `on_hand - sum(reservations active at now) >=
    /// quantity` for an active product. Fails with
    /// [`StoreError::PredicateFailed`](crate::StoreError::PredicateFailed)
    /// when it does not hold; concurrent calls for the same product must be
    /// linearized so that two of them can never both succeed past the limit.
    async fn reserve_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
        attempt_id: AttemptId,
        now: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Result<StockReservation>;

    /// Sums reservations for a product that are still active at `now`.
    async fn reserved_quantity(&self, product_id: &ProductId, now: DateTime<Utc>) -> Result<u32>;

    /// Deletes all reservations belonging to one checkout attempt.
    ///
    /// Scoped by attempt so one shopper's release can never delete another
    /// shopper's in-flight holds. Returns the number of rows deleted.
    async fn release_attempt(&self, attempt_id: AttemptId) -> Result<u64>;

    /// Deletes reservations whose expiry has passed. Returns the count.
    async fn delete_expired_reservations(&self, now: DateTime<Utc>) -> Result<u64>;

    /// Atomically decrements `on_hand` (failing rather than going negative)
    /// and deletes the attempt's reservation for that product.
    async fn reduce_on_hand(
        &self,
        product_id: &ProductId,
        quantity: u32,
        attempt_id: AttemptId,
    ) -> Result<()>;

    /// Inserts an order and its items as a single transaction.
    async fn insert_order(&self, order: NewOrder, items: Vec<NewOrderItem>) -> Result<Order>;

    /// Fetches an order by id.
    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Fetches the lines of an order.
    async fn order_items(&self, id: OrderId) -> Result<Vec<OrderItem>>;

    /// Lists a customer's orders, most recent first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>>;

    /// Overwrites an order's status, bumps `updated_at`, and publishes the
    /// change on the feed. Does not validate the state machine; that is the
    /// order recorder's job.
    async fn set_order_status(&self, id: OrderId, status: OrderStatus) -> Result<Order>;

    /// Subscribes to status changes for one order.
    ///
    /// Delivery is at-least-once per change; consumers must tolerate
    /// duplicated or coalesced notifications and treat each value as an
    /// overwrite. Dropping the handle cancels the subscription.
    async fn subscribe_order_status(&self, id: OrderId) -> Result<StatusSubscription>;
}
