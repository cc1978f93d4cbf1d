//! Order recorder: durable order records and the status state machine.

use common::{OrderId, UserId};
use domain::{Address, DomainError, Money, Order, OrderItem, OrderStatus, ProductId};
use store::{CommerceStore, NewOrder, NewOrderItem, StatusSubscription};

use crate::error::{CheckoutError, Result};
use crate::retry::{RetryConfig, with_retry};

/// A cart line priced from the catalog at confirmation time.
///
/// The unit price here is the server-known price; it is copied into the
/// order line so later catalog changes never alter the record.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product_id: ProductId,
    pub quantity: u32,
    pub unit_price: Money,
}

impl PricedLine {
    fn line_total(&self) -> Money {
        self.unit_price * self.quantity
    }
}

/// Creates and tracks immutable order records.
///
/// Orders are created exactly once, after payment confirmation, with status
/// `paid`; afterwards only `status` and `updated_at` ever change, and only
/// along the forward transitions of the state machine.
#[derive(Clone)]
pub struct OrderRecorder<S> {
    store: S,
    retry: RetryConfig,
}

impl<S: CommerceStore> OrderRecorder<S> {
    /// Creates a recorder over the given store.
    pub fn new(store: S) -> Self {
        Self {
            store,
            retry: RetryConfig::default(),
        }
    }

    /// Persists a paid order and its lines as one logical transaction.
    ///
    /// The total is computed here from the priced lines; no client-supplied
    /// total exists anywhere in the flow.
    #[tracing::instrument(skip(self, lines, shipping_address, billing_address, authorization_id))]
    pub async fn create_order(
        &self,
        user_id: UserId,
        lines: &[PricedLine],
        shipping_address: Address,
        billing_address: Address,
        authorization_id: String,
    ) -> Result<Order> {
        let total: Money = lines.iter().map(PricedLine::line_total).sum();
        let order = NewOrder {
            id: OrderId::new(),
            user_id,
            status: OrderStatus::Paid,
            total_amount: total,
            shipping_address,
            billing_address,
            authorization_id: Some(authorization_id),
        };
        let items = lines
            .iter()
            .map(|line| NewOrderItem {
                product_id: line.product_id.clone(),
                quantity: line.quantity,
                unit_price: line.unit_price,
            })
            .collect();

        // No retry wrapper: a retried insert that actually committed would
        // hit its own primary key, not create a duplicate order.
        let order = self.store.insert_order(order, items).await?;
        metrics::counter!("orders_created").increment(1);
        tracing::info!(order_id = %order.id, total = %order.total_amount, "order recorded");
        Ok(order)
    }

    /// Transitions an order's status.
    ///
    /// Only forward transitions are allowed; anything else is a caller bug,
    /// logged and rejected without touching the record.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(&self, order_id: OrderId, new_status: OrderStatus) -> Result<Order> {
        let order = self
            .get_order(order_id)
            .await?
            .ok_or(CheckoutError::OrderNotFound(order_id))?;

        if !order.status.can_transition_to(new_status) {
            tracing::warn!(
                %order_id,
                from = %order.status,
                to = %new_status,
                "rejected invalid status transition"
            );
            return Err(CheckoutError::Domain(DomainError::InvalidStatusTransition {
                from: order.status.to_string(),
                to: new_status.to_string(),
            }));
        }

        let updated = self.store.set_order_status(order_id, new_status).await?;
        metrics::counter!("order_status_transitions").increment(1);
        Ok(updated)
    }

    /// Fetches an order by id.
    pub async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(with_retry(&self.retry, "get_order", || {
            self.store.get_order(order_id)
        })
        .await?)
    }

    /// Fetches an order's lines.
    pub async fn items(&self, order_id: OrderId) -> Result<Vec<OrderItem>> {
        Ok(with_retry(&self.retry, "order_items", || {
            self.store.order_items(order_id)
        })
        .await?)
    }

    /// Lists a customer's orders, most recent first.
    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>> {
        Ok(with_retry(&self.retry, "orders_for_user", || {
            self.store.orders_for_user(user_id)
        })
        .await?)
    }

    /// Subscribes to one order's status changes for live tracking.
    ///
    /// Delivery is at-least-once per change; consumers treat each value as
    /// an overwrite. Dropping the handle cancels the subscription.
    pub async fn subscribe(&self, order_id: OrderId) -> Result<StatusSubscription> {
        Ok(self.store.subscribe_order_status(order_id).await?)
    }
}
