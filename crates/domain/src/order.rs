//! Order and order-line records.

use chrono::{DateTime, Utc};
use common::{OrderId, UserId};
use serde::{Deserialize, Serialize};

use crate::address::Address;
use crate::money::Money;
use crate::product::ProductId;
use crate::status::OrderStatus;

/// A placed order.
///
/// Immutable after creation except for `status` and `updated_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order identifier.
    pub id: OrderId,

    /// Customer who placed the order.
    pub user_id: UserId,

    /// Current lifecycle status.
    pub status: OrderStatus,

    /// Total amount in cents, computed server-side at confirmation time.
    pub total_amount: Money,

    /// Delivery address.
    pub shipping_address: Address,

    /// Billing address.
    pub billing_address: Address,

    /// Payment-gateway authorization reference, for refund and audit.
    pub authorization_id: Option<String>,

    /// Creation timestamp.
    pub created_at: DateTime<Utc>,

    /// Last status-change timestamp.
    pub updated_at: DateTime<Utc>,
}

/// One line of a placed order.
///
/// The unit price is copied from the catalog at purchase time; a later
/// catalog price change never alters an existing order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    /// The order this line belongs to.
    pub order_id: OrderId,

    /// The purchased product.
    pub product_id: ProductId,

    /// Quantity purchased.
    pub quantity: u32,

    /// Price per unit in cents at the time of purchase.
    pub unit_price: Money,
}

impl OrderItem {
    /// Returns the total for this line (`quantity * unit_price`).
    pub fn line_total(&self) -> Money {
        self.unit_price * self.quantity
    }
}
