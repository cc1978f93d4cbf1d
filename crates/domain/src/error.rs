//! Domain validation errors.

use thiserror::Error;

use crate::product::ProductId;

/// Errors produced by domain validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DomainError {
    /// Checkout was invoked with an empty cart.
    #[error("cart is empty")]
    EmptyCart,

    /// A cart line carries an invalid quantity.
    #[error("invalid quantity {quantity} for product {product_id}")]
    InvalidQuantity {
        product_id: ProductId,
        quantity: u32,
    },

    /// A shipping or billing address failed validation.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// A status change that the order state machine forbids.
    #[error("invalid order status transition: {from} -> {to}")]
    InvalidStatusTransition { from: String, to: String },
}
