//! Checkout error taxonomy.
//!
//! Three classes of failure flow out of a checkout attempt:
//! - user-recoverable conditions the shopper can act on (out of stock,
//!   declined card, bad address); the cart is preserved for a retry
//! - transient store/gateway trouble, retried with backoff before
//!   surfacing as a generic try-again failure
//! - caller bugs (empty cart, illegal status transition), logged and
//!   never shown verbatim

use common::OrderId;
use domain::{DomainError, ProductId};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur during checkout and order operations.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// Not enough available stock for a cart line; names the product so the
    /// storefront can tell the shopper which line to fix.
    #[error("insufficient stock for {product}")]
    InsufficientStock { product: String },

    /// The product does not exist or is no longer sold.
    #[error("product unavailable: {0}")]
    ProductUnavailable(ProductId),

    /// The payment method was declined; retry with a different method.
    #[error("payment declined: {0}")]
    PaymentDeclined(String),

    /// The payment gateway could not be reached after bounded retries.
    #[error("payment gateway error: {0}")]
    Gateway(String),

    /// Cart or address validation failed.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The referenced order does not exist.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// Store failure, surfaced after bounded retries for transient cases.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl CheckoutError {
    /// Returns true for conditions the shopper can resolve and retry;
    /// everything else is either transient infrastructure trouble or a bug.
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            CheckoutError::InsufficientStock { .. }
                | CheckoutError::ProductUnavailable(_)
                | CheckoutError::PaymentDeclined(_)
                | CheckoutError::Domain(
                    DomainError::InvalidAddress(_) | DomainError::EmptyCart
                )
        )
    }
}

/// Convenience type alias for checkout results.
pub type Result<T> = std::result::Result<T, CheckoutError>;
