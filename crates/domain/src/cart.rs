//! Cart contents presented to checkout.
//!
//! Carts live client-side; a cart line is ephemeral input to a checkout
//! attempt, never a persisted entity.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;
use crate::product::ProductId;

/// One line of a shopper's cart: a product and a requested quantity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    /// The product to purchase.
    pub product_id: ProductId,

    /// Requested quantity, must be positive.
    pub quantity: u32,
}

impl CartItem {
    /// Creates a cart line.
    pub fn new(product_id: impl Into<ProductId>, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
        }
    }
}

/// Validates a cart snapshot before checkout may proceed.
///
/// An empty cart or a zero-quantity line is a caller bug, not a shopper
/// error: the storefront never submits either.
pub fn validate_cart(items: &[CartItem]) -> Result<(), DomainError> {
    if items.is_empty() {
        return Err(DomainError::EmptyCart);
    }
    for item in items {
        if item.quantity == 0 {
            return Err(DomainError::InvalidQuantity {
                product_id: item.product_id.clone(),
                quantity: item.quantity,
            });
        }
    }
    Ok(())
}
