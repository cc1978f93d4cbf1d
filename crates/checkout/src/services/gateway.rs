//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use domain::Money;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors returned by the payment gateway boundary.
#[derive(Debug, Clone, Error)]
pub enum PaymentError {
    /// The payment method was refused; the shopper can retry with another.
    #[error("payment declined: {0}")]
    Declined(String),

    /// Network or gateway-side failure; safe to retry a bounded number of
    /// times.
    #[error("gateway error: {0}")]
    Gateway(String),
}

/// An opaque payment-method token minted by the hosted card-input widget.
///
/// Card credentials never pass through this system; all we ever hold is
/// this reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentMethodToken(String);

impl PaymentMethodToken {
    /// Wraps a widget-issued token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// An open hold on funds, prior to confirmation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentAuthorization {
    /// Client-usable token for the hosted widget.
    pub token: String,
    /// Server-side identifier, stable for refund and audit.
    pub authorization_id: String,
}

/// A finalized payment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentConfirmation {
    /// The authorization that was captured.
    pub authorization_id: String,
}

/// Trait for the external payment gateway.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Opens a hold for `amount` and returns a client token plus a
    /// server-side identifier.
    async fn create_authorization(
        &self,
        amount: Money,
    ) -> Result<PaymentAuthorization, PaymentError>;

    /// Finalizes a hold using the shopper's payment method.
    async fn confirm(
        &self,
        token: &str,
        method: &PaymentMethodToken,
    ) -> Result<PaymentConfirmation, PaymentError>;
}

#[derive(Debug)]
struct Hold {
    authorization_id: String,
    amount: Money,
    confirmed: bool,
}

#[derive(Debug, Default)]
struct InMemoryGatewayState {
    holds: HashMap<String, Hold>,
    next_id: u32,
    decline_next: bool,
    gateway_failures_remaining: u32,
}

/// In-memory payment gateway for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryGatewayState>>,
}

impl InMemoryPaymentGateway {
    /// Creates a new in-memory gateway.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next confirm call return `Declined`.
    pub fn set_decline_next(&self, decline: bool) {
        self.state.write().unwrap().decline_next = decline;
    }

    /// Makes the next `count` gateway calls fail with a transient error.
    pub fn inject_gateway_failures(&self, count: u32) {
        self.state.write().unwrap().gateway_failures_remaining = count;
    }

    /// Returns the number of holds opened so far.
    pub fn authorization_count(&self) -> usize {
        self.state.read().unwrap().holds.len()
    }

    /// Returns the number of confirmed holds.
    pub fn confirmed_count(&self) -> usize {
        self.state
            .read()
            .unwrap()
            .holds
            .values()
            .filter(|h| h.confirmed)
            .count()
    }

    /// Returns the amount held under an authorization id, if any.
    pub fn held_amount(&self, authorization_id: &str) -> Option<Money> {
        self.state
            .read()
            .unwrap()
            .holds
            .values()
            .find(|h| h.authorization_id == authorization_id)
            .map(|h| h.amount)
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_authorization(
        &self,
        amount: Money,
    ) -> Result<PaymentAuthorization, PaymentError> {
        let mut state = self.state.write().unwrap();

        if state.gateway_failures_remaining > 0 {
            state.gateway_failures_remaining -= 1;
            return Err(PaymentError::Gateway("connection reset".to_string()));
        }
        if !amount.is_positive() {
            return Err(PaymentError::Declined(
                "amount must be greater than zero".to_string(),
            ));
        }

        state.next_id += 1;
        let token = format!("tok_{:06}", state.next_id);
        let authorization_id = format!("auth_{:06}", state.next_id);
        state.holds.insert(
            token.clone(),
            Hold {
                authorization_id: authorization_id.clone(),
                amount,
                confirmed: false,
            },
        );

        Ok(PaymentAuthorization {
            token,
            authorization_id,
        })
    }

    async fn confirm(
        &self,
        token: &str,
        _method: &PaymentMethodToken,
    ) -> Result<PaymentConfirmation, PaymentError> {
        let mut state = self.state.write().unwrap();

        if state.gateway_failures_remaining > 0 {
            state.gateway_failures_remaining -= 1;
            return Err(PaymentError::Gateway("connection reset".to_string()));
        }
        if state.decline_next {
            state.decline_next = false;
            return Err(PaymentError::Declined("card declined".to_string()));
        }

        let hold = state
            .holds
            .get_mut(token)
            .ok_or_else(|| PaymentError::Gateway(format!("unknown authorization {token}")))?;
        hold.confirmed = true;

        Ok(PaymentConfirmation {
            authorization_id: hold.authorization_id.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn authorize_and_confirm() {
        let gateway = InMemoryPaymentGateway::new();
        let auth = gateway
            .create_authorization(Money::from_cents(5000))
            .await
            .unwrap();
        assert!(auth.token.starts_with("tok_"));
        assert!(auth.authorization_id.starts_with("auth_"));

        let confirmation = gateway
            .confirm(&auth.token, &PaymentMethodToken::new("pm_visa"))
            .await
            .unwrap();
        assert_eq!(confirmation.authorization_id, auth.authorization_id);
        assert_eq!(gateway.confirmed_count(), 1);
    }

    #[tokio::test]
    async fn decline_leaves_hold_unconfirmed() {
        let gateway = InMemoryPaymentGateway::new();
        let auth = gateway
            .create_authorization(Money::from_cents(5000))
            .await
            .unwrap();

        gateway.set_decline_next(true);
        let err = gateway
            .confirm(&auth.token, &PaymentMethodToken::new("pm_visa"))
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Declined(_)));
        assert_eq!(gateway.confirmed_count(), 0);
    }

    #[tokio::test]
    async fn zero_amount_is_rejected() {
        let gateway = InMemoryPaymentGateway::new();
        let err = gateway
            .create_authorization(Money::zero())
            .await
            .unwrap_err();
        assert!(matches!(err, PaymentError::Declined(_)));
    }

    #[tokio::test]
    async fn injected_failures_are_bounded() {
        let gateway = InMemoryPaymentGateway::new();
        gateway.inject_gateway_failures(1);

        assert!(
            gateway
                .create_authorization(Money::from_cents(100))
                .await
                .is_err()
        );
        assert!(
            gateway
                .create_authorization(Money::from_cents(100))
                .await
                .is_ok()
        );
    }
}
