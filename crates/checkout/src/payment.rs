//! Payment coordination: one authorization per checkout attempt, bounded
//! retries on gateway trouble.

use std::collections::HashMap;
use std::time::Duration;

use common::AttemptId;
use domain::Money;
use tokio::sync::Mutex;

use crate::error::{CheckoutError, Result};
use crate::services::gateway::{
    PaymentAuthorization, PaymentConfirmation, PaymentError, PaymentGateway, PaymentMethodToken,
};

/// Retries after a transient gateway error, in addition to the first call.
const GATEWAY_RETRIES: u32 = 2;

const GATEWAY_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Drives the payment gateway for checkout.
///
/// Exactly one authorization is opened per checkout attempt: a repeated
/// `create_authorization` call for the same attempt returns the hold already
/// issued instead of opening a second one.
pub struct PaymentCoordinator<G> {
    gateway: G,
    issued: Mutex<HashMap<AttemptId, PaymentAuthorization>>,
}

impl<G: PaymentGateway> PaymentCoordinator<G> {
    /// Creates a new coordinator over the given gateway.
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            issued: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a reference to the underlying gateway.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Opens a hold for `amount`, or returns the hold already opened for
    /// this attempt.
    #[tracing::instrument(skip(self), fields(amount = %amount))]
    pub async fn create_authorization(
        &self,
        attempt_id: AttemptId,
        amount: Money,
    ) -> Result<PaymentAuthorization> {
        // The lock is held across the gateway call so a concurrent repeat
        // for the same attempt waits instead of opening a second hold.
        let mut issued = self.issued.lock().await;
        if let Some(existing) = issued.get(&attempt_id) {
            tracing::debug!(%attempt_id, "reusing existing authorization");
            return Ok(existing.clone());
        }

        let auth = self
            .with_gateway_retries("create_authorization", || {
                self.gateway.create_authorization(amount)
            })
            .await?;
        metrics::counter!("payment_authorizations_created").increment(1);
        issued.insert(attempt_id, auth.clone());
        Ok(auth)
    }

    /// Finalizes a hold with the shopper's payment method.
    ///
    /// `Declined` surfaces immediately; gateway errors are retried a small
    /// bounded number of times first.
    #[tracing::instrument(skip(self, method))]
    pub async fn confirm(
        &self,
        token: &str,
        method: &PaymentMethodToken,
    ) -> Result<PaymentConfirmation> {
        let confirmation = self
            .with_gateway_retries("confirm", || self.gateway.confirm(token, method))
            .await?;
        metrics::counter!("payments_confirmed").increment(1);
        Ok(confirmation)
    }

    async fn with_gateway_retries<T, F, Fut>(
        &self,
        op: &'static str,
        mut call: F,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, PaymentError>>,
    {
        let mut remaining = GATEWAY_RETRIES;
        loop {
            match call().await {
                Ok(value) => return Ok(value),
                Err(PaymentError::Declined(reason)) => {
                    return Err(CheckoutError::PaymentDeclined(reason));
                }
                Err(PaymentError::Gateway(reason)) if remaining > 0 => {
                    remaining -= 1;
                    tracing::warn!(op, remaining, reason, "gateway error, retrying");
                    tokio::time::sleep(GATEWAY_RETRY_DELAY).await;
                }
                Err(PaymentError::Gateway(reason)) => {
                    return Err(CheckoutError::Gateway(reason));
                }
            }
        }
    }
}
