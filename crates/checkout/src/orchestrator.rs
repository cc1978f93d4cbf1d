//! Checkout orchestration: validate -> reserve -> authorize -> confirm ->
//! record -> settle stock -> notify.

use common::{AttemptId, OrderId, UserId};
use domain::{Address, CartItem, Money, OrderStatus, Product, cart};
use store::CommerceStore;

use crate::error::{CheckoutError, Result};
use crate::ledger::StockLedger;
use crate::notification::NotificationDispatcher;
use crate::payment::PaymentCoordinator;
use crate::recorder::{OrderRecorder, PricedLine};
use crate::retry::{RetryConfig, with_retry};
use crate::services::delivery::DeliveryService;
use crate::services::directory::UserDirectory;
use crate::services::gateway::{PaymentGateway, PaymentMethodToken};

/// One checkout request: a cart snapshot plus shopper-supplied details.
///
/// There is deliberately no client total field; the total is always
/// computed here from current catalog prices.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    /// The authenticated shopper. Anonymous checkout is not supported.
    pub user_id: UserId,

    /// Cart snapshot: product and quantity pairs.
    pub items: Vec<CartItem>,

    /// Raw shipping address from the form.
    pub shipping_address: String,

    /// Raw billing address; `None` means same as shipping.
    pub billing_address: Option<String>,

    /// Payment-method token minted by the hosted card widget.
    pub payment_method: PaymentMethodToken,
}

/// What a successful checkout returns: enough to redirect the shopper to a
/// confirmation view and clear the cart.
#[derive(Debug, Clone)]
pub struct CheckoutReceipt {
    pub order_id: OrderId,
    pub total: Money,
    pub authorization_id: String,
}

/// Sequences a checkout attempt across the stock ledger, the payment
/// coordinator, the order recorder, and the notification dispatcher.
///
/// The orchestrator is stateless between steps: each checkout is an
/// independent run tagged with a fresh [`AttemptId`], and concurrency
/// correctness rests on the store's atomic reservation path, not on any
/// in-process lock here. Every failure path after a reservation releases
/// that attempt's holds before surfacing the error.
pub struct CheckoutOrchestrator<S, G, D, U> {
    store: S,
    ledger: StockLedger<S>,
    payment: PaymentCoordinator<G>,
    recorder: OrderRecorder<S>,
    notifier: NotificationDispatcher<D, U>,
    retry: RetryConfig,
}

impl<S, G, D, U> CheckoutOrchestrator<S, G, D, U>
where
    S: CommerceStore + Clone,
    G: PaymentGateway,
    D: DeliveryService,
    U: UserDirectory,
{
    /// Creates an orchestrator over the given store and service boundaries.
    pub fn new(store: S, gateway: G, delivery: D, directory: U) -> Self {
        let ledger = StockLedger::new(store.clone());
        let recorder = OrderRecorder::new(store.clone());
        Self {
            store,
            ledger,
            payment: PaymentCoordinator::new(gateway),
            recorder,
            notifier: NotificationDispatcher::new(delivery, directory),
            retry: RetryConfig::default(),
        }
    }

    /// Replaces the stock ledger (e.g. to shorten the reservation TTL).
    pub fn with_ledger(mut self, ledger: StockLedger<S>) -> Self {
        self.ledger = ledger;
        self
    }

    /// The stock ledger driving reservations for this orchestrator.
    pub fn ledger(&self) -> &StockLedger<S> {
        &self.ledger
    }

    /// The order recorder backing this orchestrator.
    pub fn recorder(&self) -> &OrderRecorder<S> {
        &self.recorder
    }

    /// The notification dispatcher backing this orchestrator.
    pub fn notifier(&self) -> &NotificationDispatcher<D, U> {
        &self.notifier
    }

    /// Runs one checkout attempt end to end.
    #[tracing::instrument(skip(self, request), fields(user_id = %request.user_id))]
    pub async fn checkout(&self, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        metrics::counter!("checkout_attempts").increment(1);
        let started = std::time::Instant::now();

        let result = self.run(request).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        match &result {
            Ok(receipt) => {
                metrics::counter!("checkout_completed").increment(1);
                tracing::info!(order_id = %receipt.order_id, total = %receipt.total, "checkout completed");
            }
            Err(e) => {
                metrics::counter!("checkout_failed").increment(1);
                tracing::info!(error = %e, recoverable = e.is_user_recoverable(), "checkout failed");
            }
        }
        result
    }

    async fn run(&self, request: CheckoutRequest) -> Result<CheckoutReceipt> {
        cart::validate_cart(&request.items)?;
        let shipping = Address::parse(request.shipping_address)?;
        let billing = match request.billing_address {
            Some(raw) => Address::parse(raw)?,
            None => shipping.clone(),
        };

        // 1. Price every line from the catalog and pre-check availability,
        //    aborting on the first line that cannot be satisfied.
        let mut lines: Vec<(Product, u32)> = Vec::with_capacity(request.items.len());
        for item in &request.items {
            let product = with_retry(&self.retry, "get_product", || {
                self.store.get_product(&item.product_id)
            })
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| CheckoutError::ProductUnavailable(item.product_id.clone()))?;

            if !self
                .ledger
                .check_availability(&product.id, item.quantity)
                .await?
            {
                return Err(CheckoutError::InsufficientStock {
                    product: product.name,
                });
            }
            lines.push((product, item.quantity));
        }

        // 2. Reserve every line under a fresh attempt id. A failure
        //    mid-loop releases whatever this attempt already holds.
        let attempt_id = AttemptId::new();
        for (product, quantity) in &lines {
            if let Err(e) = self.ledger.reserve(attempt_id, &product.id, *quantity).await {
                self.abandon(attempt_id).await;
                return Err(match e {
                    CheckoutError::InsufficientStock { .. } => CheckoutError::InsufficientStock {
                        product: product.name.clone(),
                    },
                    other => other,
                });
            }
        }

        // 3. Open the payment authorization for the server-computed total.
        let total: Money = lines
            .iter()
            .map(|(product, quantity)| product.unit_price * *quantity)
            .sum();
        let auth = match self.payment.create_authorization(attempt_id, total).await {
            Ok(auth) => auth,
            Err(e) => {
                self.abandon(attempt_id).await;
                return Err(e);
            }
        };

        // 4. Confirm with the shopper's payment method.
        if let Err(e) = self.payment.confirm(&auth.token, &request.payment_method).await {
            self.abandon(attempt_id).await;
            return Err(e);
        }

        // 5. Record the order, then settle stock line by line.
        let priced: Vec<PricedLine> = lines
            .iter()
            .map(|(product, quantity)| PricedLine {
                product_id: product.id.clone(),
                quantity: *quantity,
                unit_price: product.unit_price,
            })
            .collect();
        let order = match self
            .recorder
            .create_order(
                request.user_id,
                &priced,
                shipping,
                billing,
                auth.authorization_id.clone(),
            )
            .await
        {
            Ok(order) => order,
            Err(e) => {
                // Payment captured but no order recorded: release the holds
                // and surface the authorization for reconciliation.
                metrics::counter!("checkout_reconciliation_required").increment(1);
                tracing::error!(
                    %attempt_id,
                    authorization_id = %auth.authorization_id,
                    error = %e,
                    "order record failed after payment confirmation; reconciliation required"
                );
                self.abandon(attempt_id).await;
                return Err(e);
            }
        };

        for (product, quantity) in &lines {
            if let Err(e) = self
                .ledger
                .confirm_reduction(attempt_id, &product.id, *quantity)
                .await
            {
                // The paid order stands. The unreduced stock is a bounded
                // inconsistency: the hold expires on its own, and the order
                // is flagged for reconciliation instead of being failed.
                metrics::counter!("checkout_reconciliation_required").increment(1);
                tracing::error!(
                    order_id = %order.id,
                    product_id = %product.id,
                    error = %e,
                    "stock reduction failed after order creation; reconciliation required"
                );
            }
        }

        // 6. Tell the customer, fire-and-forget.
        self.notifier
            .notify_best_effort(request.user_id, order.id, OrderStatus::Paid, None)
            .await;

        // 7. The caller clears the cart and redirects on this receipt.
        Ok(CheckoutReceipt {
            order_id: order.id,
            total,
            authorization_id: auth.authorization_id,
        })
    }

    /// Releases everything a failed or abandoned attempt still holds.
    ///
    /// A release failure is logged, not surfaced: the holds expire on
    /// their own after the TTL.
    async fn abandon(&self, attempt_id: AttemptId) {
        if let Err(e) = self.ledger.release_attempt(attempt_id).await {
            tracing::error!(
                %attempt_id,
                error = %e,
                "failed to release reservations; TTL expiry will reclaim them"
            );
        }
    }
}
