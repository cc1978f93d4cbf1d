//! Stock ledger: availability reads and expiring reservations.

use chrono::{Duration, Utc};
use common::AttemptId;
use domain::ProductId;
use store::{CommerceStore, StockReservation, StoreError};

use crate::error::{CheckoutError, Result};
use crate::retry::{RetryConfig, with_retry};

/// How long a reservation holds stock before an abandoned checkout
/// self-heals, in minutes.
pub const RESERVATION_TTL_MINUTES: i64 = 15;

/// Tracks per-product available stock: `on_hand` minus the sum of active
/// reservations.
///
/// The ledger never mutates `on_hand` on reservation; only
/// [`confirm_reduction`](Self::confirm_reduction), reached after a confirmed
/// payment, does. The check-then-reserve race is closed inside the store
/// (one atomic conditional insert), not here; the ledger adds the TTL
/// policy, attempt scoping, and bounded retries on transient store errors.
#[derive(Clone)]
pub struct StockLedger<S> {
    store: S,
    ttl: Duration,
    retry: RetryConfig,
}

impl<S: CommerceStore> StockLedger<S> {
    /// Creates a ledger with the default reservation TTL.
    pub fn new(store: S) -> Self {
        Self::with_ttl(store, Duration::minutes(RESERVATION_TTL_MINUTES))
    }

    /// Creates a ledger with a custom reservation TTL.
    pub fn with_ttl(store: S, ttl: Duration) -> Self {
        Self {
            store,
            ttl,
            retry: RetryConfig::default(),
        }
    }

    /// Returns whether `quantity` units of the product are available right
    /// now: `on_hand - sum(active reservations) >= quantity`.
    ///
    /// Reservations past their expiry are never counted, whether or not the
    /// sweep has deleted them yet. An unknown or inactive product is simply
    /// not available.
    #[tracing::instrument(skip(self))]
    pub async fn check_availability(&self, product_id: &ProductId, quantity: u32) -> Result<bool> {
        let now = Utc::now();
        let product = with_retry(&self.retry, "get_product", || {
            self.store.get_product(product_id)
        })
        .await?;
        let Some(product) = product else {
            return Ok(false);
        };
        if !product.is_active {
            return Ok(false);
        }

        let reserved = with_retry(&self.retry, "reserved_quantity", || {
            self.store.reserved_quantity(product_id, now)
        })
        .await?;
        Ok(u64::from(product.on_hand).saturating_sub(u64::from(reserved)) >= u64::from(quantity))
    }

    /// Places an expiring hold on `quantity` units for the given checkout
    /// attempt.
    ///
    /// Availability is re-validated atomically with the insert; under
    /// concurrent checkouts racing for the last unit, exactly one wins.
    #[tracing::instrument(skip(self), fields(ttl_minutes = self.ttl.num_minutes()))]
    pub async fn reserve(
        &self,
        attempt_id: AttemptId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<StockReservation> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let result = with_retry(&self.retry, "reserve_stock", || {
            self.store
                .reserve_stock(product_id, quantity, attempt_id, now, expires_at)
        })
        .await;

        match result {
            Ok(reservation) => {
                metrics::counter!("stock_reservations_created").increment(1);
                Ok(reservation)
            }
            Err(StoreError::PredicateFailed(_)) => Err(CheckoutError::InsufficientStock {
                product: product_id.to_string(),
            }),
            Err(StoreError::ProductNotFound(id)) => Err(CheckoutError::ProductUnavailable(id)),
            Err(e) => Err(e.into()),
        }
    }

    /// Releases every hold the given attempt still has, making the stock
    /// immediately available again. Returns the number of holds released.
    #[tracing::instrument(skip(self))]
    pub async fn release_attempt(&self, attempt_id: AttemptId) -> Result<u64> {
        let released = with_retry(&self.retry, "release_attempt", || {
            self.store.release_attempt(attempt_id)
        })
        .await?;
        metrics::counter!("stock_reservations_released").increment(released);
        Ok(released)
    }

    /// Permanently decrements `on_hand` for a fulfilled line and clears the
    /// attempt's hold on that product, as one atomic store operation.
    ///
    /// Fails rather than taking stock negative.
    #[tracing::instrument(skip(self))]
    pub async fn confirm_reduction(
        &self,
        attempt_id: AttemptId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<()> {
        with_retry(&self.retry, "reduce_on_hand", || {
            self.store.reduce_on_hand(product_id, quantity, attempt_id)
        })
        .await?;
        metrics::counter!("stock_reductions_confirmed").increment(1);
        Ok(())
    }

    /// Deletes reservations whose expiry has passed.
    ///
    /// Not correctness-critical (expired holds are already ignored by every
    /// read); this only bounds table growth. Returns the number deleted.
    pub async fn sweep_expired(&self) -> Result<u64> {
        let deleted = with_retry(&self.retry, "delete_expired_reservations", || {
            self.store.delete_expired_reservations(Utc::now())
        })
        .await?;
        Ok(deleted)
    }
}
