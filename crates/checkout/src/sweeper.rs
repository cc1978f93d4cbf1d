//! Periodic reservation sweep.
//!
//! Expired reservations are already invisible to every availability read;
//! the sweep only keeps the reservations table from growing without bound.
//! It can run at any cadence, or not at all where the store expires rows
//! natively.

use std::time::Duration;

use store::CommerceStore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::ledger::StockLedger;

/// Spawns the background sweep task.
///
/// Aborting the returned handle stops the sweep; an in-flight sweep error
/// is logged and the task keeps running.
pub fn spawn_reservation_sweeper<S>(
    ledger: StockLedger<S>,
    period: Duration,
) -> JoinHandle<()>
where
    S: CommerceStore + Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match ledger.sweep_expired().await {
                Ok(0) => {}
                Ok(deleted) => {
                    metrics::counter!("stock_reservations_swept").increment(deleted);
                    tracing::debug!(deleted, "swept expired stock reservations");
                }
                Err(e) => tracing::warn!(error = %e, "reservation sweep failed"),
            }
        }
    })
}
