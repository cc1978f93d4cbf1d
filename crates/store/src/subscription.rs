use domain::OrderStatus;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A cancellable handle on one order's status change feed.
///
/// Obtained from
/// [`CommerceStore::subscribe_order_status`](crate::CommerceStore::subscribe_order_status).
/// Dropping the handle (or calling [`unsubscribe`](Self::unsubscribe))
/// detaches from the feed and stops the forwarding task.
#[derive(Debug)]
pub struct StatusSubscription {
    rx: mpsc::Receiver<OrderStatus>,
    forwarder: Option<JoinHandle<()>>,
}

impl StatusSubscription {
    /// Wraps a receiver with no backing task.
    pub fn new(rx: mpsc::Receiver<OrderStatus>) -> Self {
        Self {
            rx,
            forwarder: None,
        }
    }

    /// Wraps a receiver fed by a forwarding task; the task is aborted when
    /// the subscription ends.
    pub fn with_forwarder(rx: mpsc::Receiver<OrderStatus>, forwarder: JoinHandle<()>) -> Self {
        Self {
            rx,
            forwarder: Some(forwarder),
        }
    }

    /// Waits for the next status change.
    ///
    /// Returns `None` once the feed is closed. Changes may be duplicated or
    /// coalesced; each value is the order's current status, not a delta.
    pub async fn next_status(&mut self) -> Option<OrderStatus> {
        self.rx.recv().await
    }

    /// Returns the next change without waiting, if one is already queued.
    pub fn try_next_status(&mut self) -> Option<OrderStatus> {
        self.rx.try_recv().ok()
    }

    /// Cancels the subscription.
    pub fn unsubscribe(self) {
        // Drop does the work.
    }
}

impl Drop for StatusSubscription {
    fn drop(&mut self) {
        if let Some(handle) = self.forwarder.take() {
            handle.abort();
        }
    }
}
