//! Customer notifications for order lifecycle transitions.

use common::{OrderId, UserId};
use domain::OrderStatus;
use thiserror::Error;

use crate::services::delivery::{DeliveryError, DeliveryService};
use crate::services::directory::{DirectoryError, UserDirectory};

/// Errors that can occur while dispatching a notification.
///
/// These never propagate out of checkout: notification is fire-and-forget
/// at every call site, via [`NotificationDispatcher::notify_best_effort`].
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The user has no contact address on file.
    #[error("no contact address for user {0}")]
    UnknownRecipient(UserId),

    /// Directory lookup failed.
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// Handing the message to the delivery service failed.
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
}

/// Fixed per-status message template.
fn template(status: OrderStatus) -> (&'static str, &'static str) {
    match status {
        OrderStatus::Pending => (
            "Your order is awaiting payment",
            "Thank you for your order. To finalize it, please proceed to payment.",
        ),
        OrderStatus::Paid => (
            "Payment received for your order",
            "We have received your payment. Your order will be processed shortly.",
        ),
        OrderStatus::Processing => (
            "Your order is being prepared",
            "We are currently preparing your order.",
        ),
        OrderStatus::Shipped => (
            "Your order has shipped",
            "Your order is on its way! You can follow the delivery with the tracking number provided.",
        ),
        OrderStatus::Delivered => (
            "Your order has been delivered",
            "Your order has been delivered. We hope you are enjoying it!",
        ),
        OrderStatus::Cancelled => (
            "Your order has been cancelled",
            "Your order has been cancelled. If you have any questions, please contact customer service.",
        ),
    }
}

/// Renders and sends a status-change message for each order lifecycle
/// transition.
pub struct NotificationDispatcher<D, U> {
    delivery: D,
    directory: U,
}

impl<D: DeliveryService, U: UserDirectory> NotificationDispatcher<D, U> {
    /// Creates a dispatcher over the given delivery service and directory.
    pub fn new(delivery: D, directory: U) -> Self {
        Self {
            delivery,
            directory,
        }
    }

    /// Returns a reference to the underlying delivery service.
    pub fn delivery(&self) -> &D {
        &self.delivery
    }

    /// Sends the fixed message for `status` to the order's customer.
    ///
    /// `extra` is appended to the body when present (e.g. a tracking
    /// number for shipped orders).
    #[tracing::instrument(skip(self, extra))]
    pub async fn notify(
        &self,
        user_id: UserId,
        order_id: OrderId,
        status: OrderStatus,
        extra: Option<&str>,
    ) -> Result<(), NotifyError> {
        let email = self
            .directory
            .email_for(user_id)
            .await?
            .ok_or(NotifyError::UnknownRecipient(user_id))?;

        let (subject, body) = template(status);
        let mut full_body = body.to_string();
        if let Some(extra) = extra {
            full_body.push_str("\n\n");
            full_body.push_str(extra);
        }
        full_body.push_str(&format!(
            "\n\nOrder number: {order_id}\nTo follow your order, sign in to your account."
        ));

        self.delivery.send(&email, subject, &full_body).await?;
        metrics::counter!("notifications_sent").increment(1);
        Ok(())
    }

    /// Fire-and-forget variant of [`notify`](Self::notify): a failure is
    /// logged and counted, never returned. Failure to notify must not roll
    /// back or fail the order it describes.
    pub async fn notify_best_effort(
        &self,
        user_id: UserId,
        order_id: OrderId,
        status: OrderStatus,
        extra: Option<&str>,
    ) {
        if let Err(e) = self.notify(user_id, order_id, status, extra).await {
            metrics::counter!("notifications_failed").increment(1);
            tracing::warn!(%user_id, %order_id, %status, error = %e, "order notification failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::delivery::InMemoryDeliveryService;
    use crate::services::directory::InMemoryUserDirectory;

    fn dispatcher() -> (
        NotificationDispatcher<InMemoryDeliveryService, InMemoryUserDirectory>,
        UserId,
    ) {
        let delivery = InMemoryDeliveryService::new();
        let directory = InMemoryUserDirectory::new();
        let user = UserId::new();
        directory.insert(user, "ada@example.com");
        (NotificationDispatcher::new(delivery, directory), user)
    }

    #[tokio::test]
    async fn paid_notification_reaches_the_customer() {
        let (dispatcher, user) = dispatcher();
        let order_id = OrderId::new();

        dispatcher
            .notify(user, order_id, OrderStatus::Paid, None)
            .await
            .unwrap();

        let messages = dispatcher.delivery().messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].to, "ada@example.com");
        assert_eq!(messages[0].subject, "Payment received for your order");
        assert!(messages[0].body.contains(&order_id.to_string()));
    }

    #[tokio::test]
    async fn extra_text_is_appended_to_the_body() {
        let (dispatcher, user) = dispatcher();

        dispatcher
            .notify(
                user,
                OrderId::new(),
                OrderStatus::Shipped,
                Some("Tracking number: TRK-123"),
            )
            .await
            .unwrap();

        let messages = dispatcher.delivery().messages();
        assert!(messages[0].body.contains("Tracking number: TRK-123"));
    }

    #[tokio::test]
    async fn unknown_recipient_is_an_error() {
        let (dispatcher, _) = dispatcher();

        let err = dispatcher
            .notify(UserId::new(), OrderId::new(), OrderStatus::Paid, None)
            .await
            .unwrap_err();
        assert!(matches!(err, NotifyError::UnknownRecipient(_)));
    }

    #[tokio::test]
    async fn best_effort_swallows_delivery_failures() {
        let (dispatcher, user) = dispatcher();
        dispatcher.delivery().set_fail_next(true);

        // Must not panic or propagate.
        dispatcher
            .notify_best_effort(user, OrderId::new(), OrderStatus::Paid, None)
            .await;
        assert_eq!(dispatcher.delivery().sent_count(), 0);
    }

    #[test]
    fn every_status_has_a_template() {
        for status in [
            OrderStatus::Pending,
            OrderStatus::Paid,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
        ] {
            let (subject, body) = template(status);
            assert!(!subject.is_empty());
            assert!(!body.is_empty());
        }
    }
}
