//! Message delivery service trait and in-memory implementation.

use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by the delivery boundary.
#[derive(Debug, Clone, Error)]
pub enum DeliveryError {
    /// The message could not be handed to the delivery service.
    #[error("delivery failed: {0}")]
    Failed(String),
}

/// Trait for the external notification delivery service.
///
/// At-least-once best effort; no stronger delivery guarantee is assumed.
#[async_trait]
pub trait DeliveryService: Send + Sync {
    /// Hands one message to the delivery service.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

/// A message captured by the in-memory delivery service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Default)]
struct InMemoryDeliveryState {
    sent: Vec<SentMessage>,
    fail_next: bool,
}

/// In-memory delivery service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDeliveryService {
    state: Arc<RwLock<InMemoryDeliveryState>>,
}

impl InMemoryDeliveryService {
    /// Creates a new in-memory delivery service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next send call fail.
    pub fn set_fail_next(&self, fail: bool) {
        self.state.write().unwrap().fail_next = fail;
    }

    /// Returns the number of messages delivered.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }

    /// Returns a copy of every delivered message.
    pub fn messages(&self) -> Vec<SentMessage> {
        self.state.read().unwrap().sent.clone()
    }
}

#[async_trait]
impl DeliveryService for InMemoryDeliveryService {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let mut state = self.state.write().unwrap();

        if state.fail_next {
            state.fail_next = false;
            return Err(DeliveryError::Failed("simulated send failure".to_string()));
        }

        state.sent.push(SentMessage {
            to: to.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_records_the_message() {
        let service = InMemoryDeliveryService::new();
        service
            .send("ada@example.com", "Payment received", "Thank you")
            .await
            .unwrap();

        assert_eq!(service.sent_count(), 1);
        assert_eq!(service.messages()[0].to, "ada@example.com");
    }

    #[tokio::test]
    async fn fail_next_drops_one_message() {
        let service = InMemoryDeliveryService::new();
        service.set_fail_next(true);

        assert!(service.send("ada@example.com", "x", "y").await.is_err());
        assert!(service.send("ada@example.com", "x", "y").await.is_ok());
        assert_eq!(service.sent_count(), 1);
    }
}
