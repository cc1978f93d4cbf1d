use common::OrderId;
use domain::ProductId;
use thiserror::Error;

/// Errors that can occur when interacting with the commerce store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The product does not exist.
    #[error("product not found: {0}")]
    ProductNotFound(ProductId),

    /// The order does not exist.
    #[error("order not found: {0}")]
    OrderNotFound(OrderId),

    /// A conditional update's predicate did not hold (e.g. a reservation
    /// would exceed available stock, or a decrement would go negative).
    #[error("conditional update rejected: {0}")]
    PredicateFailed(String),

    /// The store could not be reached; safe to retry.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A stored row could not be mapped back to a domain value.
    #[error("invalid row: {0}")]
    InvalidRow(String),

    /// A database error occurred.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns true if the operation may succeed when retried.
    ///
    /// Predicate failures and missing rows are never transient; connection
    /// and pool errors are.
    pub fn is_transient(&self) -> bool {
        match self {
            StoreError::Unavailable(_) => true,
            StoreError::Database(e) => matches!(
                e,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            _ => false,
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unavailable_is_transient() {
        assert!(StoreError::Unavailable("connection reset".to_string()).is_transient());
    }

    #[test]
    fn predicate_failure_is_not_transient() {
        assert!(!StoreError::PredicateFailed("insufficient stock".to_string()).is_transient());
        assert!(!StoreError::ProductNotFound(ProductId::new("AQ-1")).is_transient());
    }
}
