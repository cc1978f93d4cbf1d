//! User directory trait and in-memory implementation.
//!
//! The identity provider owns accounts; checkout only ever asks it for a
//! contact address.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::UserId;
use thiserror::Error;

/// Errors returned by the directory boundary.
#[derive(Debug, Clone, Error)]
pub enum DirectoryError {
    /// The directory could not be queried.
    #[error("directory lookup failed: {0}")]
    Lookup(String),
}

/// Trait for the external identity provider's user directory.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    /// Returns the contact email for a user, if the account has one.
    async fn email_for(&self, user_id: UserId) -> Result<Option<String>, DirectoryError>;
}

/// In-memory user directory for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryUserDirectory {
    emails: Arc<RwLock<HashMap<UserId, String>>>,
}

impl InMemoryUserDirectory {
    /// Creates a new empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a user's contact email.
    pub fn insert(&self, user_id: UserId, email: impl Into<String>) {
        self.emails.write().unwrap().insert(user_id, email.into());
    }
}

#[async_trait]
impl UserDirectory for InMemoryUserDirectory {
    async fn email_for(&self, user_id: UserId) -> Result<Option<String>, DirectoryError> {
        Ok(self.emails.read().unwrap().get(&user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lookup_returns_registered_email() {
        let directory = InMemoryUserDirectory::new();
        let user = UserId::new();
        directory.insert(user, "ada@example.com");

        assert_eq!(
            directory.email_for(user).await.unwrap(),
            Some("ada@example.com".to_string())
        );
        assert_eq!(directory.email_for(UserId::new()).await.unwrap(), None);
    }
}
