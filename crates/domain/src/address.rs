//! Postal addresses captured at checkout.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// Maximum accepted length for a single-line address.
const MAX_ADDRESS_LEN: usize = 500;

/// A validated single-line postal address.
///
/// Shipping and billing addresses are captured as free text by the checkout
/// form; validation is limited to non-emptiness and a length bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    /// Parses and validates an address line.
    pub fn parse(raw: impl Into<String>) -> Result<Self, DomainError> {
        let raw = raw.into();
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(DomainError::InvalidAddress(
                "address must not be empty".to_string(),
            ));
        }
        if trimmed.len() > MAX_ADDRESS_LEN {
            return Err(DomainError::InvalidAddress(format!(
                "address exceeds {} characters",
                MAX_ADDRESS_LEN
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the address as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_whitespace() {
        let addr = Address::parse("  12 Rue des Sources, Lyon  ").unwrap();
        assert_eq!(addr.as_str(), "12 Rue des Sources, Lyon");
    }

    #[test]
    fn empty_address_is_rejected() {
        assert!(matches!(
            Address::parse("   "),
            Err(DomainError::InvalidAddress(_))
        ));
    }

    #[test]
    fn oversized_address_is_rejected() {
        let raw = "x".repeat(MAX_ADDRESS_LEN + 1);
        assert!(Address::parse(raw).is_err());
    }
}
