//! External service boundaries consumed by checkout.
//!
//! Each boundary is an `async_trait` with an in-memory implementation used
//! by tests and the demo binary: the payment gateway, the message delivery
//! service, and the identity provider's user directory.

pub mod delivery;
pub mod directory;
pub mod gateway;

pub use delivery::{DeliveryError, DeliveryService, InMemoryDeliveryService, SentMessage};
pub use directory::{DirectoryError, InMemoryUserDirectory, UserDirectory};
pub use gateway::{
    InMemoryPaymentGateway, PaymentAuthorization, PaymentConfirmation, PaymentError,
    PaymentGateway, PaymentMethodToken,
};
