//! Order, stock, and payment coordination for the storefront.
//!
//! This crate is the core of the system: a race-safe
//! reservation -> payment -> fulfillment sequence for checkouts.
//!
//! The checkout orchestrator drives four collaborators:
//! 1. the [`StockLedger`] reserves inventory (soft, expiring holds)
//! 2. the [`PaymentCoordinator`] opens and confirms a payment authorization
//! 3. the [`OrderRecorder`] persists the order and its lines once paid
//! 4. the [`NotificationDispatcher`] tells the customer, fire-and-forget
//!
//! Every failure path after a reservation releases that attempt's holds
//! before surfacing the error; an abandoned checkout self-heals when its
//! reservations expire.

pub mod error;
pub mod ledger;
pub mod notification;
pub mod orchestrator;
pub mod payment;
pub mod recorder;
pub mod retry;
pub mod services;
pub mod sweeper;

pub use error::CheckoutError;
pub use ledger::StockLedger;
pub use notification::{NotificationDispatcher, NotifyError};
pub use orchestrator::{CheckoutOrchestrator, CheckoutReceipt, CheckoutRequest};
pub use payment::PaymentCoordinator;
pub use recorder::{OrderRecorder, PricedLine};
pub use retry::RetryConfig;
pub use services::{
    DeliveryError, DeliveryService, DirectoryError, InMemoryDeliveryService,
    InMemoryPaymentGateway, InMemoryUserDirectory, PaymentAuthorization, PaymentConfirmation,
    PaymentError, PaymentGateway, PaymentMethodToken, SentMessage, UserDirectory,
};
pub use sweeper::spawn_reservation_sweeper;
