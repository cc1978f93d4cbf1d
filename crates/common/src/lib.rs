//! Shared identifier types used across the storefront crates.
//!
//! Each identifier wraps a UUID in its own newtype so an order id can never
//! be passed where a user id or checkout-attempt id is expected.

pub mod types;

pub use types::{AttemptId, OrderId, ReservationId, UserId};
