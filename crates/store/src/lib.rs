//! Persistent-store boundary for the storefront.
//!
//! The rest of the system never talks to a database directly; it goes through
//! the [`CommerceStore`] trait, which models the four tables the order core
//! owns (`products`, `stock_reservations`, `orders`, `order_items`) plus the
//! row-level change feed used for live order tracking.
//!
//! Two implementations are provided:
//! - [`InMemoryCommerceStore`] for tests and the demo binary
//! - [`PostgresCommerceStore`] backed by sqlx
//!
//! The one operation with a real concurrency contract is
//! [`CommerceStore::reserve_stock`]: the availability check and the
//! reservation insert must be a single atomic step, because concurrent
//! checkouts race for the same per-product stock.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;
pub mod subscription;

pub use error::{Result, StoreError};
pub use memory::InMemoryCommerceStore;
pub use postgres::PostgresCommerceStore;
pub use store::{CommerceStore, NewOrder, NewOrderItem, StatusChange, StockReservation};
pub use subscription::StatusSubscription;
