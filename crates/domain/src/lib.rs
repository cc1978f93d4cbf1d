//! Domain types for the storefront: products, money, carts, and the order
//! lifecycle state machine.
//!
//! Everything here is plain data with validation. Persistence lives in the
//! `store` crate and the checkout sequencing lives in the `checkout` crate;
//! neither direction is referenced from here.

pub mod address;
pub mod cart;
pub mod error;
pub mod money;
pub mod order;
pub mod product;
pub mod status;

pub use address::Address;
pub use cart::CartItem;
pub use error::DomainError;
pub use money::Money;
pub use order::{Order, OrderItem};
pub use product::{Product, ProductId};
pub use status::OrderStatus;
