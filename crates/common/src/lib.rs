//! Shared identifier types for the sourcing marketplace.

mod types;

pub use types::{BidId, CartItemId, OrderId, ProductId, RequestId, UserId};
