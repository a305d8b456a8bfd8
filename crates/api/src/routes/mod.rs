//! HTTP route handlers.

pub mod bids;
pub mod cart;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod products;
pub mod requests;
pub mod users;
