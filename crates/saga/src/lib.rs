//! Marketplace services and the bid acceptance saga.
//!
//! This crate holds the application layer of the sourcing marketplace:
//! catalog, requests, bids, carts and orders, each behind a service that
//! takes the caller's [`domain::Actor`] explicitly.
//!
//! Accepting a bid follows these steps in one unit of work:
//! 1. Accept the bid
//! 2. Reject the other pending bids on the request
//! 3. Fulfill the request
//! 4. Append the bid line to the buyer's cart
//!
//! If any step fails, the unit of work is dropped and nothing is written.

pub mod bid_acceptance;
pub mod checkout;
pub mod coordinator;
pub mod error;
pub mod marketplace;
pub mod services;
pub mod settings;

pub use checkout::{Checkout, OrderItemInput, OrderMaterializer, PlaceOrder};
pub use coordinator::{AcceptanceReceipt, BidAcceptanceSaga};
pub use error::{ErrorKind, Result, SagaError};
pub use marketplace::Marketplace;
pub use services::{
    AddToCart, BidService, CartService, CartView, CatalogService, DirectoryService, OrderService,
    ProfileInput, RequestService, RequestView,
};
pub use settings::MarketSettings;
