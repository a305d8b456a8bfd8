//! Domain layer for the sourcing marketplace.
//!
//! Everything here is pure: no I/O, no clocks read behind the caller's back.
//! The crate provides:
//! - money arithmetic in integer cents
//! - tiered unit price resolution
//! - variant combination expansion
//! - products, requests, bids, carts and orders with their state machines

pub mod actor;
pub mod bid;
pub mod cart;
pub mod error;
pub mod money;
pub mod order;
pub mod pricing;
pub mod product;
pub mod request;
pub mod variants;

pub use actor::{Actor, PartySnapshot, Role, UserProfile};
pub use bid::{Bid, BidStatus, NewBid};
pub use cart::{Cart, CartItem, LineOrigin, MergeKey};
pub use error::DomainError;
pub use money::{MAX_UNIT_PRICE, Money};
pub use order::{Order, OrderLine, OrderStatus, PaymentStatus};
pub use pricing::{PriceTier, matching_tier, resolve_unit_price, validate_tiers};
pub use product::{
    NewProduct, PriceQuote, Product, ProductUpdate, UpdateReport, VariantSelection,
};
pub use request::{DisplayStatus, NewRequest, Request, RequestStatus};
pub use variants::{
    DEFAULT_VARIANT_MOQ, DEFAULT_VARIANT_STOCK, ExpansionDefaults, OptionKind, OptionValue,
    MAX_VARIANTS, Regeneration, Variant, VariantAttribute, VariantOption, combination_count,
    expand_variants, regenerate,
};
