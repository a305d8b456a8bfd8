//! Persistence for the marketplace.
//!
//! Every write goes through a [`UnitOfWork`]: a transaction that is either
//! committed as a whole or rolled back when dropped. Two backends are
//! provided, an in-memory store for tests and local runs and a PostgreSQL
//! store for production.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{FailurePoint, InMemoryMarketStore};
pub use postgres::PostgresMarketStore;
pub use query::{BidFilter, OrderFilter, ProductFilter, RequestFilter};
pub use store::{MarketStore, MarketStoreExt, UnitOfWork};
