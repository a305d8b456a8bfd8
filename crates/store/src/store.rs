use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BidId, CartItemId, OrderId, ProductId, RequestId, UserId};
use domain::{
    Bid, BidStatus, Cart, CartItem, Money, Order, OrderStatus, PaymentStatus, Product, Request,
    RequestStatus, UserProfile,
};

use crate::{BidFilter, OrderFilter, ProductFilter, RequestFilter, Result};

/// A storage backend that hands out transactions.
///
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait MarketStore: Send + Sync {
    /// Opens a unit of work. Nothing it writes is visible to others until
    /// [`UnitOfWork::commit`] succeeds; dropping it rolls back.
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>>;
}

/// One atomic transaction over every marketplace collection.
///
/// Conditional writes (`update_*` with an expected status) fail with
/// [`StoreError::Conflict`](crate::StoreError::Conflict) when the stored row
/// has moved on, which is how concurrent transitions are detected.
#[async_trait]
pub trait UnitOfWork: Send {
    // ---- users ----------------------------------------------------------

    async fn upsert_user(&mut self, profile: &UserProfile) -> Result<()>;

    async fn get_user(&mut self, id: UserId) -> Result<Option<UserProfile>>;

    // ---- catalog --------------------------------------------------------

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>>;

    /// Reads a product and holds it against concurrent writers until the
    /// transaction ends.
    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>>;

    async fn list_products(&mut self, filter: &ProductFilter) -> Result<Vec<Product>>;

    /// Inserts or fully replaces a product.
    async fn save_product(&mut self, product: &Product) -> Result<()>;

    /// `available -= quantity` only when enough stock remains.
    ///
    /// Returns `false` (and changes nothing) when stock is short.
    async fn decrement_availability(&mut self, id: ProductId, quantity: u32) -> Result<bool>;

    async fn increment_sold(&mut self, id: ProductId, quantity: u32) -> Result<()>;

    /// Puts stock back after a cancellation: `available += quantity` and
    /// `sold -= quantity` (never below zero).
    async fn restore_availability(&mut self, id: ProductId, quantity: u32) -> Result<()>;

    // ---- requests -------------------------------------------------------

    async fn insert_request(&mut self, request: &Request) -> Result<()>;

    /// True when a stored request already uses `number`.
    async fn request_number_taken(&mut self, number: &str) -> Result<bool>;

    async fn get_request(&mut self, id: RequestId) -> Result<Option<Request>>;

    /// Reads a request and serializes competing writers on it.
    async fn lock_request(&mut self, id: RequestId) -> Result<Option<Request>>;

    async fn list_requests(&mut self, filter: &RequestFilter) -> Result<Vec<Request>>;

    /// Writes the request's mutable fields if it is still in `expected`.
    async fn update_request(&mut self, request: &Request, expected: RequestStatus) -> Result<()>;

    /// Adds `delta` to `bid_count`, saturating at zero.
    async fn adjust_bid_count(&mut self, id: RequestId, delta: i32) -> Result<()>;

    // ---- bids -----------------------------------------------------------

    /// Fails with a conflict when the supplier already bid on the request.
    async fn insert_bid(&mut self, bid: &Bid) -> Result<()>;

    async fn get_bid(&mut self, id: BidId) -> Result<Option<Bid>>;

    async fn find_bid(&mut self, request_id: RequestId, supplier_id: UserId)
    -> Result<Option<Bid>>;

    async fn list_bids(&mut self, filter: &BidFilter) -> Result<Vec<Bid>>;

    /// Writes the bid's status and timestamps if it is still in `expected`.
    async fn update_bid(&mut self, bid: &Bid, expected: BidStatus) -> Result<()>;

    /// Rejects every pending bid on the request except `winner`.
    async fn reject_pending_bids(
        &mut self,
        request_id: RequestId,
        winner: BidId,
        now: DateTime<Utc>,
    ) -> Result<Vec<BidId>>;

    // ---- carts ----------------------------------------------------------

    async fn get_cart(&mut self, user_id: UserId) -> Result<Option<Cart>>;

    /// Returns the buyer's cart, creating an empty one if needed.
    async fn upsert_cart(&mut self, user_id: UserId, now: DateTime<Utc>) -> Result<Cart>;

    /// Appends a line. A bid line whose bid already has a line returns the
    /// existing line instead of adding a second one.
    async fn append_item(&mut self, user_id: UserId, item: &CartItem) -> Result<CartItem>;

    /// Adds `item.quantity` to the regular line with the same merge key, or
    /// inserts the item. The stored unit price becomes `item.unit_price`.
    async fn merge_or_increment_item(&mut self, user_id: UserId, item: &CartItem)
    -> Result<CartItem>;

    async fn set_item_quantity(
        &mut self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: u32,
        unit_price: Money,
    ) -> Result<Option<CartItem>>;

    async fn remove_item(&mut self, user_id: UserId, item_id: CartItemId)
    -> Result<Option<CartItem>>;

    // ---- orders ---------------------------------------------------------

    async fn insert_order(&mut self, order: &Order) -> Result<()>;

    /// True when a stored order already uses `number`.
    async fn order_number_taken(&mut self, number: &str) -> Result<bool>;

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>>;

    async fn list_orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>>;

    /// Writes status fields if both still hold their expected values.
    async fn update_order(
        &mut self,
        order: &Order,
        expected_status: OrderStatus,
        expected_payment: PaymentStatus,
    ) -> Result<()>;

    // ---- lifecycle ------------------------------------------------------

    async fn commit(self: Box<Self>) -> Result<()>;
}

/// Read-only conveniences that run a single query in a throwaway
/// transaction.
#[async_trait]
pub trait MarketStoreExt: MarketStore {
    async fn product(&self, id: ProductId) -> Result<Option<Product>> {
        self.begin().await?.get_product(id).await
    }

    async fn products(&self, filter: ProductFilter) -> Result<Vec<Product>> {
        self.begin().await?.list_products(&filter).await
    }

    async fn request(&self, id: RequestId) -> Result<Option<Request>> {
        self.begin().await?.get_request(id).await
    }

    async fn requests(&self, filter: RequestFilter) -> Result<Vec<Request>> {
        self.begin().await?.list_requests(&filter).await
    }

    async fn bid(&self, id: BidId) -> Result<Option<Bid>> {
        self.begin().await?.get_bid(id).await
    }

    async fn bids(&self, filter: BidFilter) -> Result<Vec<Bid>> {
        self.begin().await?.list_bids(&filter).await
    }

    async fn cart(&self, user_id: UserId) -> Result<Option<Cart>> {
        self.begin().await?.get_cart(user_id).await
    }

    async fn order(&self, id: OrderId) -> Result<Option<Order>> {
        self.begin().await?.get_order(id).await
    }

    async fn orders(&self, filter: OrderFilter) -> Result<Vec<Order>> {
        self.begin().await?.list_orders(&filter).await
    }

    async fn user(&self, id: UserId) -> Result<Option<UserProfile>> {
        self.begin().await?.get_user(id).await
    }
}

// Blanket implementation for all MarketStore implementations
impl<T: MarketStore + ?Sized> MarketStoreExt for T {}
