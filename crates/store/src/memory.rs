use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{BidId, CartItemId, OrderId, ProductId, RequestId, UserId};
use domain::{
    Bid, BidStatus, Cart, CartItem, Money, Order, OrderStatus, PaymentStatus, Product, Request,
    RequestStatus, UserProfile,
};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    BidFilter, OrderFilter, ProductFilter, RequestFilter, Result, StoreError,
    store::{MarketStore, UnitOfWork},
};

/// Operations that can be made to fail on demand in tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailurePoint {
    AppendCartItem,
    RejectPendingBids,
    AdjustBidCount,
    DecrementAvailability,
    InsertOrder,
    Commit,
}

#[derive(Debug, Clone, Default)]
struct MarketState {
    users: HashMap<UserId, UserProfile>,
    products: HashMap<ProductId, Product>,
    requests: HashMap<RequestId, Request>,
    bids: HashMap<BidId, Bid>,
    carts: HashMap<UserId, Cart>,
    orders: HashMap<OrderId, Order>,
}

/// In-memory marketplace store.
///
/// A unit of work holds the store's lock for its whole lifetime. Reads go to
/// the live state; the first write clones it into a staged copy that
/// replaces the live state on commit. Transactions are serialized and a
/// dropped unit of work leaves no trace. Do not open a second unit of work
/// from the task that holds one.
#[derive(Clone, Default)]
pub struct InMemoryMarketStore {
    state: Arc<Mutex<MarketState>>,
    failures: Arc<Mutex<HashSet<FailurePoint>>>,
}

impl InMemoryMarketStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every call at `point` fail until [`Self::clear_failures`].
    pub async fn fail_at(&self, point: FailurePoint) {
        self.failures.lock().await.insert(point);
    }

    pub async fn clear_failures(&self) {
        self.failures.lock().await.clear();
    }

    /// Returns the total number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.lock().await.orders.len()
    }
}

#[async_trait]
impl MarketStore for InMemoryMarketStore {
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>> {
        let guard = self.state.clone().lock_owned().await;
        let failures = self.failures.lock().await.clone();
        Ok(Box::new(InMemoryUnitOfWork {
            guard,
            staged: None,
            failures,
        }))
    }
}

struct InMemoryUnitOfWork {
    guard: OwnedMutexGuard<MarketState>,
    /// Copy-on-write: `None` until the first write.
    staged: Option<MarketState>,
    failures: HashSet<FailurePoint>,
}

impl InMemoryUnitOfWork {
    fn view(&self) -> &MarketState {
        self.staged.as_ref().unwrap_or(&*self.guard)
    }

    fn staged_mut(&mut self) -> &mut MarketState {
        self.staged
            .get_or_insert_with(|| MarketState::clone(&self.guard))
    }

    #[cfg(test)]
    fn is_staged(&self) -> bool {
        self.staged.is_some()
    }

    fn check(&self, point: FailurePoint) -> Result<()> {
        if self.failures.contains(&point) {
            return Err(StoreError::Unavailable(format!("injected failure at {point:?}")));
        }
        Ok(())
    }

    fn product_mut(&mut self, id: ProductId) -> Result<&mut Product> {
        self.staged_mut()
            .products
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("product", id))
    }

    fn cart_mut(&mut self, user_id: UserId) -> Result<&mut Cart> {
        self.staged_mut()
            .carts
            .get_mut(&user_id)
            .ok_or_else(|| StoreError::not_found("cart", user_id))
    }
}

fn page<T>(items: Vec<T>, offset: Option<usize>, limit: Option<usize>) -> Vec<T> {
    let items = items.into_iter().skip(offset.unwrap_or(0));
    match limit {
        Some(limit) => items.take(limit).collect(),
        None => items.collect(),
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn upsert_user(&mut self, profile: &UserProfile) -> Result<()> {
        self.staged_mut().users.insert(profile.id, profile.clone());
        Ok(())
    }

    async fn get_user(&mut self, id: UserId) -> Result<Option<UserProfile>> {
        Ok(self.view().users.get(&id).cloned())
    }

    async fn get_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.view().products.get(&id).cloned())
    }

    async fn lock_product(&mut self, id: ProductId) -> Result<Option<Product>> {
        self.get_product(id).await
    }

    async fn list_products(&mut self, filter: &ProductFilter) -> Result<Vec<Product>> {
        let mut products: Vec<Product> = self
            .view()
            .products
            .values()
            .filter(|p| filter.supplier_id.is_none_or(|id| p.supplier_id == id))
            .filter(|p| {
                filter
                    .category
                    .as_deref()
                    .is_none_or(|c| p.category.eq_ignore_ascii_case(c))
            })
            .cloned()
            .collect();
        products.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(products, None, filter.limit))
    }

    async fn save_product(&mut self, product: &Product) -> Result<()> {
        self.staged_mut().products.insert(product.id, product.clone());
        Ok(())
    }

    async fn decrement_availability(&mut self, id: ProductId, quantity: u32) -> Result<bool> {
        self.check(FailurePoint::DecrementAvailability)?;
        let product = self.product_mut(id)?;
        if product.available < quantity {
            return Ok(false);
        }
        product.available -= quantity;
        Ok(true)
    }

    async fn increment_sold(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        let product = self.product_mut(id)?;
        product.sold = product.sold.saturating_add(quantity);
        Ok(())
    }

    async fn restore_availability(&mut self, id: ProductId, quantity: u32) -> Result<()> {
        let product = self.product_mut(id)?;
        product.available = product.available.saturating_add(quantity);
        product.sold = product.sold.saturating_sub(quantity);
        Ok(())
    }

    async fn insert_request(&mut self, request: &Request) -> Result<()> {
        if self
            .view()
            .requests
            .values()
            .any(|r| r.request_number == request.request_number)
        {
            return Err(StoreError::Conflict(format!(
                "request number {} already exists",
                request.request_number
            )));
        }
        self.staged_mut().requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn request_number_taken(&mut self, number: &str) -> Result<bool> {
        Ok(self
            .view()
            .requests
            .values()
            .any(|r| r.request_number == number))
    }

    async fn get_request(&mut self, id: RequestId) -> Result<Option<Request>> {
        Ok(self.view().requests.get(&id).cloned())
    }

    async fn lock_request(&mut self, id: RequestId) -> Result<Option<Request>> {
        self.get_request(id).await
    }

    async fn list_requests(&mut self, filter: &RequestFilter) -> Result<Vec<Request>> {
        let mut requests: Vec<Request> = self
            .view()
            .requests
            .values()
            .filter(|r| filter.buyer_id.is_none_or(|id| r.buyer_id == id))
            .filter(|r| filter.status.is_none_or(|s| r.status == s))
            .cloned()
            .collect();
        requests.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(page(requests, None, filter.limit))
    }

    async fn update_request(&mut self, request: &Request, expected: RequestStatus) -> Result<()> {
        let stored = self
            .staged_mut()
            .requests
            .get_mut(&request.id)
            .ok_or_else(|| StoreError::not_found("request", request.id))?;
        if stored.status != expected {
            return Err(StoreError::Conflict(format!(
                "request {} is {}, expected {expected}",
                request.id, stored.status
            )));
        }
        stored.status = request.status;
        stored.accepted_bid = request.accepted_bid;
        stored.accepted_at = request.accepted_at;
        stored.updated_at = request.updated_at;
        Ok(())
    }

    async fn adjust_bid_count(&mut self, id: RequestId, delta: i32) -> Result<()> {
        self.check(FailurePoint::AdjustBidCount)?;
        let request = self
            .staged_mut()
            .requests
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("request", id))?;
        request.bid_count = request.bid_count.saturating_add_signed(delta);
        Ok(())
    }

    async fn insert_bid(&mut self, bid: &Bid) -> Result<()> {
        if self
            .view()
            .bids
            .values()
            .any(|b| b.request_id == bid.request_id && b.supplier_id == bid.supplier_id)
        {
            return Err(StoreError::Conflict(format!(
                "supplier {} already bid on request {}",
                bid.supplier_id, bid.request_id
            )));
        }
        self.staged_mut().bids.insert(bid.id, bid.clone());
        Ok(())
    }

    async fn get_bid(&mut self, id: BidId) -> Result<Option<Bid>> {
        Ok(self.view().bids.get(&id).cloned())
    }

    async fn find_bid(
        &mut self,
        request_id: RequestId,
        supplier_id: UserId,
    ) -> Result<Option<Bid>> {
        Ok(self
            .view()
            .bids
            .values()
            .find(|b| b.request_id == request_id && b.supplier_id == supplier_id)
            .cloned())
    }

    async fn list_bids(&mut self, filter: &BidFilter) -> Result<Vec<Bid>> {
        let requests = &self.view().requests;
        let mut bids: Vec<Bid> = self
            .view()
            .bids
            .values()
            .filter(|b| {
                if let Some(id) = filter.request_id
                    && b.request_id != id
                {
                    return false;
                }
                if let Some(id) = filter.supplier_id
                    && b.supplier_id != id
                {
                    return false;
                }
                if let Some(status) = filter.status
                    && b.status != status
                {
                    return false;
                }
                if let Some(buyer) = filter.buyer_id
                    && requests.get(&b.request_id).is_none_or(|r| r.buyer_id != buyer)
                {
                    return false;
                }
                true
            })
            .cloned()
            .collect();
        bids.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(page(bids, filter.offset, filter.limit))
    }

    async fn update_bid(&mut self, bid: &Bid, expected: BidStatus) -> Result<()> {
        let stored = self
            .staged_mut()
            .bids
            .get_mut(&bid.id)
            .ok_or_else(|| StoreError::not_found("bid", bid.id))?;
        if stored.status != expected {
            return Err(StoreError::Conflict(format!(
                "bid {} is {}, expected {expected}",
                bid.id, stored.status
            )));
        }
        stored.status = bid.status;
        stored.accepted_at = bid.accepted_at;
        stored.rejected_at = bid.rejected_at;
        stored.withdrawn_at = bid.withdrawn_at;
        Ok(())
    }

    async fn reject_pending_bids(
        &mut self,
        request_id: RequestId,
        winner: BidId,
        now: DateTime<Utc>,
    ) -> Result<Vec<BidId>> {
        self.check(FailurePoint::RejectPendingBids)?;
        let mut rejected = Vec::new();
        for bid in self.staged_mut().bids.values_mut() {
            if bid.request_id == request_id && bid.id != winner && bid.status == BidStatus::Pending
            {
                bid.status = BidStatus::Rejected;
                bid.rejected_at = Some(now);
                rejected.push(bid.id);
            }
        }
        Ok(rejected)
    }

    async fn get_cart(&mut self, user_id: UserId) -> Result<Option<Cart>> {
        Ok(self.view().carts.get(&user_id).cloned())
    }

    async fn upsert_cart(&mut self, user_id: UserId, now: DateTime<Utc>) -> Result<Cart> {
        if let Some(cart) = self.view().carts.get(&user_id) {
            return Ok(cart.clone());
        }
        Ok(self
            .staged_mut()
            .carts
            .entry(user_id)
            .or_insert_with(|| Cart::empty(user_id, now))
            .clone())
    }

    async fn append_item(&mut self, user_id: UserId, item: &CartItem) -> Result<CartItem> {
        self.check(FailurePoint::AppendCartItem)?;
        let cart = self.cart_mut(user_id)?;
        Ok(cart.append(item.clone(), item.added_at))
    }

    async fn merge_or_increment_item(
        &mut self,
        user_id: UserId,
        item: &CartItem,
    ) -> Result<CartItem> {
        self.check(FailurePoint::AppendCartItem)?;
        let cart = self.cart_mut(user_id)?;
        cart.merge_or_push(item.clone(), item.added_at)
            .map_err(|e| StoreError::Conflict(e.to_string()))
    }

    async fn set_item_quantity(
        &mut self,
        user_id: UserId,
        item_id: CartItemId,
        quantity: u32,
        unit_price: Money,
    ) -> Result<Option<CartItem>> {
        let cart = self.cart_mut(user_id)?;
        let Some(item) = cart.item_mut(item_id) else {
            return Ok(None);
        };
        item.reprice(quantity, unit_price)
            .map_err(|e| StoreError::Conflict(e.to_string()))?;
        let item = item.clone();
        cart.updated_at = Utc::now();
        Ok(Some(item))
    }

    async fn remove_item(
        &mut self,
        user_id: UserId,
        item_id: CartItemId,
    ) -> Result<Option<CartItem>> {
        let holds_item = self
            .view()
            .carts
            .get(&user_id)
            .is_some_and(|cart| cart.item(item_id).is_some());
        if !holds_item {
            return Ok(None);
        }
        Ok(self.cart_mut(user_id)?.remove(item_id, Utc::now()))
    }

    async fn insert_order(&mut self, order: &Order) -> Result<()> {
        self.check(FailurePoint::InsertOrder)?;
        if self.view().orders.contains_key(&order.id) {
            return Err(StoreError::Conflict(format!("order {} already exists", order.id)));
        }
        if self.order_number_taken(&order.order_number).await? {
            return Err(StoreError::Conflict(format!(
                "order number {} already exists",
                order.order_number
            )));
        }
        self.staged_mut().orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn order_number_taken(&mut self, number: &str) -> Result<bool> {
        Ok(self.view().orders.values().any(|o| o.order_number == number))
    }

    async fn get_order(&mut self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.view().orders.get(&id).cloned())
    }

    async fn list_orders(&mut self, filter: &OrderFilter) -> Result<Vec<Order>> {
        let mut orders: Vec<Order> = self
            .view()
            .orders
            .values()
            .filter(|o| filter.buyer_id.is_none_or(|id| o.buyer.id == id))
            .filter(|o| filter.supplier_id.is_none_or(|id| o.supplier.id == id))
            .filter(|o| filter.status.is_none_or(|s| o.status == s))
            .cloned()
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(orders)
    }

    async fn update_order(
        &mut self,
        order: &Order,
        expected_status: OrderStatus,
        expected_payment: PaymentStatus,
    ) -> Result<()> {
        let stored = self
            .staged_mut()
            .orders
            .get_mut(&order.id)
            .ok_or_else(|| StoreError::not_found("order", order.id))?;
        if stored.status != expected_status || stored.payment_status != expected_payment {
            return Err(StoreError::Conflict(format!(
                "order {} is {}/{}, expected {expected_status}/{expected_payment}",
                order.id, stored.status, stored.payment_status
            )));
        }
        stored.status = order.status;
        stored.payment_status = order.payment_status;
        stored.updated_at = order.updated_at;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.check(FailurePoint::Commit)?;
        let InMemoryUnitOfWork {
            mut guard, staged, ..
        } = *self;
        if let Some(staged) = staged {
            *guard = staged;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use domain::{
        ExpansionDefaults, NewProduct, NewRequest, VariantSelection,
    };

    fn product(supplier_id: UserId) -> Product {
        Product::create(
            ProductId::new(),
            supplier_id,
            NewProduct {
                title: "Mug".to_string(),
                price: Money::from_cents(400),
                available: Some(10),
                ..NewProduct::default()
            },
            ExpansionDefaults::default(),
            Utc::now(),
        )
        .unwrap()
    }

    fn request(buyer_id: UserId) -> Request {
        Request::create(
            RequestId::new(),
            buyer_id,
            NewRequest {
                product_name: "Mugs".to_string(),
                quantity: 100,
                ..NewRequest::default()
            },
            Duration::days(7),
            Utc::now(),
        )
        .unwrap()
    }

    fn bid(request: &Request, supplier_id: UserId) -> Bid {
        Bid {
            id: BidId::new(),
            request_id: request.id,
            supplier_id,
            supplier_name: "Kiln".to_string(),
            product_id: ProductId::new(),
            product_title: "Mug".to_string(),
            bid_price: Money::from_cents(350),
            original_price: Money::from_cents(400),
            quantity: 100,
            delivery_time_days: 10,
            message: String::new(),
            status: BidStatus::Pending,
            created_at: Utc::now(),
            accepted_at: None,
            rejected_at: None,
            withdrawn_at: None,
        }
    }

    #[tokio::test]
    async fn dropped_unit_of_work_rolls_back() {
        let store = InMemoryMarketStore::new();
        let product = product(UserId::new());
        {
            let mut uow = store.begin().await.unwrap();
            uow.save_product(&product).await.unwrap();
        }
        let mut uow = store.begin().await.unwrap();
        assert!(uow.get_product(product.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn commit_publishes_writes() {
        let store = InMemoryMarketStore::new();
        let product = product(UserId::new());
        let mut uow = store.begin().await.unwrap();
        uow.save_product(&product).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.get_product(product.id).await.unwrap(), Some(product));
    }

    #[tokio::test]
    async fn reads_do_not_stage_a_copy() {
        let store = InMemoryMarketStore::new();
        let product = product(UserId::new());
        let mut uow = store.begin().await.unwrap();
        uow.save_product(&product).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = InMemoryUnitOfWork {
            guard: store.state.clone().lock_owned().await,
            staged: None,
            failures: HashSet::new(),
        };
        assert!(uow.get_product(product.id).await.unwrap().is_some());
        assert_eq!(uow.list_products(&ProductFilter::default()).await.unwrap().len(), 1);
        assert!(uow.get_cart(UserId::new()).await.unwrap().is_none());
        assert!(uow.remove_item(UserId::new(), CartItemId::new()).await.unwrap().is_none());
        assert!(!uow.is_staged());

        uow.decrement_availability(product.id, 1).await.unwrap();
        assert!(uow.is_staged());
        assert_eq!(uow.guard.products[&product.id].available, 10);
        assert_eq!(uow.get_product(product.id).await.unwrap().unwrap().available, 9);
    }

    #[tokio::test]
    async fn read_only_commit_keeps_state() {
        let store = InMemoryMarketStore::new();
        let product = product(UserId::new());
        let mut uow = store.begin().await.unwrap();
        uow.save_product(&product).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        uow.get_product(product.id).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.get_product(product.id).await.unwrap(), Some(product));
    }

    #[tokio::test]
    async fn order_numbers_are_unique() {
        let store = InMemoryMarketStore::new();
        let line = domain::OrderLine {
            product_id: ProductId::new(),
            product_title: "Mug".to_string(),
            image: None,
            selection: VariantSelection::default(),
            quantity: 1,
            unit_price: Money::from_cents(400),
            total_price: Money::from_cents(400),
            bid_id: None,
            request_id: None,
            cart_item_id: None,
        };
        let party = domain::PartySnapshot {
            id: UserId::new(),
            name: "Nia".to_string(),
            email: "nia@example.com".to_string(),
        };
        let place = |line: domain::OrderLine| {
            Order::place(party.clone(), party.clone(), vec![line], None, None, Utc::now()).unwrap()
        };
        let first = place(line.clone());
        let mut clash = place(line);
        clash.order_number = first.order_number.clone();

        let mut uow = store.begin().await.unwrap();
        assert!(!uow.order_number_taken(&first.order_number).await.unwrap());
        uow.insert_order(&first).await.unwrap();
        assert!(uow.order_number_taken(&first.order_number).await.unwrap());
        assert!(uow.insert_order(&clash).await.unwrap_err().is_conflict());
    }

    #[tokio::test]
    async fn decrement_availability_is_conditional() {
        let store = InMemoryMarketStore::new();
        let product = product(UserId::new());
        let mut uow = store.begin().await.unwrap();
        uow.save_product(&product).await.unwrap();

        assert!(uow.decrement_availability(product.id, 7).await.unwrap());
        assert!(!uow.decrement_availability(product.id, 7).await.unwrap());
        let stored = uow.get_product(product.id).await.unwrap().unwrap();
        assert_eq!(stored.available, 3);
    }

    #[tokio::test]
    async fn duplicate_bid_conflicts() {
        let store = InMemoryMarketStore::new();
        let request = request(UserId::new());
        let supplier = UserId::new();
        let mut uow = store.begin().await.unwrap();
        uow.insert_request(&request).await.unwrap();
        uow.insert_bid(&bid(&request, supplier)).await.unwrap();

        let err = uow.insert_bid(&bid(&request, supplier)).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn update_bid_checks_expected_status() {
        let store = InMemoryMarketStore::new();
        let request = request(UserId::new());
        let mut pending = bid(&request, UserId::new());
        let mut uow = store.begin().await.unwrap();
        uow.insert_bid(&pending).await.unwrap();

        pending.transition(BidStatus::Accepted, Utc::now()).unwrap();
        uow.update_bid(&pending, BidStatus::Pending).await.unwrap();
        let err = uow.update_bid(&pending, BidStatus::Pending).await.unwrap_err();
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn reject_pending_bids_spares_the_winner() {
        let store = InMemoryMarketStore::new();
        let request = request(UserId::new());
        let winner = bid(&request, UserId::new());
        let loser = bid(&request, UserId::new());
        let mut withdrawn = bid(&request, UserId::new());
        withdrawn.transition(BidStatus::Withdrawn, Utc::now()).unwrap();

        let mut uow = store.begin().await.unwrap();
        for b in [&winner, &loser, &withdrawn] {
            uow.insert_bid(b).await.unwrap();
        }
        let rejected = uow
            .reject_pending_bids(request.id, winner.id, Utc::now())
            .await
            .unwrap();

        assert_eq!(rejected, vec![loser.id]);
        let stored = uow.get_bid(withdrawn.id).await.unwrap().unwrap();
        assert_eq!(stored.status, BidStatus::Withdrawn);
    }

    #[tokio::test]
    async fn bid_count_saturates_at_zero() {
        let store = InMemoryMarketStore::new();
        let request = request(UserId::new());
        let mut uow = store.begin().await.unwrap();
        uow.insert_request(&request).await.unwrap();
        uow.adjust_bid_count(request.id, -1).await.unwrap();
        assert_eq!(uow.get_request(request.id).await.unwrap().unwrap().bid_count, 0);
    }

    #[tokio::test]
    async fn injected_failure_surfaces_as_unavailable() {
        let store = InMemoryMarketStore::new();
        store.fail_at(FailurePoint::AppendCartItem).await;
        let buyer = UserId::new();
        let product = product(UserId::new());

        let mut uow = store.begin().await.unwrap();
        uow.upsert_cart(buyer, Utc::now()).await.unwrap();
        let item =
            CartItem::regular(&product, VariantSelection::default(), 1, product.price, Utc::now())
                .unwrap();
        assert!(matches!(
            uow.append_item(buyer, &item).await,
            Err(StoreError::Unavailable(_))
        ));
    }
}
