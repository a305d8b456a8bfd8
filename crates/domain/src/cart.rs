//! Buyer carts.
//!
//! A cart holds two kinds of lines. Regular lines come from the catalog and
//! merge when they point at the same product and variant selectors. Bid lines
//! come from an accepted bid, never merge, and cannot shrink below the
//! accepted quantity.

use chrono::{DateTime, Utc};
use common::{BidId, CartItemId, ProductId, RequestId, UserId};
use serde::{Deserialize, Serialize};

use crate::bid::Bid;
use crate::error::DomainError;
use crate::money::Money;
use crate::product::{Product, VariantSelection};

/// Where a cart line came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LineOrigin {
    Regular,
    #[serde(rename_all = "camelCase")]
    Bid {
        bid_id: BidId,
        request_id: RequestId,
        original_price: Money,
        discount_percent: i64,
    },
}

/// Identity used to merge regular lines.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeKey {
    pub product_id: ProductId,
    pub selection: VariantSelection,
}

impl MergeKey {
    /// Stable string form, used as a unique index key by SQL stores.
    pub fn encode(&self) -> String {
        let part = |v: &Option<String>| v.as_deref().unwrap_or("").to_ascii_lowercase();
        format!(
            "{}|{}|{}|{}|{}|{}",
            self.product_id,
            part(&self.selection.sku),
            part(&self.selection.color),
            part(&self.selection.size),
            part(&self.selection.material),
            part(&self.selection.style),
        )
    }
}

/// A single cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub id: CartItemId,
    pub product_id: ProductId,
    pub supplier_id: UserId,
    pub product_title: String,
    pub image: Option<String>,
    pub selection: VariantSelection,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
    pub min_order_quantity: u32,
    pub max_order_quantity: Option<u32>,
    pub origin: LineOrigin,
    pub added_at: DateTime<Utc>,
}

impl CartItem {
    /// Builds a regular line from a live product snapshot.
    pub fn regular(
        product: &Product,
        selection: VariantSelection,
        quantity: u32,
        unit_price: Money,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id: CartItemId::new(),
            product_id: product.id,
            supplier_id: product.supplier_id,
            product_title: product.title.clone(),
            image: product.primary_image().map(str::to_string),
            selection,
            quantity,
            unit_price,
            total_price: unit_price.checked_multiply(quantity)?,
            min_order_quantity: product.moq,
            max_order_quantity: Some(product.available),
            origin: LineOrigin::Regular,
            added_at: now,
        })
    }

    /// Builds the non-reducible line materialized by bid acceptance.
    ///
    /// The product snapshot supplies title and image; price and quantity come
    /// from the bid alone.
    pub fn from_accepted_bid(
        bid: &Bid,
        product: &Product,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            id: CartItemId::new(),
            product_id: bid.product_id,
            supplier_id: bid.supplier_id,
            product_title: product.title.clone(),
            image: product.primary_image().map(str::to_string),
            selection: VariantSelection::default(),
            quantity: bid.quantity,
            unit_price: bid.bid_price,
            total_price: bid.total_price()?,
            min_order_quantity: bid.quantity,
            max_order_quantity: None,
            origin: LineOrigin::Bid {
                bid_id: bid.id,
                request_id: bid.request_id,
                original_price: bid.original_price,
                discount_percent: bid.discount_percent(),
            },
            added_at: now,
        })
    }

    pub fn is_bulk_order(&self) -> bool {
        matches!(self.origin, LineOrigin::Bid { .. })
    }

    pub fn bid_id(&self) -> Option<BidId> {
        match self.origin {
            LineOrigin::Bid { bid_id, .. } => Some(bid_id),
            LineOrigin::Regular => None,
        }
    }

    /// Merge identity; bid lines have none.
    pub fn merge_key(&self) -> Option<MergeKey> {
        match self.origin {
            LineOrigin::Regular => Some(MergeKey {
                product_id: self.product_id,
                selection: self.selection.clone(),
            }),
            LineOrigin::Bid { .. } => None,
        }
    }

    /// Validates a new quantity against the line's floor and ceiling.
    pub fn check_quantity(&self, quantity: u32) -> Result<(), DomainError> {
        if quantity == 0 {
            return Err(DomainError::InvalidQuantity { quantity });
        }
        if quantity < self.min_order_quantity {
            return Err(DomainError::BelowMinimumOrder {
                quantity,
                minimum: self.min_order_quantity,
            });
        }
        if let Some(maximum) = self.max_order_quantity
            && quantity > maximum
        {
            return Err(DomainError::AboveMaximumOrder { quantity, maximum });
        }
        Ok(())
    }

    /// Sets quantity and unit price and recomputes the line total.
    ///
    /// Leaves the line untouched when the total does not fit.
    pub fn reprice(&mut self, quantity: u32, unit_price: Money) -> Result<(), DomainError> {
        self.total_price = unit_price.checked_multiply(quantity)?;
        self.quantity = quantity;
        self.unit_price = unit_price;
        Ok(())
    }
}

/// One cart per buyer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    pub user_id: UserId,
    pub items: Vec<CartItem>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    /// An empty cart with default fields.
    pub fn empty(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            items: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn item(&self, id: CartItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == id)
    }

    pub fn item_mut(&mut self, id: CartItemId) -> Option<&mut CartItem> {
        self.items.iter_mut().find(|item| item.id == id)
    }

    /// Finds the regular line a new line would merge into.
    pub fn find_mergeable(&self, key: &MergeKey) -> Option<&CartItem> {
        self.items
            .iter()
            .find(|item| item.merge_key().as_ref() == Some(key))
    }

    pub fn bid_line(&self, bid_id: BidId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.bid_id() == Some(bid_id))
    }

    /// Appends a line. Bid lines are idempotent per bid: a second append for
    /// the same bid returns the existing line untouched.
    pub fn append(&mut self, item: CartItem, now: DateTime<Utc>) -> CartItem {
        if let Some(bid_id) = item.bid_id()
            && let Some(existing) = self.bid_line(bid_id)
        {
            return existing.clone();
        }
        self.items.push(item.clone());
        self.updated_at = now;
        item
    }

    /// Merges a regular line into an identical one, or appends it.
    ///
    /// On merge the quantities are summed and the incoming unit price, which
    /// the caller resolved for the merged quantity, replaces the old one. A
    /// sum past `u32::MAX` fails and leaves the cart unchanged.
    pub fn merge_or_push(
        &mut self,
        item: CartItem,
        now: DateTime<Utc>,
    ) -> Result<CartItem, DomainError> {
        let Some(key) = item.merge_key() else {
            return Ok(self.append(item, now));
        };
        if let Some(existing) = self
            .items
            .iter_mut()
            .find(|line| line.merge_key().as_ref() == Some(&key))
        {
            let quantity = existing.quantity.checked_add(item.quantity).ok_or(
                DomainError::QuantityOverflow {
                    current: existing.quantity,
                    added: item.quantity,
                },
            )?;
            existing.reprice(quantity, item.unit_price)?;
            existing.min_order_quantity = item.min_order_quantity;
            existing.max_order_quantity = item.max_order_quantity;
            let merged = existing.clone();
            self.updated_at = now;
            return Ok(merged);
        }
        self.updated_at = now;
        self.items.push(item.clone());
        Ok(item)
    }

    pub fn remove(&mut self, id: CartItemId, now: DateTime<Utc>) -> Option<CartItem> {
        let index = self.items.iter().position(|item| item.id == id)?;
        self.updated_at = now;
        Some(self.items.remove(index))
    }

    /// Sum of line totals, saturating. Orders recompute their own total.
    pub fn subtotal(&self) -> Money {
        self.items.iter().map(|item| item.total_price).sum()
    }

    pub fn total_quantity(&self) -> u32 {
        self.items
            .iter()
            .fold(0u32, |total, item| total.saturating_add(item.quantity))
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bid::fixtures::pending_bid;
    use crate::product::NewProduct;
    use crate::variants::ExpansionDefaults;

    fn product() -> Product {
        Product::create(
            ProductId::new(),
            UserId::new(),
            NewProduct {
                title: "Tote bag".to_string(),
                price: Money::from_cents(300),
                available: Some(1_000),
                moq: Some(5),
                images: vec!["https://cdn.example.com/tote.png".to_string()],
                ..NewProduct::default()
            },
            ExpansionDefaults::default(),
            Utc::now(),
        )
        .unwrap()
    }

    fn line(product: &Product, selection: VariantSelection, quantity: u32, cents: i64) -> CartItem {
        CartItem::regular(product, selection, quantity, Money::from_cents(cents), Utc::now()).unwrap()
    }

    #[test]
    fn identical_regular_lines_merge() {
        let now = Utc::now();
        let product = product();
        let mut cart = Cart::empty(UserId::new(), now);

        cart.merge_or_push(line(&product, VariantSelection::default(), 10, 300), now).unwrap();
        let merged = cart.merge_or_push(line(&product, VariantSelection::default(), 15, 280), now).unwrap();

        assert_eq!(cart.items.len(), 1);
        assert_eq!(merged.quantity, 25);
        assert_eq!(merged.total_price, Money::from_cents(25 * 280));
    }

    #[test]
    fn different_selectors_do_not_merge() {
        let now = Utc::now();
        let product = product();
        let mut cart = Cart::empty(UserId::new(), now);

        cart.merge_or_push(line(&product, VariantSelection::sku("SKU_0"), 10, 300), now).unwrap();
        cart.merge_or_push(line(&product, VariantSelection::sku("SKU_1"), 10, 300), now).unwrap();
        assert_eq!(cart.items.len(), 2);
    }

    #[test]
    fn bid_lines_never_merge() {
        let now = Utc::now();
        let product = product();
        let mut cart = Cart::empty(UserId::new(), now);

        let mut first = pending_bid(RequestId::new(), product.supplier_id);
        first.product_id = product.id;
        let mut second = pending_bid(RequestId::new(), product.supplier_id);
        second.product_id = product.id;

        let first = CartItem::from_accepted_bid(&first, &product, now).unwrap();
        let second = CartItem::from_accepted_bid(&second, &product, now).unwrap();
        cart.merge_or_push(first, now).unwrap();
        cart.merge_or_push(second, now).unwrap();
        cart.merge_or_push(line(&product, VariantSelection::default(), 10, 300), now).unwrap();

        assert_eq!(cart.items.len(), 3);
        assert_eq!(cart.items.iter().filter(|i| i.is_bulk_order()).count(), 2);
    }

    #[test]
    fn bid_line_append_is_idempotent() {
        let now = Utc::now();
        let product = product();
        let mut cart = Cart::empty(UserId::new(), now);
        let bid = pending_bid(RequestId::new(), product.supplier_id);

        let first = cart.append(CartItem::from_accepted_bid(&bid, &product, now).unwrap(), now);
        let again = cart.append(CartItem::from_accepted_bid(&bid, &product, now).unwrap(), now);

        assert_eq!(cart.items.len(), 1);
        assert_eq!(first.id, again.id);
    }

    #[test]
    fn bid_line_snapshot_fields() {
        let now = Utc::now();
        let product = product();
        let bid = pending_bid(RequestId::new(), product.supplier_id);
        let line = CartItem::from_accepted_bid(&bid, &product, now).unwrap();

        assert_eq!(line.quantity, bid.quantity);
        assert_eq!(line.unit_price, bid.bid_price);
        assert_eq!(Ok(line.total_price), bid.bid_price.checked_multiply(bid.quantity));
        assert_eq!(line.min_order_quantity, bid.quantity);
        assert_eq!(line.image.as_deref(), Some("https://cdn.example.com/tote.png"));
        assert!(matches!(
            line.origin,
            LineOrigin::Bid {
                discount_percent: 20,
                ..
            }
        ));
    }

    #[test]
    fn bid_line_quantity_cannot_shrink() {
        let now = Utc::now();
        let product = product();
        let bid = pending_bid(RequestId::new(), product.supplier_id);
        let line = CartItem::from_accepted_bid(&bid, &product, now).unwrap();

        assert!(matches!(
            line.check_quantity(bid.quantity - 1),
            Err(DomainError::BelowMinimumOrder { .. })
        ));
        assert!(line.check_quantity(bid.quantity + 50).is_ok());
    }

    #[test]
    fn regular_line_respects_max() {
        let now = Utc::now();
        let product = product();
        let line = line(&product, VariantSelection::default(), 10, 300);
        assert!(matches!(
            line.check_quantity(1_001),
            Err(DomainError::AboveMaximumOrder { .. })
        ));
    }

    #[test]
    fn remove_and_subtotal() {
        let now = Utc::now();
        let product = product();
        let mut cart = Cart::empty(UserId::new(), now);
        let line = cart.merge_or_push(line(&product, VariantSelection::default(), 10, 300), now).unwrap();
        assert_eq!(cart.subtotal(), Money::from_cents(3_000));

        let removed = cart.remove(line.id, now).unwrap();
        assert_eq!(removed.id, line.id);
        assert!(cart.is_empty());
        assert!(cart.remove(line.id, now).is_none());
    }

    #[test]
    fn merge_key_encoding_ignores_case() {
        let product_id = ProductId::new();
        let a = MergeKey {
            product_id,
            selection: VariantSelection {
                color: Some("Red".to_string()),
                ..VariantSelection::default()
            },
        };
        let b = MergeKey {
            product_id,
            selection: VariantSelection {
                color: Some("red".to_string()),
                ..VariantSelection::default()
            },
        };
        assert_eq!(a.encode(), b.encode());
    }

    #[test]
    fn merge_past_u32_max_fails_and_leaves_cart_unchanged() {
        let now = Utc::now();
        let product = product();
        let mut cart = Cart::empty(UserId::new(), now);
        cart.merge_or_push(line(&product, VariantSelection::default(), 10, 300), now).unwrap();

        let err = cart
            .merge_or_push(
                line(&product, VariantSelection::default(), u32::MAX - 5, 1),
                now,
            )
            .unwrap_err();

        assert_eq!(
            err,
            DomainError::QuantityOverflow {
                current: 10,
                added: u32::MAX - 5
            }
        );
        assert_eq!(cart.items.len(), 1);
        assert_eq!(cart.items[0].quantity, 10);
        assert_eq!(cart.items[0].total_price, Money::from_cents(3_000));
    }

    #[test]
    fn reprice_refuses_totals_that_do_not_fit() {
        let product = product();
        let mut item = line(&product, VariantSelection::default(), 10, 300);
        assert_eq!(
            item.reprice(u32::MAX, Money::from_cents(i64::MAX / 2)),
            Err(DomainError::AmountOverflow)
        );
        assert_eq!(item.quantity, 10);
        assert_eq!(item.total_price, Money::from_cents(3_000));
    }

    #[test]
    fn total_quantity_saturates() {
        let now = Utc::now();
        let product = product();
        let mut cart = Cart::empty(UserId::new(), now);
        cart.merge_or_push(line(&product, VariantSelection::sku("SKU_0"), u32::MAX, 1), now)
            .unwrap();
        cart.merge_or_push(line(&product, VariantSelection::sku("SKU_1"), 10, 1), now).unwrap();
        assert_eq!(cart.total_quantity(), u32::MAX);
    }
}
