//! Cart aggregator.
//!
//! Regular lines merge on product and variant selectors and are re-priced
//! against the tier table at the merged quantity. Bid lines are written only
//! by the acceptance saga; here they can grow but never drop below the
//! accepted quantity, and they keep the bid price.

use chrono::Utc;
use common::{CartItemId, ProductId};
use domain::{Actor, Cart, CartItem, MergeKey, Money, Role, VariantSelection};
use serde::{Deserialize, Serialize};
use store::{MarketStore, UnitOfWork};

use crate::error::{Result, SagaError};
use crate::services::require_role;

/// Request to put a catalog product into the cart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCart {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub selection: VariantSelection,
}

/// A cart with its derived totals.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartView {
    #[serde(flatten)]
    pub cart: Cart,
    pub subtotal: Money,
    pub total_quantity: u32,
}

impl From<Cart> for CartView {
    fn from(cart: Cart) -> Self {
        Self {
            subtotal: cart.subtotal(),
            total_quantity: cart.total_quantity(),
            cart,
        }
    }
}

#[derive(Clone)]
pub struct CartService<S> {
    store: S,
}

impl<S: MarketStore + Clone> CartService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Returns the caller's cart, creating an empty one on first use.
    pub async fn get_cart(&self, actor: &Actor) -> Result<CartView> {
        require_role(actor, Role::Buyer, "hold a cart")?;
        let mut uow = self.store.begin().await?;
        let cart = uow.upsert_cart(actor.user_id, Utc::now()).await?;
        uow.commit().await?;
        Ok(cart.into())
    }

    /// Adds a product line, merging into an identical existing line.
    #[tracing::instrument(skip(self, input), fields(buyer_id = %actor.user_id, product_id = %input.product_id))]
    pub async fn add_item(&self, actor: &Actor, input: AddToCart) -> Result<CartItem> {
        require_role(actor, Role::Buyer, "add to a cart")?;
        if input.quantity == 0 {
            return Err(SagaError::Validation(
                "quantity must be greater than 0".to_string(),
            ));
        }
        let now = Utc::now();

        let mut uow = self.store.begin().await?;
        let product = uow
            .lock_product(input.product_id)
            .await?
            .ok_or_else(|| SagaError::not_found("product", input.product_id))?;
        let variant = product.find_variant(&input.selection)?;
        let selection = match variant {
            Some(v) => input.selection.normalized_for(v),
            None => input.selection,
        };

        let cart = uow.upsert_cart(actor.user_id, now).await?;
        let key = MergeKey {
            product_id: product.id,
            selection: selection.clone(),
        };
        let existing = cart.find_mergeable(&key).map_or(0, |item| item.quantity);
        let short_of_stock = || {
            SagaError::conflict(format!(
                "only {} units of {} available",
                product.available, product.title
            ))
        };
        // A sum past u32::MAX is necessarily above `available`.
        let merged_quantity = existing
            .checked_add(input.quantity)
            .ok_or_else(short_of_stock)?;

        if !product.check_order_quantity(merged_quantity)? {
            return Err(short_of_stock());
        }
        let unit_price = product.unit_price_for(merged_quantity, variant)?;

        let line = CartItem::regular(&product, selection, input.quantity, unit_price, now)?;
        let stored = uow.merge_or_increment_item(actor.user_id, &line).await?;
        uow.commit().await?;

        metrics::counter!("cart_items_added_total").increment(1);
        tracing::debug!(
            item_id = %stored.id,
            quantity = stored.quantity,
            unit_price = %stored.unit_price,
            "cart line written"
        );
        Ok(stored)
    }

    /// Changes a line's quantity and re-prices it.
    #[tracing::instrument(skip(self), fields(buyer_id = %actor.user_id))]
    pub async fn update_quantity(
        &self,
        actor: &Actor,
        item_id: CartItemId,
        quantity: u32,
    ) -> Result<CartItem> {
        require_role(actor, Role::Buyer, "edit a cart")?;

        let mut uow = self.store.begin().await?;
        let item = load_item(uow.as_mut(), actor, item_id).await?;

        let unit_price = if item.is_bulk_order() {
            item.check_quantity(quantity)?;
            item.unit_price
        } else {
            let product = uow
                .get_product(item.product_id)
                .await?
                .ok_or_else(|| SagaError::not_found("product", item.product_id))?;
            if !product.check_order_quantity(quantity)? {
                return Err(SagaError::conflict(format!(
                    "only {} units of {} available",
                    product.available, product.title
                )));
            }
            let variant = product.find_variant(&item.selection)?;
            product.unit_price_for(quantity, variant)?
        };
        // Bid lines have no ceiling, so the total is checked before the store
        // computes it.
        unit_price.checked_multiply(quantity)?;

        let updated = uow
            .set_item_quantity(actor.user_id, item_id, quantity, unit_price)
            .await?
            .ok_or_else(|| SagaError::not_found("cart item", item_id))?;
        uow.commit().await?;
        Ok(updated)
    }

    pub async fn remove_item(&self, actor: &Actor, item_id: CartItemId) -> Result<CartItem> {
        require_role(actor, Role::Buyer, "edit a cart")?;
        let mut uow = self.store.begin().await?;
        let removed = uow
            .remove_item(actor.user_id, item_id)
            .await?
            .ok_or_else(|| SagaError::not_found("cart item", item_id))?;
        uow.commit().await?;
        Ok(removed)
    }
}

async fn load_item(
    uow: &mut dyn UnitOfWork,
    actor: &Actor,
    item_id: CartItemId,
) -> Result<CartItem> {
    uow.get_cart(actor.user_id)
        .await?
        .and_then(|cart| cart.item(item_id).cloned())
        .ok_or_else(|| SagaError::not_found("cart item", item_id))
}
