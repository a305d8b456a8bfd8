//! Order materializer.
//!
//! Turns a direct order or the buyer's cart into one order per supplier.
//! Regular lines are re-priced against the product's current tier table;
//! bid lines keep the accepted bid price. Stock is taken with a conditional
//! decrement inside the same unit of work as the order insert, so a shortfall
//! on any line fails every order of the call.
//!
//! Every product a call touches is locked up front in ascending id order.

use std::collections::HashMap;

use chrono::Utc;
use common::{CartItemId, ProductId, UserId};
use domain::{
    Actor, BidStatus, Cart, CartItem, LineOrigin, Order, OrderLine, Product, Role, VariantSelection,
};
use serde::{Deserialize, Serialize};
use store::{MarketStore, UnitOfWork};

use crate::error::{Result, SagaError};
use crate::services::directory::{party_for_actor, party_for_user};
use crate::services::numbering::assign_order_number;
use crate::services::require_role;

/// One product line of a direct order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemInput {
    pub product_id: ProductId,
    pub quantity: u32,
    #[serde(default)]
    pub selection: VariantSelection,
}

/// Direct order placement, bypassing the cart.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrder {
    pub items: Vec<OrderItemInput>,
    #[serde(default)]
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Checkout of the cart, or of the listed cart lines only.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkout {
    #[serde(default)]
    pub item_ids: Option<Vec<CartItemId>>,
    #[serde(default)]
    pub shipping_address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A priced line waiting to be grouped under its supplier.
struct PricedLine {
    supplier_id: UserId,
    supplier_name: Option<String>,
    line: OrderLine,
}

#[derive(Clone)]
pub struct OrderMaterializer<S> {
    store: S,
}

impl<S: MarketStore + Clone> OrderMaterializer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Places orders for explicit product lines.
    #[tracing::instrument(skip(self, input), fields(buyer_id = %actor.user_id, lines = input.items.len()))]
    pub async fn place_order(&self, actor: &Actor, input: PlaceOrder) -> Result<Vec<Order>> {
        require_role(actor, Role::Buyer, "place orders")?;
        if input.items.is_empty() {
            return Err(SagaError::Validation("an order needs at least one item".to_string()));
        }
        if input.items.iter().any(|item| item.quantity == 0) {
            return Err(SagaError::Validation("quantity must be greater than 0".to_string()));
        }

        let mut uow = self.store.begin().await?;
        let ids = lock_order(input.items.iter().map(|item| item.product_id));
        let products = lock_products(uow.as_mut(), &ids).await?;
        let mut priced = Vec::with_capacity(input.items.len());
        for item in &input.items {
            let product = locked(&products, item.product_id)?;
            priced.push(price_regular(product, item.quantity, &item.selection, None)?);
        }

        let orders = materialize(uow.as_mut(), actor, priced, input.shipping_address, input.notes).await?;
        uow.commit().await?;

        record_orders(&orders);
        Ok(orders)
    }

    /// Checks out the cart. Ordered lines leave the cart in the same unit
    /// of work.
    #[tracing::instrument(skip(self, input), fields(buyer_id = %actor.user_id))]
    pub async fn checkout(&self, actor: &Actor, input: Checkout) -> Result<Vec<Order>> {
        require_role(actor, Role::Buyer, "check out")?;

        let mut uow = self.store.begin().await?;
        let cart = uow
            .get_cart(actor.user_id)
            .await?
            .unwrap_or_else(|| Cart::empty(actor.user_id, Utc::now()));
        let lines: Vec<CartItem> = match &input.item_ids {
            Some(ids) => ids
                .iter()
                .map(|id| {
                    cart.item(*id)
                        .cloned()
                        .ok_or_else(|| SagaError::not_found("cart item", id))
                })
                .collect::<Result<_>>()?,
            None => cart.items.clone(),
        };
        if lines.is_empty() {
            return Err(SagaError::Validation("cart is empty".to_string()));
        }

        let ids = lock_order(lines.iter().map(|item| item.product_id));
        let products = lock_products(uow.as_mut(), &ids).await?;
        let mut priced = Vec::with_capacity(lines.len());
        for item in &lines {
            let product = locked(&products, item.product_id)?;
            let line = match &item.origin {
                LineOrigin::Regular => {
                    price_regular(product, item.quantity, &item.selection, Some(item.id))?
                }
                LineOrigin::Bid { bid_id, .. } => {
                    let bid = uow
                        .get_bid(*bid_id)
                        .await?
                        .ok_or_else(|| SagaError::not_found("bid", bid_id))?;
                    if bid.status != BidStatus::Accepted {
                        return Err(SagaError::conflict(format!(
                            "bid {} is {}, not accepted",
                            bid.id, bid.status
                        )));
                    }
                    PricedLine {
                        supplier_id: bid.supplier_id,
                        supplier_name: Some(bid.supplier_name.clone()),
                        line: OrderLine {
                            product_id: item.product_id,
                            product_title: item.product_title.clone(),
                            image: item.image.clone(),
                            selection: item.selection.clone(),
                            quantity: item.quantity,
                            unit_price: bid.bid_price,
                            total_price: bid.bid_price.checked_multiply(item.quantity)?,
                            bid_id: Some(bid.id),
                            request_id: Some(bid.request_id),
                            cart_item_id: Some(item.id),
                        },
                    }
                }
            };
            priced.push(line);
        }

        let orders = materialize(uow.as_mut(), actor, priced, input.shipping_address, input.notes).await?;
        for item in &lines {
            uow.remove_item(actor.user_id, item.id).await?;
        }
        uow.commit().await?;

        record_orders(&orders);
        Ok(orders)
    }
}

/// Distinct product ids in the order they must be locked.
fn lock_order(ids: impl IntoIterator<Item = ProductId>) -> Vec<ProductId> {
    let mut ids: Vec<ProductId> = ids.into_iter().collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

/// Locks `ids` one by one in slice order.
async fn lock_products(
    uow: &mut dyn UnitOfWork,
    ids: &[ProductId],
) -> Result<HashMap<ProductId, Product>> {
    let mut products = HashMap::with_capacity(ids.len());
    for &id in ids {
        let product = uow
            .lock_product(id)
            .await?
            .ok_or_else(|| SagaError::not_found("product", id))?;
        products.insert(id, product);
    }
    Ok(products)
}

fn locked(products: &HashMap<ProductId, Product>, id: ProductId) -> Result<&Product> {
    products
        .get(&id)
        .ok_or_else(|| SagaError::not_found("product", id))
}

/// Prices a catalog line at the current tier for its quantity.
fn price_regular(
    product: &Product,
    quantity: u32,
    selection: &VariantSelection,
    cart_item_id: Option<CartItemId>,
) -> Result<PricedLine> {
    let variant = product.find_variant(selection)?;
    if !product.check_order_quantity(quantity)? {
        return Err(SagaError::conflict(format!(
            "only {} units of {} available",
            product.available, product.title
        )));
    }
    let (unit_price, total_price) = product.line_price(quantity, variant)?;
    let selection = match variant {
        Some(v) => selection.normalized_for(v),
        None => selection.clone(),
    };
    Ok(PricedLine {
        supplier_id: product.supplier_id,
        supplier_name: None,
        line: OrderLine {
            product_id: product.id,
            product_title: product.title.clone(),
            image: product.primary_image().map(str::to_string),
            selection,
            quantity,
            unit_price,
            total_price,
            bid_id: None,
            request_id: None,
            cart_item_id,
        },
    })
}

/// Groups lines per supplier, writes the orders and takes the stock.
async fn materialize(
    uow: &mut dyn UnitOfWork,
    actor: &Actor,
    priced: Vec<PricedLine>,
    shipping_address: Option<String>,
    notes: Option<String>,
) -> Result<Vec<Order>> {
    let mut groups: Vec<(UserId, Option<String>, Vec<OrderLine>)> = Vec::new();
    for PricedLine {
        supplier_id,
        supplier_name,
        line,
    } in priced
    {
        match groups.iter_mut().find(|(id, _, _)| *id == supplier_id) {
            Some((_, name, lines)) => {
                if name.is_none() {
                    *name = supplier_name;
                }
                lines.push(line);
            }
            None => groups.push((supplier_id, supplier_name, vec![line])),
        }
    }

    let buyer = party_for_actor(uow, actor).await?;
    let now = Utc::now();
    let mut orders = Vec::with_capacity(groups.len());
    for (supplier_id, supplier_name, lines) in groups {
        let fallback = supplier_name.unwrap_or_else(|| supplier_id.to_string());
        let supplier = party_for_user(uow, supplier_id, &fallback).await?;
        let mut order = Order::place(
            buyer.clone(),
            supplier,
            lines,
            shipping_address.clone(),
            notes.clone(),
            now,
        )?;
        assign_order_number(uow, &mut order).await?;
        uow.insert_order(&order).await?;

        for line in &order.products {
            if !uow.decrement_availability(line.product_id, line.quantity).await? {
                return Err(SagaError::conflict(format!(
                    "insufficient stock for {}",
                    line.product_title
                )));
            }
            uow.increment_sold(line.product_id, line.quantity).await?;
        }
        orders.push(order);
    }
    Ok(orders)
}

fn record_orders(orders: &[Order]) {
    metrics::counter!("orders_created_total").increment(orders.len() as u64);
    for order in orders {
        tracing::info!(
            order_id = %order.id,
            number = %order.order_number,
            total = %order.total_amount,
            "order placed"
        );
    }
}
