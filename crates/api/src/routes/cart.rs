//! Cart endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::CartItemId;
use domain::CartItem;
use saga::{AddToCart, CartView};
use serde::Deserialize;
use store::MarketStore;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct QuantityRequest {
    pub quantity: u32,
}

/// GET /cart
#[tracing::instrument(skip(state))]
pub async fn get<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<CartView>, ApiError> {
    Ok(Json(state.market.cart.get_cart(&actor).await?))
}

/// POST /cart/items: add or merge a product line.
#[tracing::instrument(skip(state, payload))]
pub async fn add_item<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    payload: Result<Json<AddToCart>, JsonRejection>,
) -> Result<(StatusCode, Json<CartItem>), ApiError> {
    let Json(input) = payload?;
    let item = state.market.cart.add_item(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// PATCH /cart/items/{id}
#[tracing::instrument(skip(state, payload))]
pub async fn update_item<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<CartItemId>,
    payload: Result<Json<QuantityRequest>, JsonRejection>,
) -> Result<Json<CartItem>, ApiError> {
    let Json(body) = payload?;
    let item = state
        .market
        .cart
        .update_quantity(&actor, id, body.quantity)
        .await?;
    Ok(Json(item))
}

/// DELETE /cart/items/{id}
#[tracing::instrument(skip(state))]
pub async fn remove_item<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<CartItemId>,
) -> Result<Json<CartItem>, ApiError> {
    Ok(Json(state.market.cart.remove_item(&actor, id).await?))
}
