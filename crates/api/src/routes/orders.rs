//! Order placement, checkout and lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::OrderId;
use domain::{Order, OrderStatus, PaymentStatus};
use saga::{Checkout, PlaceOrder};
use serde::Deserialize;
use store::MarketStore;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct OrderListParams {
    pub status: Option<OrderStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub payment_status: PaymentStatus,
}

// -- Handlers --

/// POST /orders: order products directly, one order per supplier.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    payload: Result<Json<PlaceOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<Order>>), ApiError> {
    let Json(input) = payload?;
    let orders = state.market.materializer.place_order(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(orders)))
}

/// POST /orders/checkout: turn the cart into orders.
#[tracing::instrument(skip(state, payload))]
pub async fn checkout<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    payload: Result<Json<Checkout>, JsonRejection>,
) -> Result<(StatusCode, Json<Vec<Order>>), ApiError> {
    let Json(input) = payload?;
    let orders = state.market.materializer.checkout(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(orders)))
}

/// GET /orders?status=..
#[tracing::instrument(skip(state))]
pub async fn list<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    Query(params): Query<OrderListParams>,
) -> Result<Json<Vec<Order>>, ApiError> {
    Ok(Json(state.market.orders.list_orders(&actor, params.status).await?))
}

/// GET /orders/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<OrderId>,
) -> Result<Json<Order>, ApiError> {
    Ok(Json(state.market.orders.get_order(&actor, id).await?))
}

/// POST /orders/{id}/status
#[tracing::instrument(skip(state, payload))]
pub async fn update_status<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<OrderId>,
    payload: Result<Json<StatusRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let Json(body) = payload?;
    let order = state
        .market
        .orders
        .update_status(&actor, id, body.status)
        .await?;
    Ok(Json(order))
}

/// POST /orders/{id}/payment
#[tracing::instrument(skip(state, payload))]
pub async fn update_payment<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<OrderId>,
    payload: Result<Json<PaymentRequest>, JsonRejection>,
) -> Result<Json<Order>, ApiError> {
    let Json(body) = payload?;
    let order = state
        .market
        .orders
        .update_payment(&actor, id, body.payment_status)
        .await?;
    Ok(Json(order))
}
