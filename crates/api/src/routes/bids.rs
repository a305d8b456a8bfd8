//! Bid endpoints, including acceptance.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{BidId, RequestId, UserId};
use domain::{Bid, BidStatus, NewBid};
use saga::AcceptanceReceipt;
use serde::Deserialize;
use store::{BidFilter, MarketStore};

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidListParams {
    pub request_id: Option<RequestId>,
    pub supplier_id: Option<UserId>,
    pub status: Option<BidStatus>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl From<BidListParams> for BidFilter {
    fn from(params: BidListParams) -> Self {
        BidFilter {
            request_id: params.request_id,
            supplier_id: params.supplier_id,
            status: params.status,
            limit: params.limit,
            offset: params.offset,
            ..BidFilter::default()
        }
    }
}

/// POST /bids: a supplier bids on an open request.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    payload: Result<Json<NewBid>, JsonRejection>,
) -> Result<(StatusCode, Json<Bid>), ApiError> {
    let Json(input) = payload?;
    let bid = state.market.bids.create_bid(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(bid)))
}

/// GET /bids?requestId=..&status=..
#[tracing::instrument(skip(state))]
pub async fn list<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    Query(params): Query<BidListParams>,
) -> Result<Json<Vec<Bid>>, ApiError> {
    Ok(Json(state.market.bids.list_bids(&actor, params.into()).await?))
}

/// GET /bids/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<BidId>,
) -> Result<Json<Bid>, ApiError> {
    Ok(Json(state.market.bids.get_bid(&actor, id).await?))
}

/// POST /bids/{id}/accept: runs the acceptance saga.
#[tracing::instrument(skip(state))]
pub async fn accept<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<BidId>,
) -> Result<Json<AcceptanceReceipt>, ApiError> {
    Ok(Json(state.market.acceptance.accept(&actor, id).await?))
}

/// POST /bids/{id}/reject
#[tracing::instrument(skip(state))]
pub async fn reject<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<BidId>,
) -> Result<Json<Bid>, ApiError> {
    Ok(Json(state.market.bids.reject_bid(&actor, id).await?))
}

/// POST /bids/{id}/withdraw
#[tracing::instrument(skip(state))]
pub async fn withdraw<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<BidId>,
) -> Result<Json<Bid>, ApiError> {
    Ok(Json(state.market.bids.withdraw_bid(&actor, id).await?))
}
