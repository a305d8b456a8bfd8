//! Sourcing request endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::RequestId;
use domain::NewRequest;
use saga::RequestView;
use store::MarketStore;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;

/// POST /requests: a buyer posts a sourcing request.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    payload: Result<Json<NewRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RequestView>), ApiError> {
    let Json(input) = payload?;
    let view = state.market.requests.create_request(&actor, input).await?;
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /requests
#[tracing::instrument(skip(state))]
pub async fn list<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
) -> Result<Json<Vec<RequestView>>, ApiError> {
    Ok(Json(state.market.requests.list_requests(&actor).await?))
}

/// GET /requests/{id}
#[tracing::instrument(skip(state))]
pub async fn get<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<RequestId>,
) -> Result<Json<RequestView>, ApiError> {
    Ok(Json(state.market.requests.get_request(&actor, id).await?))
}

/// POST /requests/{id}/close
#[tracing::instrument(skip(state))]
pub async fn close<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    Path(id): Path<RequestId>,
) -> Result<Json<RequestView>, ApiError> {
    Ok(Json(state.market.requests.close_request(&actor, id).await?))
}
