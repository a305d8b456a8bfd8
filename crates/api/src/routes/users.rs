//! Caller profile endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use domain::UserProfile;
use saga::ProfileInput;
use store::MarketStore;

use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiError;

/// PUT /users/me: create or replace the caller's profile.
#[tracing::instrument(skip(state, payload))]
pub async fn upsert_me<S: MarketStore + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    CurrentUser(actor): CurrentUser,
    payload: Result<Json<ProfileInput>, JsonRejection>,
) -> Result<Json<UserProfile>, ApiError> {
    let Json(input) = payload?;
    let profile = state.market.directory.upsert_profile(&actor, input).await?;
    Ok(Json(profile))
}
