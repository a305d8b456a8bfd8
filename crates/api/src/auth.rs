//! Caller identity extraction.
//!
//! Authentication happens upstream. The gateway forwards the verified caller
//! in the `x-user-id`, `x-user-role` and `x-user-email` headers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use common::UserId;
use domain::{Actor, Role};

use crate::error::ApiError;

pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_ROLE_HEADER: &str = "x-user-role";
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// The authenticated caller of a request.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub Actor);

impl<S: Send + Sync> FromRequestParts<S> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let user_id = header(USER_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("missing x-user-id header".to_string()))?;
        let user_id = UserId::parse(user_id)
            .map_err(|_| ApiError::Unauthorized("x-user-id is not a valid id".to_string()))?;
        let role: Role = header(USER_ROLE_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("missing x-user-role header".to_string()))?
            .parse()
            .map_err(ApiError::Unauthorized)?;
        let email = header(USER_EMAIL_HEADER).unwrap_or_default();

        Ok(CurrentUser(Actor::new(user_id, role, email)))
    }
}
