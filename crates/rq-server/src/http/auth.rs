//! Shared-token request authentication.
//!
//! The HTTP surface accepts `Authorization: Bearer <AUTH_TOKEN>` and
//! attributes activity to the configured operator user. Multi-user
//! identity management sits outside this service.

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use super::error::ApiError;
use crate::state::AppState;

/// The authenticated principal's user id.
pub struct AuthUser(pub String);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .ok_or(ApiError(rq_core::Error::Unauthorized))?;

        if token != state.auth_token {
            return Err(ApiError(rq_core::Error::Unauthorized));
        }

        Ok(AuthUser(state.auth_user.clone()))
    }
}
