use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use crate::auth::{Credentials, Identity};
use crate::response::ApiError;
use crate::state::AppState;

/// Any authenticated caller.
#[derive(Clone, Copy, Debug)]
pub struct Caller(pub Identity);

/// An authenticated caller with the admin role.
#[derive(Clone, Copy, Debug)]
pub struct AdminCaller(pub Identity);

#[async_trait]
impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok());
        let credentials = Credentials::from_header(header);
        let identity = state.auth.authenticate(&credentials).await?;
        Ok(Self(identity))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for AdminCaller {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let Caller(identity) = Caller::from_request_parts(parts, state).await?;
        if !identity.is_admin() {
            return Err(ApiError::admins_only());
        }
        Ok(Self(identity))
    }
}
