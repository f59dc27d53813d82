//! Bearer-token authentication for every agent route

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
};
use std::sync::Arc;
use tracing::warn;

use crate::AppState;

/// Taking this as a handler argument rejects the request with 401 unless it
/// carries `Authorization: Bearer <AGENT_API_KEY>`.
pub struct ApiKeyAuth;

impl FromRequestParts<Arc<AppState>> for ApiKeyAuth {
    type Rejection = StatusCode;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.strip_prefix("Bearer "));

        match token {
            Some(token) if token == state.api_key => Ok(ApiKeyAuth),
            Some(_) => {
                warn!("Rejected request to {} with a wrong API key", parts.uri.path());
                Err(StatusCode::UNAUTHORIZED)
            }
            None => Err(StatusCode::UNAUTHORIZED),
        }
    }
}
