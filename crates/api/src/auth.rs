//! Tenant identity extraction
//!
//! Authentication itself lives in an external identity provider; this layer
//! only validates the bearer token it issued and exposes the current tenant
//! id to handlers.

use axum::extract::{Request, State};
use axum::http::header;
use axum::middleware::Next;
use axum::response::Response;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// The authenticated tenant, inserted as a request extension.
#[derive(Debug, Clone, Copy)]
pub struct AuthTenant {
    pub tenant_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct Claims {
    sub: String,
    #[allow(dead_code)]
    exp: usize,
}

/// Require a valid bearer token and make the tenant id available to the
/// handler.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|_| ApiError::Unauthorized)?;

    let tenant_id = Uuid::parse_str(&data.claims.sub).map_err(|_| ApiError::Unauthorized)?;

    request.extensions_mut().insert(AuthTenant { tenant_id });
    Ok(next.run(request).await)
}
