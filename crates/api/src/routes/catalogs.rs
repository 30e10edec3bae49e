//! Catalog routes

use axum::extract::{Extension, State};
use axum::Json;
use serde::Deserialize;

use storefront_billing::{LimitDecision, NewCatalog};
use storefront_shared::slug::generate_slug;
use storefront_shared::ResourceKind;

use crate::auth::AuthTenant;
use crate::error::{ApiError, ApiResult};
use crate::routes::products::CreatedResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCatalogRequest {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
}

pub async fn create_catalog(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthTenant>,
    Json(req): Json<CreateCatalogRequest>,
) -> ApiResult<Json<CreatedResponse>> {
    let billing = &state.billing;
    let store_id = billing
        .resources
        .store_for_tenant(auth.tenant_id)
        .await?
        .ok_or(storefront_billing::BillingError::NoStore(auth.tenant_id))?;

    if let LimitDecision::Denied { reason } = billing
        .entitlements
        .check_allowed(store_id, auth.tenant_id, ResourceKind::Catalogs)
        .await?
    {
        return Err(ApiError::Forbidden(reason));
    }

    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Catalog name is required".to_string()));
    }

    let slug = req
        .slug
        .as_deref()
        .map(generate_slug)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| generate_slug(&name));
    if slug.is_empty() {
        return Err(ApiError::BadRequest(
            "Could not derive a slug for this catalog".to_string(),
        ));
    }

    let catalog = NewCatalog {
        name,
        slug: slug.clone(),
        description: req
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
    };

    let id = billing.resources.insert_catalog(store_id, &catalog).await?;

    tracing::info!(
        tenant_id = %auth.tenant_id,
        store_id = %store_id,
        catalog_id = %id,
        "Created catalog"
    );

    Ok(Json(CreatedResponse { id, slug }))
}
