//! Product routes
//!
//! Creation paths run through the entitlement guard before anything is
//! inserted; the bulk import re-checks between rows.

use axum::extract::{Extension, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use storefront_billing::{ImportReport, ImportRow, LimitDecision, NewProduct};
use storefront_shared::slug::generate_slug;
use storefront_shared::ResourceKind;

use crate::auth::AuthTenant;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateProductRequest {
    pub name: String,
    pub slug: Option<String>,
    pub description: Option<String>,
    pub price_text: Option<String>,
    pub stock: Option<i32>,
    pub catalog_id: Option<Uuid>,
    pub sort_order: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct CreatedResponse {
    pub id: Uuid,
    pub slug: String,
}

pub async fn create_product(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthTenant>,
    Json(req): Json<CreateProductRequest>,
) -> ApiResult<Json<CreatedResponse>> {
    let billing = &state.billing;
    let store_id = billing
        .resources
        .store_for_tenant(auth.tenant_id)
        .await?
        .ok_or(storefront_billing::BillingError::NoStore(auth.tenant_id))?;

    // Guard before the insert; hitting the ceiling is a refusal, not a bug.
    if let LimitDecision::Denied { reason } = billing
        .entitlements
        .check_allowed(store_id, auth.tenant_id, ResourceKind::Products)
        .await?
    {
        return Err(ApiError::Forbidden(reason));
    }

    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Product name is required".to_string()));
    }

    let slug = req
        .slug
        .as_deref()
        .map(generate_slug)
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| generate_slug(&name));
    if slug.is_empty() {
        return Err(ApiError::BadRequest(
            "Could not derive a slug for this product".to_string(),
        ));
    }

    let product = NewProduct {
        name,
        slug: slug.clone(),
        description: req
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty()),
        price_text: req
            .price_text
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty()),
        stock: req.stock.unwrap_or(0).max(0),
        catalog_id: req.catalog_id,
        sort_order: req.sort_order.unwrap_or(0),
    };

    let id = billing.resources.insert_product(store_id, &product).await?;

    tracing::info!(
        tenant_id = %auth.tenant_id,
        store_id = %store_id,
        product_id = %id,
        "Created product"
    );

    Ok(Json(CreatedResponse { id, slug }))
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub rows: Vec<ImportRow>,
}

pub async fn import_products(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthTenant>,
    Json(req): Json<ImportRequest>,
) -> ApiResult<Json<ImportReport>> {
    let billing = &state.billing;
    let store_id = billing
        .resources
        .store_for_tenant(auth.tenant_id)
        .await?
        .ok_or(storefront_billing::BillingError::NoStore(auth.tenant_id))?;

    let report = billing
        .import
        .import_products(store_id, auth.tenant_id, req.rows)
        .await?;

    Ok(Json(report))
}
