//! Billing routes
//!
//! Dashboard reads, checkout/portal session creation, and the webhook
//! intake the reconciler consumes.

use axum::extract::{Extension, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use storefront_billing::{
    BillingOverview, CheckoutResponse, Plan, PortalResponse, UsageSummary,
};
use storefront_shared::PlanCode;

use crate::auth::AuthTenant;
use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

pub async fn get_overview(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthTenant>,
) -> ApiResult<Json<BillingOverview>> {
    let overview = state
        .billing
        .entitlements
        .billing_overview(auth.tenant_id)
        .await?;
    Ok(Json(overview))
}

pub async fn get_usage(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthTenant>,
) -> ApiResult<Json<UsageSummary>> {
    let summary = state
        .billing
        .entitlements
        .usage_summary(auth.tenant_id)
        .await?;
    Ok(Json(summary))
}

pub async fn list_plans(State(state): State<AppState>) -> ApiResult<Json<Vec<Plan>>> {
    let plans = state.billing.plans.list_plans().await?;
    Ok(Json(plans))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub plan_code: PlanCode,
    /// Billing email, supplied by the auth collaborator.
    pub email: Option<String>,
    pub name: Option<String>,
}

pub async fn create_checkout(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthTenant>,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<Json<CheckoutResponse>> {
    let customer_id = state
        .billing
        .customer
        .ensure_customer(auth.tenant_id, req.email.as_deref(), req.name.as_deref())
        .await?;

    let session = state
        .billing
        .checkout
        .create_session(auth.tenant_id, req.plan_code, &customer_id)
        .await?;

    Ok(Json(session))
}

pub async fn create_portal(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthTenant>,
) -> ApiResult<Json<PortalResponse>> {
    let subscription = state
        .billing
        .subscriptions
        .get_or_create(auth.tenant_id)
        .await?;

    let customer_id = subscription
        .stripe_customer_id
        .ok_or(storefront_billing::BillingError::NoCustomer)?;

    let session = state.billing.portal.create_session(&customer_id).await?;
    Ok(Json(session))
}

/// Webhook intake. Signature failures are 400s; processing failures are
/// 5xx so the provider redelivers; matched-nothing events are accepted and
/// dropped inside the reconciler.
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<Value>> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::BadRequest("Missing signature".to_string()))?;

    let event = state.billing.webhooks.verify_event(&body, signature)?;
    state.billing.webhooks.handle_event(event).await?;

    Ok(Json(json!({ "received": true })))
}
