//! Route wiring

pub mod billing;
pub mod catalogs;
pub mod products;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::require_auth;
use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/billing/overview", get(billing::get_overview))
        .route("/api/billing/usage", get(billing::get_usage))
        .route("/api/billing/checkout", post(billing::create_checkout))
        .route("/api/billing/portal", post(billing::create_portal))
        .route("/api/products", post(products::create_product))
        .route("/api/products/import", post(products::import_products))
        .route("/api/catalogs", post(catalogs::create_catalog))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth));

    Router::new()
        .route("/health", get(health))
        .route("/api/billing/plans", get(billing::list_plans))
        .route("/api/stripe/webhook", post(billing::stripe_webhook))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}
