//! Storefront API Server
//!
//! HTTP surface for the plan-entitlement subsystem: billing overview and
//! usage endpoints, Stripe checkout/portal/webhook intake, and the
//! entitlement-guarded product and catalog creation paths.

mod auth;
mod config;
mod error;
mod routes;
mod state;

use std::net::SocketAddr;

use storefront_billing::BillingService;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::{config::Config, state::AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,storefront_api=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Storefront API v{}", env!("CARGO_PKG_VERSION"));

    let config = Config::from_env()?;
    tracing::info!("Configuration loaded");

    tracing::info!("Connecting to database...");
    let pool = storefront_shared::create_pool(&config.database_url).await?;
    tracing::info!("Database connection established");

    storefront_shared::run_migrations(&pool).await?;

    let billing = BillingService::from_env(pool.clone())?;

    // Plans are seeded once at startup; existing rows are never overwritten.
    billing.plans.ensure_seeded().await?;

    let port = config.port;
    let state = AppState::new(pool, config, billing);
    let app = routes::create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
