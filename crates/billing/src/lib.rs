// Billing crate clippy configuration
// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Storefront Billing Module
//!
//! Plan entitlements for the multi-tenant storefront: resolves a tenant's
//! subscription into resource ceilings and enforces them at every creation
//! checkpoint.
//!
//! ## Features
//!
//! - **Plan Catalog**: seeded registry of plan ceilings and feature flags
//! - **Subscriptions**: lazy per-tenant records with a 30-day trial
//! - **Entitlement Guard**: allow/deny checks before products and catalogs
//!   are created, including per-row re-checks during bulk import
//! - **Reconciliation**: converges local state onto Stripe webhook events
//! - **Checkout/Portal**: outbound Stripe surface for upgrades and billing
//!   management

pub mod checkout;
pub mod client;
pub mod customer;
pub mod entitlement;
pub mod error;
pub mod import;
pub mod plans;
pub mod portal;
pub mod store;
pub mod subscriptions;
pub mod usage;
pub mod webhooks;

#[cfg(test)]
mod edge_case_tests;

// Checkout
pub use checkout::{CheckoutResponse, CheckoutService};

// Client
pub use client::{PriceIds, StripeClient, StripeConfig};

// Customer
pub use customer::CustomerService;

// Entitlement
pub use entitlement::{
    evaluate_ceiling, BillingOverview, EntitlementService, LimitDecision, PlanLimits,
    UsageSummary,
};

// Error
pub use error::{BillingError, BillingResult};

// Import
pub use import::{BulkImporter, ImportReport, ImportRow, RowFailure};

// Plans
pub use plans::{Plan, PlanCatalog};

// Portal
pub use portal::{PortalResponse, PortalService};

// Store
pub use store::{
    BillingStore, MemoryBillingStore, MemoryResourceStore, NewCatalog, NewProduct,
    PgBillingStore, PgResourceStore, ResourceStore, SubscriptionInsert,
};

// Subscriptions
pub use subscriptions::{
    trial_days_left, Subscription, SubscriptionService, DEFAULT_TRIAL_PLAN, FREE_PLAN,
    TRIAL_DAYS,
};

// Usage
pub use usage::{UsageCounter, UsageCounts};

// Webhooks
pub use webhooks::{WebhookEvent, WebhookHandler};

use std::sync::Arc;

use sqlx::PgPool;

/// Main billing service that combines all billing functionality
pub struct BillingService {
    pub plans: PlanCatalog,
    pub subscriptions: SubscriptionService,
    pub entitlements: EntitlementService,
    pub usage: UsageCounter,
    pub customer: CustomerService,
    pub checkout: CheckoutService,
    pub portal: PortalService,
    pub webhooks: WebhookHandler,
    pub import: BulkImporter,
    /// Direct access to the store-owned collections for the CRUD routes.
    pub resources: Arc<dyn ResourceStore>,
}

impl BillingService {
    /// Create a billing service from environment variables.
    pub fn from_env(pool: PgPool) -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?, pool))
    }

    /// Create a billing service with explicit config over Postgres stores.
    pub fn new(config: StripeConfig, pool: PgPool) -> Self {
        let store: Arc<dyn BillingStore> = Arc::new(PgBillingStore::new(pool.clone()));
        let resources: Arc<dyn ResourceStore> = Arc::new(PgResourceStore::new(pool));
        Self::with_stores(config, store, resources)
    }

    /// Wire the services over any store implementations.
    pub fn with_stores(
        config: StripeConfig,
        store: Arc<dyn BillingStore>,
        resources: Arc<dyn ResourceStore>,
    ) -> Self {
        let stripe = StripeClient::new(config.clone());

        Self {
            plans: PlanCatalog::new(store.clone()),
            subscriptions: SubscriptionService::new(store.clone()),
            entitlements: EntitlementService::new(store.clone(), resources.clone()),
            usage: UsageCounter::new(resources.clone()),
            customer: CustomerService::new(stripe.clone(), store.clone()),
            checkout: CheckoutService::new(stripe.clone()),
            portal: PortalService::new(stripe),
            webhooks: WebhookHandler::new(store.clone(), config),
            import: BulkImporter::new(store, resources.clone()),
            resources,
        }
    }
}
