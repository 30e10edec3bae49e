//! Billing error taxonomy.
//!
//! A single `thiserror` enum covering every failure the billing crate can
//! surface, plus the `BillingResult<T>` alias used throughout. Variants and
//! their payloads are those constructed across the crate and mapped onto HTTP
//! statuses in `crates/api/src/error.rs`.

use storefront_shared::PlanCode;
use thiserror::Error;
use uuid::Uuid;

/// Convenience alias for fallible billing operations.
pub type BillingResult<T> = Result<T, BillingError>;

/// Errors produced by the billing crate.
#[derive(Debug, Error)]
pub enum BillingError {
    /// Underlying database failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// No subscription exists for the tenant; the operation is denied.
    #[error("no subscription for tenant {0}")]
    NoSubscription(Uuid),

    /// The referenced plan code is not in the seeded catalog.
    #[error("plan not found: {0}")]
    PlanNotFound(String),

    /// The tenant has no store provisioned yet.
    #[error("no store for tenant {0}")]
    NoStore(Uuid),

    /// No Stripe customer is attached to the subscription.
    #[error("no stripe customer for tenant")]
    NoCustomer,

    /// No Stripe price is configured for the requested plan.
    #[error("no price configured for plan {0}")]
    NoPriceForPlan(PlanCode),

    /// A call into the Stripe API failed.
    #[error("stripe api error: {0}")]
    StripeApi(String),

    /// A webhook signature failed verification.
    #[error("webhook signature invalid")]
    WebhookSignatureInvalid,

    /// A webhook or request payload could not be parsed.
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// A required configuration value is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A requested resource was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A slug collides with an existing resource.
    #[error("duplicate slug: {0}")]
    DuplicateSlug(String),
}

impl From<stripe::StripeError> for BillingError {
    fn from(e: stripe::StripeError) -> Self {
        BillingError::StripeApi(e.to_string())
    }
}
