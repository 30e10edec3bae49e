//! Shared types and database plumbing for Storefront.
//!
//! Everything here is consumed by both the billing core and the API server:
//! the closed plan/status enumerations, pool construction, and the slug
//! normalization used by catalog and product creation.

pub mod db;
pub mod slug;
pub mod types;

pub use db::{create_pool, run_migrations};
pub use types::{PlanCode, ResourceKind, SubscriptionStatus, PLAN_CODES};
