//! Plan catalog
//!
//! Static registry mapping a plan code to its resource ceilings and feature
//! flags. Seeded once at process startup; existing rows are never
//! overwritten, so operators may hand-tune live limits without the seed
//! routine clobbering them.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;

use storefront_shared::{PlanCode, PLAN_CODES};

use crate::error::{BillingError, BillingResult};
use crate::store::BillingStore;

/// A subscription plan and its resource ceilings.
///
/// `max_products` / `max_catalogs`: `None` means no ceiling. Zero is a
/// meaningful "plan forbids this resource entirely" and is never treated as
/// unlimited.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Plan {
    pub code: PlanCode,
    pub name: String,
    pub monthly_price_mxn: i32,
    pub max_products: Option<i32>,
    pub max_catalogs: Option<i32>,
    pub branding_visible: bool,
    pub analytics_level: i16,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl Plan {
    /// Starter: 20 products, 2 catalogs, visible branding, basic analytics.
    pub fn starter() -> Self {
        Self {
            code: PlanCode::Starter,
            name: "Starter".to_string(),
            monthly_price_mxn: 0,
            max_products: Some(20),
            max_catalogs: Some(2),
            branding_visible: true,
            analytics_level: 1,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Growth: 200 products, 10 catalogs, visible branding, level-2 analytics.
    pub fn growth() -> Self {
        Self {
            code: PlanCode::Growth,
            name: "Growth".to_string(),
            monthly_price_mxn: 149,
            max_products: Some(200),
            max_catalogs: Some(10),
            branding_visible: true,
            analytics_level: 2,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Pro: unlimited products and catalogs, white-label, full analytics.
    pub fn pro() -> Self {
        Self {
            code: PlanCode::Pro,
            name: "Pro".to_string(),
            monthly_price_mxn: 299,
            max_products: None,
            max_catalogs: None,
            branding_visible: false,
            analytics_level: 3,
            created_at: OffsetDateTime::now_utc(),
        }
    }

    /// Seed definition for a plan code.
    pub fn seed_default(code: PlanCode) -> Self {
        match code {
            PlanCode::Starter => Self::starter(),
            PlanCode::Growth => Self::growth(),
            PlanCode::Pro => Self::pro(),
        }
    }
}

/// Read side of the plan registry plus the idempotent seed routine.
pub struct PlanCatalog {
    store: Arc<dyn BillingStore>,
}

impl PlanCatalog {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    /// Look up a plan by code. A miss is a data-integrity problem (stale
    /// subscription reference or broken seed), surfaced distinctly so
    /// operators can see it rather than silently defaulting.
    pub async fn get_plan(&self, code: PlanCode) -> BillingResult<Plan> {
        self.store
            .get_plan(code)
            .await?
            .ok_or_else(|| BillingError::PlanNotFound(code.as_str().to_string()))
    }

    /// All plans in canonical rank order (upgrade direction), not
    /// alphabetical.
    pub async fn list_plans(&self) -> BillingResult<Vec<Plan>> {
        let mut plans = self.store.list_plans().await?;
        plans.sort_by_key(|p| p.code.rank());
        Ok(plans)
    }

    /// Insert the default definition for every canonical plan code not
    /// already present. Never touches existing rows; calling this any
    /// number of times leaves already-present plans unchanged.
    pub async fn ensure_seeded(&self) -> BillingResult<()> {
        for code in PLAN_CODES {
            let inserted = self
                .store
                .insert_plan_if_absent(&Plan::seed_default(code))
                .await?;
            if inserted {
                tracing::info!(plan = %code, "Seeded plan definition");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starter_limits_match_seed_defaults() {
        let plan = Plan::starter();
        assert_eq!(plan.max_products, Some(20));
        assert_eq!(plan.max_catalogs, Some(2));
        assert!(plan.branding_visible);
        assert_eq!(plan.monthly_price_mxn, 0);
    }

    #[test]
    fn pro_has_no_ceilings_and_hides_branding() {
        let plan = Plan::pro();
        assert_eq!(plan.max_products, None);
        assert_eq!(plan.max_catalogs, None);
        assert!(!plan.branding_visible);
        assert_eq!(plan.analytics_level, 3);
    }

    #[test]
    fn seed_default_covers_every_code() {
        for code in PLAN_CODES {
            assert_eq!(Plan::seed_default(code).code, code);
        }
    }
}
