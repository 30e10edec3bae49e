//! Entitlement resolution and enforcement
//!
//! Answers two questions for a tenant: "what are your ceilings right now?"
//! and "may you create one more of this resource?". State is read fresh on
//! every call — no module-level caching — so plan changes and subscription
//! transitions take effect immediately.
//!
//! The check-then-insert sequence is not transactionally atomic with the
//! caller's insert; two concurrent creates can both pass at ceiling-1. That
//! narrow overshoot is an accepted soft-limit property of billing
//! enforcement, not a correctness bug, and is kept in preference to
//! cross-request locking.

use std::sync::Arc;

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use storefront_shared::{PlanCode, ResourceKind};

use crate::error::{BillingError, BillingResult};
use crate::plans::{Plan, PlanCatalog};
use crate::store::{BillingStore, ResourceStore};
use crate::subscriptions::{Subscription, SubscriptionService};
use crate::usage::{UsageCounter, UsageCounts};

/// Resolved ceilings for a tenant. `None` passes through from the plan and
/// means no ceiling.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct PlanLimits {
    pub plan_code: PlanCode,
    pub max_products: Option<i32>,
    pub max_catalogs: Option<i32>,
}

/// Outcome of an entitlement check. Hitting a ceiling is a normal decision,
/// not an error.
#[derive(Debug, Clone, PartialEq)]
pub enum LimitDecision {
    Allowed,
    Denied { reason: String },
}

impl LimitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, LimitDecision::Allowed)
    }
}

/// Plan/usage/trial snapshot for the billing dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct BillingOverview {
    pub subscription: Subscription,
    pub plan: Plan,
    pub usage: UsageCounts,
    pub trial_days_left: i64,
}

/// Compact usage view for limit banners.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary {
    pub plan_code: PlanCode,
    pub plan_name: String,
    pub max_products: Option<i32>,
    pub max_catalogs: Option<i32>,
    pub products_used: i64,
    pub catalogs_used: i64,
}

/// Decide whether one more resource of `kind` fits under the plan's ceiling
/// given current usage.
///
/// Only an absent ceiling means unlimited. A zero (or negative) ceiling
/// denies: zero is a deliberate "plan forbids this resource" signal and must
/// not be conflated with "no limit".
pub fn evaluate_ceiling(plan: &Plan, kind: ResourceKind, used: i64) -> LimitDecision {
    let ceiling = match kind {
        ResourceKind::Products => plan.max_products,
        ResourceKind::Catalogs => plan.max_catalogs,
    };

    match ceiling {
        None => LimitDecision::Allowed,
        Some(max) if used >= i64::from(max.max(0)) => LimitDecision::Denied {
            reason: limit_reached_message(plan, kind),
        },
        Some(_) => LimitDecision::Allowed,
    }
}

/// Human-facing denial naming the current plan, the resource kind, and the
/// next plan up in canonical rank.
fn limit_reached_message(plan: &Plan, kind: ResourceKind) -> String {
    match plan.code.next() {
        Some(next) => format!(
            "{} plan: you've reached your {} limit. Upgrade to {} to keep growing.",
            plan.name,
            kind.label(),
            next.display_name()
        ),
        None => format!(
            "{} plan: you've reached your {} limit.",
            plan.name,
            kind.label()
        ),
    }
}

/// Resolves a tenant's ceilings and enforces them at creation checkpoints.
pub struct EntitlementService {
    store: Arc<dyn BillingStore>,
    resources: Arc<dyn ResourceStore>,
}

impl EntitlementService {
    pub fn new(store: Arc<dyn BillingStore>, resources: Arc<dyn ResourceStore>) -> Self {
        Self { store, resources }
    }

    fn subscriptions(&self) -> SubscriptionService {
        SubscriptionService::new(self.store.clone())
    }

    fn catalog(&self) -> PlanCatalog {
        PlanCatalog::new(self.store.clone())
    }

    fn usage(&self) -> UsageCounter {
        UsageCounter::new(self.resources.clone())
    }

    /// Resolve the tenant's current ceilings, lazily creating the trial
    /// subscription on first access. A subscription pointing at a plan the
    /// catalog doesn't know fails with `PlanNotFound` rather than silently
    /// defaulting.
    pub async fn resolve_limits(&self, tenant_id: Uuid) -> BillingResult<PlanLimits> {
        let subscription = self.subscriptions().get_or_create(tenant_id).await?;
        let plan = self.catalog().get_plan(subscription.plan_code).await?;

        Ok(PlanLimits {
            plan_code: plan.code,
            max_products: plan.max_products,
            max_catalogs: plan.max_catalogs,
        })
    }

    /// The enforcement checkpoint called before committing a create.
    ///
    /// Fails closed: a missing subscription is a denial, never an implicit
    /// pass. `PlanNotFound` propagates as an error so operators can spot
    /// seed/data corruption (the HTTP layer still refuses the create).
    pub async fn check_allowed(
        &self,
        store_id: Uuid,
        tenant_id: Uuid,
        kind: ResourceKind,
    ) -> BillingResult<LimitDecision> {
        let subscription = match self.subscriptions().get_or_create(tenant_id).await {
            Ok(sub) => sub,
            Err(BillingError::NoSubscription(_)) => {
                tracing::warn!(tenant_id = %tenant_id, "Entitlement check without subscription");
                return Ok(LimitDecision::Denied {
                    reason: "We couldn't find your subscription.".to_string(),
                });
            }
            Err(e) => return Err(e),
        };

        let plan = self.catalog().get_plan(subscription.plan_code).await?;

        let ceiling = match kind {
            ResourceKind::Products => plan.max_products,
            ResourceKind::Catalogs => plan.max_catalogs,
        };
        if ceiling.is_none() {
            return Ok(LimitDecision::Allowed);
        }

        let used = self.usage().count(store_id, kind).await?;
        let decision = evaluate_ceiling(&plan, kind, used);

        if let LimitDecision::Denied { reason } = &decision {
            tracing::info!(
                tenant_id = %tenant_id,
                store_id = %store_id,
                plan = %plan.code,
                kind = kind.label(),
                used = used,
                reason = %reason,
                "Plan ceiling reached"
            );
        }

        Ok(decision)
    }

    /// Plan + usage snapshot for limit banners.
    pub async fn usage_summary(&self, tenant_id: Uuid) -> BillingResult<UsageSummary> {
        let subscription = self.subscriptions().get_or_create(tenant_id).await?;
        let plan = self.catalog().get_plan(subscription.plan_code).await?;
        let usage = self.usage().counts_for_tenant(tenant_id).await?;

        Ok(UsageSummary {
            plan_code: plan.code,
            plan_name: plan.name.clone(),
            max_products: plan.max_products,
            max_catalogs: plan.max_catalogs,
            products_used: usage.products,
            catalogs_used: usage.catalogs,
        })
    }

    /// Full billing dashboard payload: subscription, plan, usage, trial.
    pub async fn billing_overview(&self, tenant_id: Uuid) -> BillingResult<BillingOverview> {
        let subscription = self.subscriptions().get_or_create(tenant_id).await?;
        let plan = self.catalog().get_plan(subscription.plan_code).await?;
        let usage = self.usage().counts_for_tenant(tenant_id).await?;
        let trial_days_left = subscription.trial_days_left(OffsetDateTime::now_utc());

        Ok(BillingOverview {
            subscription,
            plan,
            usage,
            trial_days_left,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_ceiling_denies_one_under_allows() {
        let plan = Plan::starter();

        assert!(evaluate_ceiling(&plan, ResourceKind::Products, 19).is_allowed());
        assert!(!evaluate_ceiling(&plan, ResourceKind::Products, 20).is_allowed());
        assert!(!evaluate_ceiling(&plan, ResourceKind::Products, 25).is_allowed());
    }

    #[test]
    fn absent_ceiling_is_unlimited() {
        let plan = Plan::pro();

        assert!(evaluate_ceiling(&plan, ResourceKind::Products, 0).is_allowed());
        assert!(evaluate_ceiling(&plan, ResourceKind::Products, 1_000_000).is_allowed());
        assert!(evaluate_ceiling(&plan, ResourceKind::Catalogs, 1_000_000).is_allowed());
    }

    #[test]
    fn zero_ceiling_is_a_hard_deny_not_unlimited() {
        let mut plan = Plan::starter();
        plan.max_products = Some(0);

        assert!(!evaluate_ceiling(&plan, ResourceKind::Products, 0).is_allowed());
    }

    #[test]
    fn denial_names_plan_and_upgrade_target() {
        let plan = Plan::starter();
        let decision = evaluate_ceiling(&plan, ResourceKind::Products, 20);

        match decision {
            LimitDecision::Denied { reason } => {
                assert!(reason.contains("Starter"));
                assert!(reason.contains("product"));
                assert!(reason.contains("Growth"));
            }
            LimitDecision::Allowed => panic!("expected denial at ceiling"),
        }
    }

    #[test]
    fn top_plan_denial_has_no_upgrade_target() {
        let mut plan = Plan::pro();
        plan.max_catalogs = Some(1);
        let decision = evaluate_ceiling(&plan, ResourceKind::Catalogs, 1);

        match decision {
            LimitDecision::Denied { reason } => {
                assert!(reason.contains("Pro"));
                assert!(!reason.contains("Upgrade"));
            }
            LimitDecision::Allowed => panic!("expected denial at ceiling"),
        }
    }
}
