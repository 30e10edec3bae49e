//! Subscription records and trial arithmetic
//!
//! One subscription per tenant, created lazily on first access with a
//! 30-day trial of the top plan. Lifecycle status only ever changes through
//! the billing event reconciler; there is no in-process job expiring trials,
//! so an expired trial keeps reading as `trialing` until a reconciliation
//! event flips it.

use std::sync::Arc;

use serde::Serialize;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use storefront_shared::{PlanCode, SubscriptionStatus};

use crate::error::{BillingError, BillingResult};
use crate::store::{BillingStore, SubscriptionInsert};

/// Fixed trial length granted on first access.
pub const TRIAL_DAYS: i64 = 30;

/// Plan granted for the trial window.
pub const DEFAULT_TRIAL_PLAN: PlanCode = PlanCode::Pro;

/// Plan a tenant lands on when their paid subscription is deleted upstream.
pub const FREE_PLAN: PlanCode = PlanCode::Starter;

/// Per-tenant subscription state.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct Subscription {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub plan_code: PlanCode,
    pub status: SubscriptionStatus,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub trial_ends_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_starts_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub current_period_ends_at: Option<OffsetDateTime>,
    pub stripe_customer_id: Option<String>,
    pub stripe_subscription_id: Option<String>,
    pub stripe_price_id: Option<String>,
    pub cancel_at_period_end: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub canceled_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl Subscription {
    /// Fresh trial subscription for a tenant's first access.
    pub fn trial(tenant_id: Uuid, now: OffsetDateTime) -> Self {
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            plan_code: DEFAULT_TRIAL_PLAN,
            status: SubscriptionStatus::Trialing,
            trial_started_at: Some(now),
            trial_ends_at: Some(now + Duration::days(TRIAL_DAYS)),
            current_period_starts_at: None,
            current_period_ends_at: None,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            stripe_price_id: None,
            cancel_at_period_end: false,
            canceled_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whole trial days remaining at `now`. See [`trial_days_left`].
    pub fn trial_days_left(&self, now: OffsetDateTime) -> i64 {
        trial_days_left(self.trial_ends_at, now)
    }
}

/// Whole days of trial remaining: zero the instant the trial end is reached
/// (or when there is no trial window), otherwise the ceiling of the
/// remaining time in days. Computed, never stored.
pub fn trial_days_left(trial_ends_at: Option<OffsetDateTime>, now: OffsetDateTime) -> i64 {
    let Some(ends_at) = trial_ends_at else {
        return 0;
    };
    let remaining = (ends_at - now).whole_seconds();
    if remaining <= 0 {
        0
    } else {
        (remaining + 86_399) / 86_400
    }
}

/// Lazy, race-safe access to the per-tenant subscription row.
pub struct SubscriptionService {
    store: Arc<dyn BillingStore>,
}

impl SubscriptionService {
    pub fn new(store: Arc<dyn BillingStore>) -> Self {
        Self { store }
    }

    pub async fn get(&self, tenant_id: Uuid) -> BillingResult<Option<Subscription>> {
        self.store.subscription_for_tenant(tenant_id).await
    }

    /// Fetch the tenant's subscription, creating the default trial record if
    /// none exists. Concurrent first access is resolved by the unique
    /// constraint on `tenant_id`: a duplicate-key insert means someone else
    /// created it, and we re-read instead of erroring.
    pub async fn get_or_create(&self, tenant_id: Uuid) -> BillingResult<Subscription> {
        if let Some(existing) = self.store.subscription_for_tenant(tenant_id).await? {
            return Ok(existing);
        }

        let fresh = Subscription::trial(tenant_id, OffsetDateTime::now_utc());
        match self.store.insert_subscription(&fresh).await? {
            SubscriptionInsert::Inserted => {
                tracing::info!(
                    tenant_id = %tenant_id,
                    plan = %fresh.plan_code,
                    "Created trial subscription on first access"
                );
                Ok(fresh)
            }
            SubscriptionInsert::TenantExists => self
                .store
                .subscription_for_tenant(tenant_id)
                .await?
                .ok_or(BillingError::NoSubscription(tenant_id)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn trial_days_left_is_zero_at_expiry() {
        let now = datetime!(2025-06-01 12:00 UTC);
        assert_eq!(trial_days_left(Some(now), now), 0);
        assert_eq!(trial_days_left(Some(now - Duration::days(5)), now), 0);
        assert_eq!(trial_days_left(None, now), 0);
    }

    #[test]
    fn trial_days_left_rounds_partial_days_up() {
        let now = datetime!(2025-06-01 12:00 UTC);
        assert_eq!(trial_days_left(Some(now + Duration::seconds(1)), now), 1);
        assert_eq!(trial_days_left(Some(now + Duration::hours(25)), now), 2);
        assert_eq!(trial_days_left(Some(now + Duration::days(30)), now), 30);
    }

    #[test]
    fn trial_days_left_decreases_by_whole_days() {
        let start = datetime!(2025-06-01 00:00 UTC);
        let ends = Some(start + Duration::days(30));

        let mut previous = trial_days_left(ends, start);
        for day in 1..=30 {
            let current = trial_days_left(ends, start + Duration::days(day));
            assert!(current < previous, "day {} should strictly decrease", day);
            previous = current;
        }
        assert_eq!(previous, 0);
    }

    #[test]
    fn fresh_trial_uses_default_plan_and_window() {
        let now = datetime!(2025-06-01 12:00 UTC);
        let sub = Subscription::trial(Uuid::new_v4(), now);

        assert_eq!(sub.plan_code, DEFAULT_TRIAL_PLAN);
        assert_eq!(sub.status, SubscriptionStatus::Trialing);
        assert_eq!(sub.trial_started_at, Some(now));
        assert_eq!(sub.trial_ends_at, Some(now + Duration::days(30)));
        assert_eq!(sub.trial_days_left(now), 30);
        assert!(sub.stripe_customer_id.is_none());
    }
}
