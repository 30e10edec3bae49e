//! Billing event reconciliation
//!
//! Consumes asynchronous lifecycle notifications from the billing provider
//! and converges the local subscription record onto them. Handlers are pure
//! `(current state, event) -> new state` functions applied by a thin I/O
//! wrapper; re-applying the same event reaches the same end state, which is
//! what makes at-least-once, out-of-order delivery safe. The reconciler
//! never originates a subscription: events with no matching record are
//! logged and dropped (the provider owns retry semantics).

use std::sync::Arc;

use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;
use time::OffsetDateTime;
use uuid::Uuid;

use storefront_shared::{PlanCode, SubscriptionStatus};

use crate::client::StripeConfig;
use crate::error::{BillingError, BillingResult};
use crate::store::BillingStore;
use crate::subscriptions::{Subscription, FREE_PLAN};

type HmacSha256 = Hmac<Sha256>;

/// Signature timestamps older than this are rejected.
const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// A verified webhook event envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: Value,
}

/// Fields the reconciler reads off a `customer.subscription.*` payload.
#[derive(Debug, Clone)]
pub struct SubscriptionUpdate {
    pub subscription_ref: String,
    pub customer_ref: String,
    pub status: String,
    pub price_ref: Option<String>,
    pub period_start: Option<OffsetDateTime>,
    pub period_end: Option<OffsetDateTime>,
    pub cancel_at_period_end: bool,
    pub canceled_at: Option<OffsetDateTime>,
}

/// Map the provider's status vocabulary onto the four local statuses.
/// Anything unrecognized folds to `canceled` — the safe, fail-closed default.
pub fn map_provider_status(status: &str) -> SubscriptionStatus {
    match status {
        "active" => SubscriptionStatus::Active,
        "trialing" => SubscriptionStatus::Trialing,
        "past_due" => SubscriptionStatus::PastDue,
        _ => SubscriptionStatus::Canceled,
    }
}

/// Attach the external customer (and subscription, if present) references.
pub fn apply_checkout_completed(
    sub: &mut Subscription,
    customer_ref: &str,
    subscription_ref: Option<&str>,
) {
    sub.stripe_customer_id = Some(customer_ref.to_string());
    if let Some(subscription_ref) = subscription_ref {
        sub.stripe_subscription_id = Some(subscription_ref.to_string());
    }
}

/// Overwrite the subscription from a provider update. The plan is re-derived
/// from the price reference; when the price maps to no known plan the
/// previously stored plan code is kept rather than nulled out.
pub fn apply_subscription_update(
    sub: &mut Subscription,
    update: &SubscriptionUpdate,
    plan: Option<PlanCode>,
) {
    if let Some(plan) = plan {
        sub.plan_code = plan;
    }
    sub.status = map_provider_status(&update.status);
    sub.stripe_subscription_id = Some(update.subscription_ref.clone());
    sub.stripe_price_id = update.price_ref.clone();
    sub.current_period_starts_at = update.period_start;
    sub.current_period_ends_at = update.period_end;
    sub.cancel_at_period_end = update.cancel_at_period_end;
    sub.canceled_at = update.canceled_at;
}

/// Reset to the free plan after the provider deletes a paid subscription.
/// Deliberately `active`, not `canceled`: a deleted paid subscription leaves
/// the tenant on a functioning free tier, not in a blocked state.
pub fn apply_subscription_deleted(sub: &mut Subscription, now: OffsetDateTime) {
    sub.plan_code = FREE_PLAN;
    sub.status = SubscriptionStatus::Active;
    sub.stripe_subscription_id = None;
    sub.stripe_price_id = None;
    sub.cancel_at_period_end = false;
    sub.current_period_starts_at = None;
    sub.current_period_ends_at = None;
    sub.canceled_at = Some(now);
}

/// Webhook verification and event application.
pub struct WebhookHandler {
    store: Arc<dyn BillingStore>,
    config: StripeConfig,
}

impl WebhookHandler {
    pub fn new(store: Arc<dyn BillingStore>, config: StripeConfig) -> Self {
        Self { store, config }
    }

    /// Verify the `Stripe-Signature` header against the raw payload and
    /// parse the event envelope.
    pub fn verify_event(&self, payload: &str, signature: &str) -> BillingResult<WebhookEvent> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.verify_event_at(payload, signature, now)
    }

    /// Signature verification with an explicit clock, the testable core of
    /// [`Self::verify_event`]. Header format: `t=<epoch>,v1=<hex hmac>`.
    pub fn verify_event_at(
        &self,
        payload: &str,
        signature: &str,
        now_epoch: i64,
    ) -> BillingResult<WebhookEvent> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<&str> = None;

        for part in signature.split(',') {
            match part.split_once('=') {
                Some(("t", value)) => timestamp = value.parse().ok(),
                Some(("v1", value)) => v1_signature = Some(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or_else(|| {
            tracing::error!("Missing timestamp in signature header");
            BillingError::WebhookSignatureInvalid
        })?;
        let v1_signature = v1_signature.ok_or_else(|| {
            tracing::error!("Missing v1 signature in signature header");
            BillingError::WebhookSignatureInvalid
        })?;

        if (now_epoch - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
            tracing::error!(
                timestamp = timestamp,
                now = now_epoch,
                "Webhook timestamp outside tolerance"
            );
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let secret = self.config.webhook_secret.as_str();
        let secret_key = secret.strip_prefix("whsec_").unwrap_or(secret);
        let signed_payload = format!("{}.{}", timestamp, payload);

        let mut mac = HmacSha256::new_from_slice(secret_key.as_bytes())
            .map_err(|_| BillingError::WebhookSignatureInvalid)?;
        mac.update(signed_payload.as_bytes());
        let computed = hex::encode(mac.finalize().into_bytes());

        if computed != v1_signature {
            tracing::error!("Webhook signature mismatch");
            return Err(BillingError::WebhookSignatureInvalid);
        }

        let event: WebhookEvent = serde_json::from_str(payload).map_err(|e| {
            tracing::error!(parse_error = %e, "Failed to parse webhook event JSON");
            BillingError::InvalidPayload(e.to_string())
        })?;

        Ok(event)
    }

    /// Apply a verified event. Unrecognized kinds are accepted and ignored;
    /// events with no matching subscription are logged and dropped. Errors
    /// returned here mean processing genuinely failed and the provider
    /// should redeliver.
    pub async fn handle_event(&self, event: WebhookEvent) -> BillingResult<()> {
        match event.event_type.as_str() {
            "checkout.session.completed" => self.handle_checkout_completed(&event).await,
            "customer.subscription.created" | "customer.subscription.updated" => {
                self.handle_subscription_updated(&event).await
            }
            "customer.subscription.deleted" => self.handle_subscription_deleted(&event).await,
            _ => {
                tracing::info!(
                    event_type = %event.event_type,
                    event_id = %event.id,
                    "Ignoring unhandled billing event type"
                );
                Ok(())
            }
        }
    }

    async fn handle_checkout_completed(&self, event: &WebhookEvent) -> BillingResult<()> {
        let session = &event.data.object;

        let Some(customer_ref) = session.get("customer").and_then(ref_id) else {
            tracing::info!(event_id = %event.id, "Checkout session without customer, ignoring");
            return Ok(());
        };
        let subscription_ref = session.get("subscription").and_then(ref_id);

        let tenant_id = session
            .get("metadata")
            .and_then(|m| m.get("tenant_id"))
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok());

        // Prefer the tenant carried in checkout metadata; fall back to a
        // previously stored customer reference.
        let existing = match tenant_id {
            Some(tenant_id) => self.store.subscription_for_tenant(tenant_id).await?,
            None => self.store.subscription_for_customer(customer_ref).await?,
        };

        let Some(mut sub) = existing else {
            tracing::warn!(
                event_id = %event.id,
                customer = customer_ref,
                "Dropping checkout event with no matching subscription"
            );
            return Ok(());
        };

        apply_checkout_completed(&mut sub, customer_ref, subscription_ref);
        self.store.update_subscription(&sub).await?;

        tracing::info!(
            tenant_id = %sub.tenant_id,
            customer = customer_ref,
            "Attached billing customer from checkout"
        );
        Ok(())
    }

    async fn handle_subscription_updated(&self, event: &WebhookEvent) -> BillingResult<()> {
        let update = parse_subscription_payload(&event.data.object)?;

        let Some(mut sub) = self
            .store
            .subscription_for_customer(&update.customer_ref)
            .await?
        else {
            // This reconciler never originates a subscription.
            tracing::warn!(
                event_id = %event.id,
                customer = %update.customer_ref,
                "Dropping subscription update with no matching subscription"
            );
            return Ok(());
        };

        let plan = update
            .price_ref
            .as_deref()
            .and_then(|price| self.config.plan_for_price_id(price));
        if plan.is_none() {
            tracing::warn!(
                event_id = %event.id,
                price = ?update.price_ref,
                plan = %sub.plan_code,
                "Price maps to no known plan, keeping stored plan code"
            );
        }

        apply_subscription_update(&mut sub, &update, plan);
        self.store.update_subscription(&sub).await?;

        tracing::info!(
            tenant_id = %sub.tenant_id,
            plan = %sub.plan_code,
            status = %sub.status,
            "Reconciled subscription update"
        );
        Ok(())
    }

    async fn handle_subscription_deleted(&self, event: &WebhookEvent) -> BillingResult<()> {
        let Some(customer_ref) = event.data.object.get("customer").and_then(ref_id) else {
            tracing::info!(event_id = %event.id, "Deletion event without customer, ignoring");
            return Ok(());
        };

        let Some(mut sub) = self.store.subscription_for_customer(customer_ref).await? else {
            tracing::warn!(
                event_id = %event.id,
                customer = customer_ref,
                "Dropping subscription deletion with no matching subscription"
            );
            return Ok(());
        };

        apply_subscription_deleted(&mut sub, OffsetDateTime::now_utc());
        self.store.update_subscription(&sub).await?;

        tracing::info!(
            tenant_id = %sub.tenant_id,
            "Paid subscription deleted upstream, reset to free plan"
        );
        Ok(())
    }
}

/// External references arrive either as a bare id string or an expanded
/// object carrying one.
fn ref_id(value: &Value) -> Option<&str> {
    value
        .as_str()
        .or_else(|| value.get("id").and_then(Value::as_str))
}

fn epoch_field(object: &Value, key: &str) -> Option<OffsetDateTime> {
    object
        .get(key)
        .and_then(Value::as_i64)
        .and_then(|secs| OffsetDateTime::from_unix_timestamp(secs).ok())
}

/// Pull the reconciler's fields off a `customer.subscription.*` payload.
pub fn parse_subscription_payload(object: &Value) -> BillingResult<SubscriptionUpdate> {
    let subscription_ref = object
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| BillingError::InvalidPayload("missing subscription id".to_string()))?
        .to_string();

    let customer_ref = object
        .get("customer")
        .and_then(ref_id)
        .ok_or_else(|| BillingError::InvalidPayload("missing customer reference".to_string()))?
        .to_string();

    let status = object
        .get("status")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let price_ref = object
        .get("items")
        .and_then(|items| items.get("data"))
        .and_then(Value::as_array)
        .and_then(|data| data.first())
        .and_then(|item| item.get("price"))
        .and_then(|price| price.get("id"))
        .and_then(Value::as_str)
        .map(String::from);

    Ok(SubscriptionUpdate {
        subscription_ref,
        customer_ref,
        status,
        price_ref,
        period_start: epoch_field(object, "current_period_start"),
        period_end: epoch_field(object, "current_period_end"),
        cancel_at_period_end: object
            .get("cancel_at_period_end")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        canceled_at: epoch_field(object, "canceled_at"),
    })
}
