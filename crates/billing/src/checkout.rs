//! Checkout session creation

use std::collections::HashMap;

use serde::Serialize;
use stripe::{
    CheckoutSession, CheckoutSessionMode, CreateCheckoutSession, CreateCheckoutSessionLineItems,
    CustomerId,
};
use uuid::Uuid;

use storefront_shared::PlanCode;

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

pub struct CheckoutService {
    stripe: StripeClient,
}

impl CheckoutService {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    /// Create a subscription checkout session for a paid plan. The tenant id
    /// rides along in session metadata so the reconciler can attach the
    /// resulting customer even before any reference is stored locally.
    pub async fn create_session(
        &self,
        tenant_id: Uuid,
        plan: PlanCode,
        customer_id: &str,
    ) -> BillingResult<CheckoutResponse> {
        let price_id = self
            .stripe
            .config()
            .price_id_for_plan(plan)
            .ok_or(BillingError::NoPriceForPlan(plan))?
            .to_string();

        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let success_url = format!("{}/billing?checkout=success", self.stripe.config().app_url);
        let cancel_url = format!("{}/billing?checkout=cancelled", self.stripe.config().app_url);

        let mut metadata = HashMap::new();
        metadata.insert("tenant_id".to_string(), tenant_id.to_string());

        let mut params = CreateCheckoutSession::new();
        params.customer = Some(customer_id);
        params.mode = Some(CheckoutSessionMode::Subscription);
        params.success_url = Some(&success_url);
        params.cancel_url = Some(&cancel_url);
        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            price: Some(price_id),
            quantity: Some(1),
            ..Default::default()
        }]);
        params.metadata = Some(metadata);

        let session = CheckoutSession::create(self.stripe.inner(), params).await?;

        let url = session
            .url
            .ok_or_else(|| BillingError::StripeApi("Checkout session URL missing".to_string()))?;

        tracing::info!(
            tenant_id = %tenant_id,
            plan = %plan,
            session_id = %session.id,
            "Created checkout session"
        );

        Ok(CheckoutResponse { url })
    }
}
