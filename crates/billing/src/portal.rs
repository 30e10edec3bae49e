//! Billing portal sessions

use serde::Serialize;
use stripe::{BillingPortalSession, CreateBillingPortalSession, CustomerId};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

#[derive(Debug, Clone, Serialize)]
pub struct PortalResponse {
    pub url: String,
}

pub struct PortalService {
    stripe: StripeClient,
}

impl PortalService {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    /// Create a billing portal session for an existing Stripe customer.
    /// Upgrades, cancellations and payment-method changes all happen in the
    /// provider's portal; this system only learns about them through the
    /// reconciler.
    pub async fn create_session(&self, customer_id: &str) -> BillingResult<PortalResponse> {
        let customer_id = customer_id
            .parse::<CustomerId>()
            .map_err(|e| BillingError::StripeApi(format!("Invalid customer ID: {}", e)))?;

        let return_url = format!("{}/billing", self.stripe.config().app_url);

        let mut params = CreateBillingPortalSession::new(customer_id);
        params.return_url = Some(&return_url);

        let session = BillingPortalSession::create(self.stripe.inner(), params).await?;

        Ok(PortalResponse { url: session.url })
    }
}
