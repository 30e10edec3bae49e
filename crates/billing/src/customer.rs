//! Stripe customer management
//!
//! The subscription row is the system of record for the external customer
//! reference: created at most once per tenant, then reused by checkout, the
//! billing portal, and webhook matching.

use std::collections::HashMap;
use std::sync::Arc;

use stripe::{CreateCustomer, Customer};
use uuid::Uuid;

use crate::client::StripeClient;
use crate::error::BillingResult;
use crate::store::BillingStore;
use crate::subscriptions::SubscriptionService;

pub struct CustomerService {
    stripe: StripeClient,
    store: Arc<dyn BillingStore>,
}

impl CustomerService {
    pub fn new(stripe: StripeClient, store: Arc<dyn BillingStore>) -> Self {
        Self { stripe, store }
    }

    /// Return the tenant's Stripe customer id, creating the customer on
    /// first use and persisting the reference on the subscription.
    pub async fn ensure_customer(
        &self,
        tenant_id: Uuid,
        email: Option<&str>,
        name: Option<&str>,
    ) -> BillingResult<String> {
        let subscriptions = SubscriptionService::new(self.store.clone());
        let mut sub = subscriptions.get_or_create(tenant_id).await?;

        if let Some(existing) = &sub.stripe_customer_id {
            return Ok(existing.clone());
        }

        let mut metadata = HashMap::new();
        metadata.insert("tenant_id".to_string(), tenant_id.to_string());

        let mut params = CreateCustomer::new();
        params.email = email;
        params.name = name;
        params.metadata = Some(metadata);

        let customer = Customer::create(self.stripe.inner(), params).await?;

        sub.stripe_customer_id = Some(customer.id.to_string());
        self.store.update_subscription(&sub).await?;

        tracing::info!(
            tenant_id = %tenant_id,
            customer_id = %customer.id,
            "Created Stripe customer"
        );

        Ok(customer.id.to_string())
    }
}
