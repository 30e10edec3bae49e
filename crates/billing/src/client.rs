//! Stripe client configuration
//!
//! Holds the API credentials and the price-id/plan mapping. The mapping is
//! the single place upgrade/downgrade price wiring lives; the reconciler
//! uses its inverse to re-derive a plan code from webhook payloads.

use storefront_shared::PlanCode;

use crate::error::{BillingError, BillingResult};

/// Stripe price ids per paid plan. The free starter plan has no price.
#[derive(Debug, Clone, Default)]
pub struct PriceIds {
    pub growth: Option<String>,
    pub pro: Option<String>,
}

/// Stripe configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub webhook_secret: String,
    /// Base URL checkout/portal sessions return to.
    pub app_url: String,
    pub price_ids: PriceIds,
}

impl StripeConfig {
    pub fn from_env() -> BillingResult<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| BillingError::Config("STRIPE_SECRET_KEY not set".to_string()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .map_err(|_| BillingError::Config("STRIPE_WEBHOOK_SECRET not set".to_string()))?;
        let app_url =
            std::env::var("APP_URL").unwrap_or_else(|_| "http://localhost:3000".to_string());

        Ok(Self {
            secret_key,
            webhook_secret,
            app_url,
            price_ids: PriceIds {
                growth: std::env::var("STRIPE_PRICE_GROWTH").ok(),
                pro: std::env::var("STRIPE_PRICE_PRO").ok(),
            },
        })
    }

    /// Price id for a plan, if the plan is purchasable.
    pub fn price_id_for_plan(&self, plan: PlanCode) -> Option<&str> {
        match plan {
            PlanCode::Starter => None,
            PlanCode::Growth => self.price_ids.growth.as_deref(),
            PlanCode::Pro => self.price_ids.pro.as_deref(),
        }
    }

    /// Inverse of [`Self::price_id_for_plan`].
    pub fn plan_for_price_id(&self, price_id: &str) -> Option<PlanCode> {
        if self.price_ids.growth.as_deref() == Some(price_id) {
            Some(PlanCode::Growth)
        } else if self.price_ids.pro.as_deref() == Some(price_id) {
            Some(PlanCode::Pro)
        } else {
            None
        }
    }
}

/// Thin wrapper pairing the Stripe SDK client with its configuration.
#[derive(Clone)]
pub struct StripeClient {
    client: stripe::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let client = stripe::Client::new(config.secret_key.clone());
        Self { client, config }
    }

    pub fn from_env() -> BillingResult<Self> {
        Ok(Self::new(StripeConfig::from_env()?))
    }

    pub fn inner(&self) -> &stripe::Client {
        &self.client
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> StripeConfig {
        StripeConfig {
            secret_key: "sk_test_123".to_string(),
            webhook_secret: "whsec_test".to_string(),
            app_url: "http://localhost:3000".to_string(),
            price_ids: PriceIds {
                growth: Some("price_growth".to_string()),
                pro: Some("price_pro".to_string()),
            },
        }
    }

    #[test]
    fn price_map_round_trips_for_paid_plans() {
        let config = config();
        assert_eq!(config.price_id_for_plan(PlanCode::Growth), Some("price_growth"));
        assert_eq!(config.plan_for_price_id("price_pro"), Some(PlanCode::Pro));
        assert_eq!(config.plan_for_price_id("price_unknown"), None);
    }

    #[test]
    fn starter_has_no_price() {
        assert_eq!(config().price_id_for_plan(PlanCode::Starter), None);
    }
}
