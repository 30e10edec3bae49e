//! Usage counting
//!
//! Counts committed resources owned by a tenant's store at call time. There
//! is deliberately no caching layer here: a stale count either denies a
//! create that should pass or lets usage overrun the ceiling.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use storefront_shared::ResourceKind;

use crate::error::BillingResult;
use crate::store::ResourceStore;

/// Current product and catalog counts for a store. Derived, never persisted.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct UsageCounts {
    pub products: i64,
    pub catalogs: i64,
}

pub struct UsageCounter {
    resources: Arc<dyn ResourceStore>,
}

impl UsageCounter {
    pub fn new(resources: Arc<dyn ResourceStore>) -> Self {
        Self { resources }
    }

    /// Committed count of `kind` in a store.
    pub async fn count(&self, store_id: Uuid, kind: ResourceKind) -> BillingResult<i64> {
        self.resources.count(store_id, kind).await
    }

    /// Both counts for a tenant. A tenant with no store yet has zero usage.
    pub async fn counts_for_tenant(&self, tenant_id: Uuid) -> BillingResult<UsageCounts> {
        let Some(store_id) = self.resources.store_for_tenant(tenant_id).await? else {
            return Ok(UsageCounts::default());
        };

        Ok(UsageCounts {
            products: self.resources.count(store_id, ResourceKind::Products).await?,
            catalogs: self.resources.count(store_id, ResourceKind::Catalogs).await?,
        })
    }
}
