//! Storage access for billing state and store-owned resources.
//!
//! Services receive these traits by injection instead of touching a global
//! pool, so every read reflects committed state and tests can run against
//! the in-memory implementations. The Postgres implementations are the
//! production path.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::RwLock;
use uuid::Uuid;

use storefront_shared::{PlanCode, ResourceKind};

use crate::error::{BillingError, BillingResult};
use crate::plans::Plan;
use crate::subscriptions::Subscription;

/// Outcome of inserting a subscription under the per-tenant uniqueness
/// constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionInsert {
    Inserted,
    /// Another request created the tenant's subscription first; callers
    /// recover by re-reading.
    TenantExists,
}

/// Fields for a product about to be created.
#[derive(Debug, Clone)]
pub struct NewProduct {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub price_text: Option<String>,
    pub stock: i32,
    pub catalog_id: Option<Uuid>,
    pub sort_order: i32,
}

/// Fields for a catalog about to be created.
#[derive(Debug, Clone)]
pub struct NewCatalog {
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
}

/// Durable billing state: the plan registry and per-tenant subscriptions.
#[async_trait]
pub trait BillingStore: Send + Sync {
    async fn get_plan(&self, code: PlanCode) -> BillingResult<Option<Plan>>;

    async fn list_plans(&self) -> BillingResult<Vec<Plan>>;

    /// Insert a plan only if no row for its code exists. Returns whether a
    /// row was inserted; existing rows are never modified.
    async fn insert_plan_if_absent(&self, plan: &Plan) -> BillingResult<bool>;

    async fn subscription_for_tenant(&self, tenant_id: Uuid)
        -> BillingResult<Option<Subscription>>;

    /// Locate a subscription by the external billing customer reference.
    async fn subscription_for_customer(
        &self,
        customer_ref: &str,
    ) -> BillingResult<Option<Subscription>>;

    async fn insert_subscription(&self, sub: &Subscription)
        -> BillingResult<SubscriptionInsert>;

    async fn update_subscription(&self, sub: &Subscription) -> BillingResult<()>;
}

/// The externally-owned store/product/catalog collections. The billing core
/// only counts, resolves slugs, and inserts; everything else about these
/// tables belongs to the catalog CRUD layer.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// The tenant's store, if one has been created yet.
    async fn store_for_tenant(&self, tenant_id: Uuid) -> BillingResult<Option<Uuid>>;

    /// Count of committed resources of `kind` in a store. Fresh read every
    /// call; staleness here causes false denials or limit overruns.
    async fn count(&self, store_id: Uuid, kind: ResourceKind) -> BillingResult<i64>;

    /// Slug -> id for all catalogs in a store (bulk import row resolution).
    async fn catalogs_by_slug(&self, store_id: Uuid) -> BillingResult<HashMap<String, Uuid>>;

    /// All product slugs already used in a store.
    async fn product_slugs(&self, store_id: Uuid) -> BillingResult<Vec<String>>;

    async fn insert_product(&self, store_id: Uuid, product: &NewProduct) -> BillingResult<Uuid>;

    async fn insert_catalog(&self, store_id: Uuid, catalog: &NewCatalog) -> BillingResult<Uuid>;
}

fn is_unique_violation(e: &sqlx::Error) -> bool {
    e.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}

// =============================================================================
// Postgres implementations
// =============================================================================

const SUBSCRIPTION_COLUMNS: &str = "id, tenant_id, plan_code, status, trial_started_at, \
     trial_ends_at, current_period_starts_at, current_period_ends_at, stripe_customer_id, \
     stripe_subscription_id, stripe_price_id, cancel_at_period_end, canceled_at, \
     created_at, updated_at";

#[derive(Clone)]
pub struct PgBillingStore {
    pool: PgPool,
}

impl PgBillingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BillingStore for PgBillingStore {
    async fn get_plan(&self, code: PlanCode) -> BillingResult<Option<Plan>> {
        let plan = sqlx::query_as::<_, Plan>(
            "SELECT code, name, monthly_price_mxn, max_products, max_catalogs, \
             branding_visible, analytics_level, created_at FROM plans WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(&self.pool)
        .await?;

        Ok(plan)
    }

    async fn list_plans(&self) -> BillingResult<Vec<Plan>> {
        let plans = sqlx::query_as::<_, Plan>(
            "SELECT code, name, monthly_price_mxn, max_products, max_catalogs, \
             branding_visible, analytics_level, created_at FROM plans",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(plans)
    }

    async fn insert_plan_if_absent(&self, plan: &Plan) -> BillingResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO plans
                (code, name, monthly_price_mxn, max_products, max_catalogs,
                 branding_visible, analytics_level, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (code) DO NOTHING
            "#,
        )
        .bind(plan.code)
        .bind(&plan.name)
        .bind(plan.monthly_price_mxn)
        .bind(plan.max_products)
        .bind(plan.max_catalogs)
        .bind(plan.branding_visible)
        .bind(plan.analytics_level)
        .bind(plan.created_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn subscription_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> BillingResult<Option<Subscription>> {
        let sub = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE tenant_id = $1"
        ))
        .bind(tenant_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sub)
    }

    async fn subscription_for_customer(
        &self,
        customer_ref: &str,
    ) -> BillingResult<Option<Subscription>> {
        let sub = sqlx::query_as::<_, Subscription>(&format!(
            "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions WHERE stripe_customer_id = $1"
        ))
        .bind(customer_ref)
        .fetch_optional(&self.pool)
        .await?;

        Ok(sub)
    }

    async fn insert_subscription(
        &self,
        sub: &Subscription,
    ) -> BillingResult<SubscriptionInsert> {
        let result = sqlx::query(
            r#"
            INSERT INTO subscriptions
                (id, tenant_id, plan_code, status, trial_started_at, trial_ends_at,
                 current_period_starts_at, current_period_ends_at, stripe_customer_id,
                 stripe_subscription_id, stripe_price_id, cancel_at_period_end,
                 canceled_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(sub.id)
        .bind(sub.tenant_id)
        .bind(sub.plan_code)
        .bind(sub.status)
        .bind(sub.trial_started_at)
        .bind(sub.trial_ends_at)
        .bind(sub.current_period_starts_at)
        .bind(sub.current_period_ends_at)
        .bind(&sub.stripe_customer_id)
        .bind(&sub.stripe_subscription_id)
        .bind(&sub.stripe_price_id)
        .bind(sub.cancel_at_period_end)
        .bind(sub.canceled_at)
        .bind(sub.created_at)
        .bind(sub.updated_at)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(SubscriptionInsert::Inserted),
            Err(e) if is_unique_violation(&e) => Ok(SubscriptionInsert::TenantExists),
            Err(e) => Err(e.into()),
        }
    }

    async fn update_subscription(&self, sub: &Subscription) -> BillingResult<()> {
        sqlx::query(
            r#"
            UPDATE subscriptions SET
                plan_code = $2,
                status = $3,
                trial_started_at = $4,
                trial_ends_at = $5,
                current_period_starts_at = $6,
                current_period_ends_at = $7,
                stripe_customer_id = $8,
                stripe_subscription_id = $9,
                stripe_price_id = $10,
                cancel_at_period_end = $11,
                canceled_at = $12,
                updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(sub.id)
        .bind(sub.plan_code)
        .bind(sub.status)
        .bind(sub.trial_started_at)
        .bind(sub.trial_ends_at)
        .bind(sub.current_period_starts_at)
        .bind(sub.current_period_ends_at)
        .bind(&sub.stripe_customer_id)
        .bind(&sub.stripe_subscription_id)
        .bind(&sub.stripe_price_id)
        .bind(sub.cancel_at_period_end)
        .bind(sub.canceled_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[derive(Clone)]
pub struct PgResourceStore {
    pool: PgPool,
}

impl PgResourceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResourceStore for PgResourceStore {
    async fn store_for_tenant(&self, tenant_id: Uuid) -> BillingResult<Option<Uuid>> {
        let id: Option<Uuid> = sqlx::query_scalar("SELECT id FROM stores WHERE owner_id = $1")
            .bind(tenant_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(id)
    }

    async fn count(&self, store_id: Uuid, kind: ResourceKind) -> BillingResult<i64> {
        let query = match kind {
            ResourceKind::Products => "SELECT COUNT(*) FROM products WHERE store_id = $1",
            ResourceKind::Catalogs => "SELECT COUNT(*) FROM catalogs WHERE store_id = $1",
        };

        let count: i64 = sqlx::query_scalar(query)
            .bind(store_id)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn catalogs_by_slug(&self, store_id: Uuid) -> BillingResult<HashMap<String, Uuid>> {
        let rows: Vec<(String, Uuid)> =
            sqlx::query_as("SELECT slug, id FROM catalogs WHERE store_id = $1")
                .bind(store_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().collect())
    }

    async fn product_slugs(&self, store_id: Uuid) -> BillingResult<Vec<String>> {
        let slugs: Vec<String> =
            sqlx::query_scalar("SELECT slug FROM products WHERE store_id = $1")
                .bind(store_id)
                .fetch_all(&self.pool)
                .await?;

        Ok(slugs)
    }

    async fn insert_product(&self, store_id: Uuid, product: &NewProduct) -> BillingResult<Uuid> {
        let id = Uuid::new_v4();
        let result = sqlx::query(
            r#"
            INSERT INTO products
                (id, store_id, catalog_id, name, slug, description, price_text,
                 stock, status, sort_order)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, 'active', $9)
            "#,
        )
        .bind(id)
        .bind(store_id)
        .bind(product.catalog_id)
        .bind(&product.name)
        .bind(&product.slug)
        .bind(&product.description)
        .bind(&product.price_text)
        .bind(product.stock)
        .bind(product.sort_order)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(id),
            Err(e) if is_unique_violation(&e) => {
                Err(BillingError::DuplicateSlug(product.slug.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn insert_catalog(&self, store_id: Uuid, catalog: &NewCatalog) -> BillingResult<Uuid> {
        let id = Uuid::new_v4();
        let result = sqlx::query(
            "INSERT INTO catalogs (id, store_id, name, slug, description) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(store_id)
        .bind(&catalog.name)
        .bind(&catalog.slug)
        .bind(&catalog.description)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(id),
            Err(e) if is_unique_violation(&e) => {
                Err(BillingError::DuplicateSlug(catalog.slug.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

// =============================================================================
// In-memory implementations
// =============================================================================

/// In-memory billing store. Backs tests and local development; the maps
/// model the same uniqueness constraints the schema enforces.
#[derive(Default)]
pub struct MemoryBillingStore {
    plans: RwLock<HashMap<PlanCode, Plan>>,
    subscriptions: RwLock<HashMap<Uuid, Subscription>>,
}

impl MemoryBillingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of subscription records held. Exposed for race assertions.
    pub async fn subscription_count(&self) -> usize {
        self.subscriptions.read().await.len()
    }
}

#[async_trait]
impl BillingStore for MemoryBillingStore {
    async fn get_plan(&self, code: PlanCode) -> BillingResult<Option<Plan>> {
        Ok(self.plans.read().await.get(&code).cloned())
    }

    async fn list_plans(&self) -> BillingResult<Vec<Plan>> {
        Ok(self.plans.read().await.values().cloned().collect())
    }

    async fn insert_plan_if_absent(&self, plan: &Plan) -> BillingResult<bool> {
        let mut plans = self.plans.write().await;
        if plans.contains_key(&plan.code) {
            return Ok(false);
        }
        plans.insert(plan.code, plan.clone());
        Ok(true)
    }

    async fn subscription_for_tenant(
        &self,
        tenant_id: Uuid,
    ) -> BillingResult<Option<Subscription>> {
        Ok(self.subscriptions.read().await.get(&tenant_id).cloned())
    }

    async fn subscription_for_customer(
        &self,
        customer_ref: &str,
    ) -> BillingResult<Option<Subscription>> {
        Ok(self
            .subscriptions
            .read()
            .await
            .values()
            .find(|s| s.stripe_customer_id.as_deref() == Some(customer_ref))
            .cloned())
    }

    async fn insert_subscription(
        &self,
        sub: &Subscription,
    ) -> BillingResult<SubscriptionInsert> {
        let mut subs = self.subscriptions.write().await;
        if subs.contains_key(&sub.tenant_id) {
            return Ok(SubscriptionInsert::TenantExists);
        }
        subs.insert(sub.tenant_id, sub.clone());
        Ok(SubscriptionInsert::Inserted)
    }

    async fn update_subscription(&self, sub: &Subscription) -> BillingResult<()> {
        let mut subs = self.subscriptions.write().await;
        match subs.get_mut(&sub.tenant_id) {
            Some(existing) => {
                let mut updated = sub.clone();
                updated.updated_at = OffsetDateTime::now_utc();
                *existing = updated;
                Ok(())
            }
            None => Err(BillingError::NotFound(format!(
                "subscription for tenant {}",
                sub.tenant_id
            ))),
        }
    }
}

#[derive(Debug, Clone)]
struct ProductRow {
    slug: String,
}

#[derive(Debug, Clone)]
struct CatalogRow {
    id: Uuid,
    slug: String,
}

/// In-memory resource store with the same per-store slug uniqueness the
/// schema enforces.
#[derive(Default)]
pub struct MemoryResourceStore {
    stores: RwLock<HashMap<Uuid, Uuid>>,
    products: RwLock<HashMap<Uuid, Vec<ProductRow>>>,
    catalogs: RwLock<HashMap<Uuid, Vec<CatalogRow>>>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a store for a tenant and return its id.
    pub async fn add_store(&self, tenant_id: Uuid) -> Uuid {
        let store_id = Uuid::new_v4();
        self.stores.write().await.insert(tenant_id, store_id);
        store_id
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn store_for_tenant(&self, tenant_id: Uuid) -> BillingResult<Option<Uuid>> {
        Ok(self.stores.read().await.get(&tenant_id).copied())
    }

    async fn count(&self, store_id: Uuid, kind: ResourceKind) -> BillingResult<i64> {
        let count = match kind {
            ResourceKind::Products => self
                .products
                .read()
                .await
                .get(&store_id)
                .map(Vec::len)
                .unwrap_or(0),
            ResourceKind::Catalogs => self
                .catalogs
                .read()
                .await
                .get(&store_id)
                .map(Vec::len)
                .unwrap_or(0),
        };
        Ok(count as i64)
    }

    async fn catalogs_by_slug(&self, store_id: Uuid) -> BillingResult<HashMap<String, Uuid>> {
        Ok(self
            .catalogs
            .read()
            .await
            .get(&store_id)
            .map(|rows| rows.iter().map(|c| (c.slug.clone(), c.id)).collect())
            .unwrap_or_default())
    }

    async fn product_slugs(&self, store_id: Uuid) -> BillingResult<Vec<String>> {
        Ok(self
            .products
            .read()
            .await
            .get(&store_id)
            .map(|rows| rows.iter().map(|p| p.slug.clone()).collect())
            .unwrap_or_default())
    }

    async fn insert_product(&self, store_id: Uuid, product: &NewProduct) -> BillingResult<Uuid> {
        let mut products = self.products.write().await;
        let rows = products.entry(store_id).or_default();
        if rows.iter().any(|p| p.slug == product.slug) {
            return Err(BillingError::DuplicateSlug(product.slug.clone()));
        }
        rows.push(ProductRow {
            slug: product.slug.clone(),
        });
        Ok(Uuid::new_v4())
    }

    async fn insert_catalog(&self, store_id: Uuid, catalog: &NewCatalog) -> BillingResult<Uuid> {
        let mut catalogs = self.catalogs.write().await;
        let rows = catalogs.entry(store_id).or_default();
        if rows.iter().any(|c| c.slug == catalog.slug) {
            return Err(BillingError::DuplicateSlug(catalog.slug.clone()));
        }
        let id = Uuid::new_v4();
        rows.push(CatalogRow {
            id,
            slug: catalog.slug.clone(),
        });
        Ok(id)
    }
}
