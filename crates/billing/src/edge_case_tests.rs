// Test file - these are expected patterns in test code
#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]

//! Edge Case Tests for Plan Entitlements
//!
//! Tests critical boundary conditions and race behavior in:
//! - Plan seeding idempotence
//! - Lazy subscription creation under concurrency
//! - Entitlement guard ceilings
//! - Bulk import halt-on-denial
//! - Webhook reconciliation and signature verification
//! - Advisory trial expiry

use std::sync::Arc;

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use storefront_shared::{PlanCode, ResourceKind, SubscriptionStatus};

use crate::client::{PriceIds, StripeConfig};
use crate::entitlement::EntitlementService;
use crate::plans::{Plan, PlanCatalog};
use crate::store::{
    BillingStore, MemoryBillingStore, MemoryResourceStore, NewProduct, ResourceStore,
};
use crate::subscriptions::{Subscription, SubscriptionService};

async fn seeded_store() -> Arc<MemoryBillingStore> {
    let store = Arc::new(MemoryBillingStore::new());
    let catalog = PlanCatalog::new(store.clone());
    catalog.ensure_seeded().await.unwrap();
    store
}

/// Insert a subscription pinned to a specific plan, bypassing the default
/// trial plan.
async fn put_subscription(
    store: &Arc<MemoryBillingStore>,
    tenant_id: Uuid,
    plan: PlanCode,
    customer: Option<&str>,
) -> Subscription {
    let mut sub = Subscription::trial(tenant_id, OffsetDateTime::now_utc());
    sub.plan_code = plan;
    sub.stripe_customer_id = customer.map(String::from);
    store.insert_subscription(&sub).await.unwrap();
    sub
}

fn test_stripe_config() -> StripeConfig {
    StripeConfig {
        secret_key: "sk_test_123".to_string(),
        webhook_secret: "whsec_testsecret".to_string(),
        app_url: "http://localhost:3000".to_string(),
        price_ids: PriceIds {
            growth: Some("price_growth".to_string()),
            pro: Some("price_pro".to_string()),
        },
    }
}

async fn fill_products(resources: &Arc<MemoryResourceStore>, store_id: Uuid, count: usize) {
    let start = resources.product_slugs(store_id).await.unwrap().len();
    for i in start..start + count {
        let product = NewProduct {
            name: format!("Product {}", i),
            slug: format!("product-{}", i),
            description: None,
            price_text: None,
            stock: 0,
            catalog_id: None,
            sort_order: 0,
        };
        resources.insert_product(store_id, &product).await.unwrap();
    }
}

mod seeding_tests {
    use super::*;

    #[tokio::test]
    async fn reseeding_never_touches_existing_plans() {
        let store = Arc::new(MemoryBillingStore::new());
        let catalog = PlanCatalog::new(store.clone());

        // Operator hand-tuned the starter ceiling before the seed runs.
        let mut tuned = Plan::starter();
        tuned.max_products = Some(50);
        assert!(store.insert_plan_if_absent(&tuned).await.unwrap());

        catalog.ensure_seeded().await.unwrap();
        catalog.ensure_seeded().await.unwrap();

        let starter = catalog.get_plan(PlanCode::Starter).await.unwrap();
        assert_eq!(starter.max_products, Some(50), "seed must not clobber live limits");

        // The missing codes were filled in.
        assert!(catalog.get_plan(PlanCode::Growth).await.is_ok());
        assert!(catalog.get_plan(PlanCode::Pro).await.is_ok());
    }

    #[tokio::test]
    async fn plans_list_in_canonical_rank_order() {
        let store = seeded_store().await;
        let catalog = PlanCatalog::new(store);

        let plans = catalog.list_plans().await.unwrap();
        let codes: Vec<PlanCode> = plans.iter().map(|p| p.code).collect();
        assert_eq!(codes, vec![PlanCode::Starter, PlanCode::Growth, PlanCode::Pro]);
    }

    #[tokio::test]
    async fn missing_plan_is_a_distinct_error() {
        let store = Arc::new(MemoryBillingStore::new());
        let catalog = PlanCatalog::new(store);

        let err = catalog.get_plan(PlanCode::Growth).await.unwrap_err();
        assert!(matches!(err, crate::error::BillingError::PlanNotFound(_)));
    }
}

mod subscription_tests {
    use super::*;
    use tokio::sync::Barrier;

    #[tokio::test]
    async fn first_access_creates_trial_subscription() {
        let store = seeded_store().await;
        let service = SubscriptionService::new(store.clone());
        let tenant = Uuid::new_v4();

        assert!(service.get(tenant).await.unwrap().is_none());

        let sub = service.get_or_create(tenant).await.unwrap();
        assert_eq!(sub.plan_code, PlanCode::Pro);
        assert_eq!(sub.status, SubscriptionStatus::Trialing);
        assert_eq!(store.subscription_count().await, 1);

        // Second call reads the same record.
        let again = service.get_or_create(tenant).await.unwrap();
        assert_eq!(again.id, sub.id);
        assert_eq!(store.subscription_count().await, 1);
    }

    #[tokio::test]
    async fn concurrent_first_access_creates_exactly_one_record() {
        let store = seeded_store().await;
        let resources = Arc::new(MemoryResourceStore::new());
        let tenant = Uuid::new_v4();

        let barrier = Arc::new(Barrier::new(2));
        let mut handles = vec![];

        for _ in 0..2 {
            let store = store.clone();
            let resources = resources.clone();
            let barrier = barrier.clone();

            handles.push(tokio::spawn(async move {
                let entitlements = EntitlementService::new(store, resources);
                barrier.wait().await;
                entitlements.resolve_limits(tenant).await
            }));
        }

        for handle in handles {
            let limits = handle.await.unwrap().unwrap();
            assert_eq!(limits.plan_code, PlanCode::Pro);
        }

        assert_eq!(
            store.subscription_count().await,
            1,
            "racing first access must not duplicate the subscription"
        );
    }
}

mod guard_tests {
    use super::*;

    #[tokio::test]
    async fn denied_at_ceiling_allowed_one_under() {
        let store = seeded_store().await;
        let resources = Arc::new(MemoryResourceStore::new());
        let tenant = Uuid::new_v4();
        put_subscription(&store, tenant, PlanCode::Starter, None).await;
        let store_id = resources.add_store(tenant).await;

        let entitlements = EntitlementService::new(store.clone(), resources.clone());

        fill_products(&resources, store_id, 19).await;
        let decision = entitlements
            .check_allowed(store_id, tenant, ResourceKind::Products)
            .await
            .unwrap();
        assert!(decision.is_allowed(), "19 of 20 must be allowed");

        fill_products(&resources, store_id, 1).await;
        let decision = entitlements
            .check_allowed(store_id, tenant, ResourceKind::Products)
            .await
            .unwrap();
        assert!(!decision.is_allowed(), "20 of 20 must be denied");
    }

    #[tokio::test]
    async fn unlimited_plan_never_denies() {
        let store = seeded_store().await;
        let resources = Arc::new(MemoryResourceStore::new());
        let tenant = Uuid::new_v4();
        put_subscription(&store, tenant, PlanCode::Pro, None).await;
        let store_id = resources.add_store(tenant).await;

        fill_products(&resources, store_id, 500).await;

        let entitlements = EntitlementService::new(store, resources);
        let decision = entitlements
            .check_allowed(store_id, tenant, ResourceKind::Products)
            .await
            .unwrap();
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn catalog_ceiling_is_independent_of_products() {
        let store = seeded_store().await;
        let resources = Arc::new(MemoryResourceStore::new());
        let tenant = Uuid::new_v4();
        put_subscription(&store, tenant, PlanCode::Starter, None).await;
        let store_id = resources.add_store(tenant).await;

        // Starter allows 2 catalogs; product usage is irrelevant to it.
        fill_products(&resources, store_id, 20).await;

        let entitlements = EntitlementService::new(store, resources.clone());
        let decision = entitlements
            .check_allowed(store_id, tenant, ResourceKind::Catalogs)
            .await
            .unwrap();
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn usage_summary_reports_plan_and_counts() {
        let store = seeded_store().await;
        let resources = Arc::new(MemoryResourceStore::new());
        let tenant = Uuid::new_v4();
        put_subscription(&store, tenant, PlanCode::Starter, None).await;
        let store_id = resources.add_store(tenant).await;
        fill_products(&resources, store_id, 3).await;

        let entitlements = EntitlementService::new(store, resources);
        let summary = entitlements.usage_summary(tenant).await.unwrap();

        assert_eq!(summary.plan_code, PlanCode::Starter);
        assert_eq!(summary.plan_name, "Starter");
        assert_eq!(summary.max_products, Some(20));
        assert_eq!(summary.products_used, 3);
        assert_eq!(summary.catalogs_used, 0);
    }

    #[tokio::test]
    async fn tenant_without_store_has_zero_usage() {
        let store = seeded_store().await;
        let resources = Arc::new(MemoryResourceStore::new());
        let tenant = Uuid::new_v4();

        let entitlements = EntitlementService::new(store, resources);
        let summary = entitlements.usage_summary(tenant).await.unwrap();
        assert_eq!(summary.products_used, 0);
        assert_eq!(summary.catalogs_used, 0);
    }
}

mod import_tests {
    use super::*;
    use crate::import::{BulkImporter, ImportRow};

    fn rows(count: usize) -> Vec<ImportRow> {
        (0..count)
            .map(|i| ImportRow {
                name: Some(format!("Product {}", i)),
                ..ImportRow::default()
            })
            .collect()
    }

    #[tokio::test]
    async fn import_self_limits_to_the_ceiling() {
        let store = seeded_store().await;
        let resources = Arc::new(MemoryResourceStore::new());
        let tenant = Uuid::new_v4();
        put_subscription(&store, tenant, PlanCode::Starter, None).await;
        let store_id = resources.add_store(tenant).await;

        let importer = BulkImporter::new(store, resources.clone());
        let report = importer
            .import_products(store_id, tenant, rows(25))
            .await
            .unwrap();

        assert_eq!(report.imported, 20, "exactly the ceiling must be imported");
        assert_eq!(report.failed, 5);
        assert_eq!(
            resources
                .count(store_id, ResourceKind::Products)
                .await
                .unwrap(),
            20
        );

        // Rows 1..=20 are spreadsheet rows 2..=21; the denial lands on
        // spreadsheet row 22 and every row after it.
        let failed_rows: Vec<u32> = report.failures.iter().map(|f| f.row_number).collect();
        assert_eq!(failed_rows, vec![22, 23, 24, 25, 26]);
        for failure in &report.failures {
            assert!(failure.message.contains("limit"), "got: {}", failure.message);
        }
    }

    #[tokio::test]
    async fn import_at_ceiling_fails_every_row() {
        let store = seeded_store().await;
        let resources = Arc::new(MemoryResourceStore::new());
        let tenant = Uuid::new_v4();
        put_subscription(&store, tenant, PlanCode::Starter, None).await;
        let store_id = resources.add_store(tenant).await;
        fill_products(&resources, store_id, 20).await;

        let importer = BulkImporter::new(store, resources);
        let report = importer
            .import_products(store_id, tenant, rows(3))
            .await
            .unwrap();

        assert_eq!(report.imported, 0);
        assert_eq!(report.failed, 3);
    }

    #[tokio::test]
    async fn validation_failures_do_not_halt_the_batch() {
        let store = seeded_store().await;
        let resources = Arc::new(MemoryResourceStore::new());
        let tenant = Uuid::new_v4();
        put_subscription(&store, tenant, PlanCode::Starter, None).await;
        let store_id = resources.add_store(tenant).await;

        let mut batch = rows(3);
        batch[1].name = None;

        let importer = BulkImporter::new(store, resources);
        let report = importer
            .import_products(store_id, tenant, batch)
            .await
            .unwrap();

        assert_eq!(report.imported, 2, "rows after a bad row still import");
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].row_number, 3);
    }

    #[tokio::test]
    async fn explicit_duplicate_slug_fails_generated_slug_dedupes() {
        let store = seeded_store().await;
        let resources = Arc::new(MemoryResourceStore::new());
        let tenant = Uuid::new_v4();
        put_subscription(&store, tenant, PlanCode::Starter, None).await;
        let store_id = resources.add_store(tenant).await;

        let batch = vec![
            ImportRow {
                name: Some("Gorra Roja".to_string()),
                ..ImportRow::default()
            },
            // Same generated slug: dedupes to gorra-roja-1.
            ImportRow {
                name: Some("Gorra Roja".to_string()),
                ..ImportRow::default()
            },
            // Explicit duplicate: hard per-row failure.
            ImportRow {
                name: Some("Otra Gorra".to_string()),
                slug: Some("gorra-roja".to_string()),
                ..ImportRow::default()
            },
        ];

        let importer = BulkImporter::new(store, resources.clone());
        let report = importer
            .import_products(store_id, tenant, batch)
            .await
            .unwrap();

        assert_eq!(report.imported, 2);
        assert_eq!(report.failed, 1);

        let slugs = resources.product_slugs(store_id).await.unwrap();
        assert!(slugs.contains(&"gorra-roja".to_string()));
        assert!(slugs.contains(&"gorra-roja-1".to_string()));
    }

    #[tokio::test]
    async fn unknown_catalog_slug_fails_only_that_row() {
        let store = seeded_store().await;
        let resources = Arc::new(MemoryResourceStore::new());
        let tenant = Uuid::new_v4();
        put_subscription(&store, tenant, PlanCode::Starter, None).await;
        let store_id = resources.add_store(tenant).await;

        let mut batch = rows(2);
        batch[0].catalog_slug = Some("no-such-catalog".to_string());

        let importer = BulkImporter::new(store, resources);
        let report = importer
            .import_products(store_id, tenant, batch)
            .await
            .unwrap();

        assert_eq!(report.imported, 1);
        assert_eq!(report.failed, 1);
        assert!(report.failures[0].message.contains("no-such-catalog"));
    }
}

mod trial_expiry_tests {
    use super::*;

    /// There is no in-process job expiring trials: 31 days after the trial
    /// started, an untouched subscription still reads as `trialing` and
    /// resolves the trial plan's limits. Expiry only happens when a
    /// reconciliation event arrives. This documents expected current
    /// behavior, not a bug.
    #[tokio::test]
    async fn expired_trial_still_resolves_as_trialing_without_reconciliation() {
        let store = seeded_store().await;
        let resources = Arc::new(MemoryResourceStore::new());
        let tenant = Uuid::new_v4();

        let started = OffsetDateTime::now_utc() - Duration::days(31);
        let sub = Subscription::trial(tenant, started);
        store.insert_subscription(&sub).await.unwrap();

        let entitlements = EntitlementService::new(store.clone(), resources);
        let limits = entitlements.resolve_limits(tenant).await.unwrap();
        assert_eq!(limits.plan_code, PlanCode::Pro);
        assert_eq!(limits.max_products, None);

        let current = SubscriptionService::new(store.clone())
            .get(tenant)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(current.status, SubscriptionStatus::Trialing);
        assert_eq!(current.trial_days_left(OffsetDateTime::now_utc()), 0);
    }
}

mod reconciler_tests {
    use super::*;
    use crate::webhooks::{WebhookEvent, WebhookHandler};
    use serde_json::json;

    fn event(kind: &str, object: serde_json::Value) -> WebhookEvent {
        serde_json::from_value(json!({
            "id": format!("evt_{}", Uuid::new_v4().simple()),
            "type": kind,
            "data": {"object": object},
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn deletion_redelivery_converges_to_the_same_free_state() {
        let store = seeded_store().await;
        let tenant = Uuid::new_v4();
        put_subscription(&store, tenant, PlanCode::Growth, Some("cus_123")).await;

        let handler = WebhookHandler::new(store.clone(), test_stripe_config());
        let deleted = json!({"id": "sub_123", "customer": "cus_123"});

        handler
            .handle_event(event("customer.subscription.deleted", deleted.clone()))
            .await
            .unwrap();
        let first = store.subscription_for_tenant(tenant).await.unwrap().unwrap();

        handler
            .handle_event(event("customer.subscription.deleted", deleted))
            .await
            .unwrap();
        let second = store.subscription_for_tenant(tenant).await.unwrap().unwrap();

        assert_eq!(first.plan_code, PlanCode::Starter);
        assert_eq!(first.status, SubscriptionStatus::Active);
        assert_eq!(second.plan_code, first.plan_code);
        assert_eq!(second.status, first.status);
        assert_eq!(second.stripe_subscription_id, None);
        assert_eq!(second.stripe_price_id, None);
        assert_eq!(second.stripe_customer_id, Some("cus_123".to_string()));
    }

    #[tokio::test]
    async fn update_with_unknown_price_keeps_plan_but_updates_status() {
        let store = seeded_store().await;
        let tenant = Uuid::new_v4();
        put_subscription(&store, tenant, PlanCode::Growth, Some("cus_123")).await;

        let handler = WebhookHandler::new(store.clone(), test_stripe_config());
        let update = json!({
            "id": "sub_123",
            "customer": "cus_123",
            "status": "past_due",
            "items": {"data": [{"price": {"id": "price_retired"}}]},
            "current_period_start": 1_750_000_000i64,
            "current_period_end": 1_752_600_000i64,
            "cancel_at_period_end": false,
        });

        handler
            .handle_event(event("customer.subscription.updated", update))
            .await
            .unwrap();

        let sub = store.subscription_for_tenant(tenant).await.unwrap().unwrap();
        assert_eq!(sub.plan_code, PlanCode::Growth, "unmapped price keeps the plan");
        assert_eq!(sub.status, SubscriptionStatus::PastDue);
        assert!(sub.current_period_ends_at.is_some());
    }

    #[tokio::test]
    async fn update_with_known_price_switches_plan() {
        let store = seeded_store().await;
        let tenant = Uuid::new_v4();
        put_subscription(&store, tenant, PlanCode::Starter, Some("cus_123")).await;

        let handler = WebhookHandler::new(store.clone(), test_stripe_config());
        let update = json!({
            "id": "sub_123",
            "customer": "cus_123",
            "status": "active",
            "items": {"data": [{"price": {"id": "price_pro"}}]},
            "cancel_at_period_end": false,
        });

        handler
            .handle_event(event("customer.subscription.created", update))
            .await
            .unwrap();

        let sub = store.subscription_for_tenant(tenant).await.unwrap().unwrap();
        assert_eq!(sub.plan_code, PlanCode::Pro);
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert_eq!(sub.stripe_subscription_id, Some("sub_123".to_string()));
    }

    #[tokio::test]
    async fn update_for_unknown_customer_is_dropped_not_created() {
        let store = seeded_store().await;
        let handler = WebhookHandler::new(store.clone(), test_stripe_config());

        let update = json!({
            "id": "sub_999",
            "customer": "cus_unknown",
            "status": "active",
            "items": {"data": []},
        });

        // Dropped, not an error: the provider owns retry semantics.
        handler
            .handle_event(event("customer.subscription.updated", update))
            .await
            .unwrap();
        assert_eq!(store.subscription_count().await, 0);
    }

    #[tokio::test]
    async fn checkout_attaches_customer_by_tenant_metadata() {
        let store = seeded_store().await;
        let tenant = Uuid::new_v4();
        put_subscription(&store, tenant, PlanCode::Pro, None).await;

        let handler = WebhookHandler::new(store.clone(), test_stripe_config());
        let session = json!({
            "customer": "cus_new",
            "subscription": "sub_new",
            "metadata": {"tenant_id": tenant.to_string()},
        });

        handler
            .handle_event(event("checkout.session.completed", session))
            .await
            .unwrap();

        let sub = store.subscription_for_tenant(tenant).await.unwrap().unwrap();
        assert_eq!(sub.stripe_customer_id, Some("cus_new".to_string()));
        assert_eq!(sub.stripe_subscription_id, Some("sub_new".to_string()));
    }

    #[tokio::test]
    async fn unrecognized_event_kinds_are_accepted_and_ignored() {
        let store = seeded_store().await;
        let handler = WebhookHandler::new(store, test_stripe_config());

        handler
            .handle_event(event("invoice.finalized", json!({"id": "in_1"})))
            .await
            .unwrap();
    }
}

mod signature_tests {
    use super::*;
    use crate::webhooks::WebhookHandler;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    fn sign(secret: &str, timestamp: i64, payload: &str) -> String {
        let key = secret.strip_prefix("whsec_").unwrap_or(secret);
        let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes()).unwrap();
        mac.update(format!("{}.{}", timestamp, payload).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    const PAYLOAD: &str = r#"{"id":"evt_1","type":"customer.subscription.updated","data":{"object":{}}}"#;

    #[tokio::test]
    async fn valid_signature_is_accepted() {
        let handler = WebhookHandler::new(seeded_store().await, test_stripe_config());

        let now = 1_750_000_000i64;
        let header = format!("t={},v1={}", now, sign("whsec_testsecret", now, PAYLOAD));

        let event = handler.verify_event_at(PAYLOAD, &header, now).unwrap();
        assert_eq!(event.event_type, "customer.subscription.updated");
    }

    #[tokio::test]
    async fn tampered_payload_is_rejected() {
        let handler = WebhookHandler::new(seeded_store().await, test_stripe_config());

        let now = 1_750_000_000i64;
        let header = format!("t={},v1={}", now, sign("whsec_testsecret", now, PAYLOAD));

        let tampered = PAYLOAD.replace("evt_1", "evt_2");
        assert!(handler.verify_event_at(&tampered, &header, now).is_err());
    }

    #[tokio::test]
    async fn stale_timestamp_is_rejected() {
        let handler = WebhookHandler::new(seeded_store().await, test_stripe_config());

        let then = 1_750_000_000i64;
        let header = format!("t={},v1={}", then, sign("whsec_testsecret", then, PAYLOAD));

        assert!(handler.verify_event_at(PAYLOAD, &header, then + 301).is_err());
        assert!(handler.verify_event_at(PAYLOAD, &header, then + 299).is_ok());
    }

    #[tokio::test]
    async fn malformed_header_is_rejected() {
        let handler = WebhookHandler::new(seeded_store().await, test_stripe_config());
        assert!(handler.verify_event_at(PAYLOAD, "v1=abc", 0).is_err());
        assert!(handler.verify_event_at(PAYLOAD, "t=123", 123).is_err());
    }
}
