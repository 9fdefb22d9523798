//! Common test utilities for plangate integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderName, HeaderValue};
use axum::Router;
use axum_test::{TestRequest, TestResponse, TestServer};
use chrono::{DateTime, Duration, Utc};
use serde_json::{json, Value};

use plangate_core::{
    Catalog, Customer, Feature, Invoice, Module, Payment, Plan, PlanFeature, Processor,
    SubscriberContext, Subscription, SubscriptionId, UsageKey, UsageRecord, WebhookEvent,
    WebhookKey,
};
use plangate_service::catalog::{import_catalog, CatalogDefaults, CatalogFile};
use plangate_service::gateway::stripe::sign_payload;
use plangate_service::reconciler::WebhookOrdering;
use plangate_service::{create_router, AppState, ServiceConfig};
use plangate_store::{
    EventLease, MemoryStore, Store, StoreError, SubscriptionLease, WebhookChanges,
};

/// Service API key accepted by the harness.
pub const SERVICE_API_KEY: &str = "test-service-key";

/// Stripe webhook signing secret used by the harness.
pub const STRIPE_WEBHOOK_SECRET: &str = "whsec_test";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The store behind the server, for seeding and assertions.
    pub store: Arc<dyn Store>,
    /// The state the router was built from.
    pub state: Arc<AppState>,
}

impl TestHarness {
    /// A harness over a fresh in-memory store with the test catalog.
    pub async fn new() -> Self {
        Self::build(Arc::new(MemoryStore::new()), config()).await
    }

    /// A harness over `store`.
    pub async fn with_store(store: Arc<dyn Store>) -> Self {
        Self::build(store, config()).await
    }

    /// A harness with a custom configuration.
    pub async fn with_config(config: ServiceConfig) -> Self {
        Self::build(Arc::new(MemoryStore::new()), config).await
    }

    async fn build(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        seed_catalog(store.as_ref()).await;

        let state = AppState::from_config(store.clone(), config).expect("Invalid test config");
        let router: Router = create_router(state.clone());
        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            store,
            state: Arc::new(state),
        }
    }

    /// GET with service credentials.
    pub fn get(&self, path: &str) -> TestRequest {
        authorized(self.server.get(path))
    }

    /// POST with service credentials.
    pub fn post(&self, path: &str) -> TestRequest {
        authorized(self.server.post(path))
    }

    /// Deliver a Stripe webhook signed with the harness secret.
    pub async fn stripe_webhook(&self, body: &[u8]) -> TestResponse {
        self.signed_webhook(body).await
    }

    /// A signed Stripe webhook request, not yet sent.
    pub fn signed_webhook(&self, body: &[u8]) -> TestRequest {
        let signature = sign_payload(STRIPE_WEBHOOK_SECRET, Utc::now().timestamp(), body);
        self.server
            .post("/webhooks/stripe")
            .add_header(
                HeaderName::from_static("stripe-signature"),
                HeaderValue::from_str(&signature).expect("Invalid signature header"),
            )
            .bytes(body.to_vec().into())
    }

    /// Store an active Stripe subscription for `subscriber` on `plan_slug`.
    pub async fn seed_subscription(
        &self,
        subscriber: &str,
        plan_slug: &str,
        external_id: &str,
    ) -> Subscription {
        let plan = self
            .store
            .get_plan_by_slug(plan_slug)
            .await
            .expect("Failed to read plan")
            .expect("Plan not seeded");
        let subscriber: SubscriberContext = subscriber.parse().expect("Invalid subscriber");
        let mut subscription =
            Subscription::start(subscriber, &plan, Processor::Stripe, Utc::now())
                .expect("Failed to start subscription");
        subscription.external_id = external_id.to_string();
        self.store
            .put_subscriptions(std::slice::from_ref(&subscription))
            .await
            .expect("Failed to store subscription");
        subscription
    }

    /// Reload a subscription by id.
    pub async fn subscription(&self, id: &SubscriptionId) -> Subscription {
        self.store
            .get_subscription(id)
            .await
            .expect("Failed to read subscription")
            .expect("Subscription missing")
    }
}

fn authorized(request: TestRequest) -> TestRequest {
    request
        .add_header(
            HeaderName::from_static("x-api-key"),
            HeaderValue::from_static(SERVICE_API_KEY),
        )
        .add_header(
            HeaderName::from_static("x-service-name"),
            HeaderValue::from_static("integration-tests"),
        )
}

/// Configuration with Stripe enabled and no trial by default.
pub fn config() -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        service_api_key: Some(SERVICE_API_KEY.into()),
        payment_processors: vec!["stripe".into()],
        stripe_api_key: Some("sk_test_xxx".into()),
        stripe_webhook_secret: Some(STRIPE_WEBHOOK_SECRET.into()),
        trial_period_days: 0,
        webhook_ordering: WebhookOrdering::ProcessingOrder,
        ..ServiceConfig::default()
    }
}

/// Seed the test catalog: `basic` and `pro` plans over an `api` module.
///
/// `pro` grants 5000 `api-access` requests and `sso`; `basic` grants the default
/// 1000 requests. `white-label` is defined but included nowhere.
pub async fn seed_catalog(store: &dyn Store) {
    let file: CatalogFile = serde_json::from_value(json!({
        "modules": [{
            "slug": "api",
            "name": "API",
            "features": [
                { "slug": "api-access", "name": "API access", "type": "quota",
                  "default_quota": 1000, "quota_unit": "requests" },
                { "slug": "sso", "name": "Single sign-on" },
                { "slug": "white-label", "name": "White label" }
            ]
        }],
        "plans": [
            {
                "slug": "basic", "name": "Basic", "price_minor": 900,
                "billing_period": "monthly", "sort_order": 1,
                "features": [{ "feature": "api/api-access" }]
            },
            {
                "slug": "pro", "name": "Pro", "price_minor": 3000,
                "billing_period": "monthly", "sort_order": 2,
                "features": [
                    { "feature": "api/api-access", "quota": 5000 },
                    { "feature": "api/sso" }
                ]
            }
        ]
    }))
    .expect("Invalid catalog fixture");

    let defaults = CatalogDefaults {
        currency: "USD".into(),
        trial_period_days: 0,
    };
    import_catalog(store, file, &defaults)
        .await
        .expect("Failed to seed catalog");
}

// ============================================================================
// Stripe payloads
// ============================================================================

/// A Stripe event envelope.
pub fn stripe_event(id: &str, event_type: &str, created: DateTime<Utc>, object: Value) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": id,
        "object": "event",
        "type": event_type,
        "created": created.timestamp(),
        "data": { "object": object }
    }))
    .expect("Failed to encode event")
}

/// A Stripe subscription object with a 30-day period starting now.
pub fn stripe_subscription(id: &str, status: &str) -> Value {
    let start = Utc::now();
    json!({
        "id": id,
        "object": "subscription",
        "status": status,
        "current_period_start": start.timestamp(),
        "current_period_end": (start + Duration::days(30)).timestamp(),
        "trial_end": null,
        "canceled_at": null,
        "items": { "data": [{ "id": "si_test_1" }] }
    })
}

/// A Stripe invoice object for `subscription`.
pub fn stripe_invoice(id: &str, subscription: &str, status: &str) -> Value {
    json!({
        "id": id,
        "object": "invoice",
        "number": "INV-0001",
        "status": status,
        "total": 3000,
        "amount_paid": if status == "paid" { 3000 } else { 0 },
        "amount_due": 3000,
        "currency": "usd",
        "subscription": subscription,
        "payment_intent": format!("pi_{id}")
    })
}

// ============================================================================
// Fault injection
// ============================================================================

/// A [`MemoryStore`] with injectable commit failures and slow subscription lookups.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    failing_commits: AtomicU32,
    lookup_delay_ms: AtomicU64,
    catalog_loads: AtomicU32,
}

impl FlakyStore {
    /// Fail the next `count` webhook commits.
    pub fn fail_commits(&self, count: u32) {
        self.failing_commits.store(count, Ordering::SeqCst);
    }

    /// Stall every subscription lookup by `millis` after reading the row.
    pub fn slow_lookups(&self, millis: u64) {
        self.lookup_delay_ms.store(millis, Ordering::SeqCst);
    }

    /// How many times the catalog has been read.
    pub fn catalog_loads(&self) -> u32 {
        self.catalog_loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Store for FlakyStore {
    async fn put_plan(&self, plan: &Plan) -> plangate_store::Result<()> {
        self.inner.put_plan(plan).await
    }

    async fn get_plan_by_slug(&self, slug: &str) -> plangate_store::Result<Option<Plan>> {
        self.inner.get_plan_by_slug(slug).await
    }

    async fn put_module(&self, module: &Module) -> plangate_store::Result<()> {
        self.inner.put_module(module).await
    }

    async fn get_module_by_slug(&self, slug: &str) -> plangate_store::Result<Option<Module>> {
        self.inner.get_module_by_slug(slug).await
    }

    async fn put_feature(&self, feature: &Feature) -> plangate_store::Result<()> {
        self.inner.put_feature(feature).await
    }

    async fn put_plan_feature(&self, plan_feature: &PlanFeature) -> plangate_store::Result<()> {
        self.inner.put_plan_feature(plan_feature).await
    }

    async fn load_catalog(&self) -> plangate_store::Result<Catalog> {
        self.catalog_loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load_catalog().await
    }

    async fn get_customer(
        &self,
        subscriber: &SubscriberContext,
    ) -> plangate_store::Result<Option<Customer>> {
        self.inner.get_customer(subscriber).await
    }

    async fn put_customer(&self, customer: &Customer) -> plangate_store::Result<()> {
        self.inner.put_customer(customer).await
    }

    async fn ensure_customer(&self, template: Customer) -> plangate_store::Result<Customer> {
        self.inner.ensure_customer(template).await
    }

    async fn put_subscriptions(
        &self,
        subscriptions: &[Subscription],
    ) -> plangate_store::Result<()> {
        self.inner.put_subscriptions(subscriptions).await
    }

    async fn get_subscription(
        &self,
        id: &SubscriptionId,
    ) -> plangate_store::Result<Option<Subscription>> {
        self.inner.get_subscription(id).await
    }

    async fn find_subscription_by_external_id(
        &self,
        processor: Processor,
        external_id: &str,
    ) -> plangate_store::Result<Option<Subscription>> {
        let found = self
            .inner
            .find_subscription_by_external_id(processor, external_id)
            .await?;
        let delay = self.lookup_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        Ok(found)
    }

    async fn lock_subscription(
        &self,
        processor: Processor,
        key: &str,
    ) -> plangate_store::Result<SubscriptionLease> {
        self.inner.lock_subscription(processor, key).await
    }

    async fn list_subscriptions(
        &self,
        subscriber: &SubscriberContext,
    ) -> plangate_store::Result<Vec<Subscription>> {
        self.inner.list_subscriptions(subscriber).await
    }

    async fn list_live_subscriptions(&self) -> plangate_store::Result<Vec<Subscription>> {
        self.inner.list_live_subscriptions().await
    }

    async fn list_all_subscriptions(&self) -> plangate_store::Result<Vec<Subscription>> {
        self.inner.list_all_subscriptions().await
    }

    async fn increment_usage(
        &self,
        key: &UsageKey,
        period_end: DateTime<Utc>,
        delta: u64,
    ) -> plangate_store::Result<UsageRecord> {
        self.inner.increment_usage(key, period_end, delta).await
    }

    async fn get_usage(&self, key: &UsageKey) -> plangate_store::Result<Option<UsageRecord>> {
        self.inner.get_usage(key).await
    }

    async fn list_usage_since(
        &self,
        since: DateTime<Utc>,
    ) -> plangate_store::Result<Vec<UsageRecord>> {
        self.inner.list_usage_since(since).await
    }

    async fn lock_webhook_event(&self, key: &WebhookKey) -> plangate_store::Result<EventLease> {
        self.inner.lock_webhook_event(key).await
    }

    async fn get_webhook_event(
        &self,
        key: &WebhookKey,
    ) -> plangate_store::Result<Option<WebhookEvent>> {
        self.inner.get_webhook_event(key).await
    }

    async fn put_webhook_event(&self, event: &WebhookEvent) -> plangate_store::Result<()> {
        self.inner.put_webhook_event(event).await
    }

    async fn commit_webhook(
        &self,
        event: &WebhookEvent,
        changes: &WebhookChanges,
    ) -> plangate_store::Result<()> {
        let remaining = self.failing_commits.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_commits.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Database("injected commit failure".into()));
        }
        self.inner.commit_webhook(event, changes).await
    }

    async fn get_invoice_by_external_id(
        &self,
        processor: Processor,
        external_id: &str,
    ) -> plangate_store::Result<Option<Invoice>> {
        self.inner
            .get_invoice_by_external_id(processor, external_id)
            .await
    }

    async fn get_payment_by_external_id(
        &self,
        processor: Processor,
        external_id: &str,
    ) -> plangate_store::Result<Option<Payment>> {
        self.inner
            .get_payment_by_external_id(processor, external_id)
            .await
    }
}
