//! In-memory storage implementation.
//!
//! All tables live behind one async `RwLock`, so every write (including compound
//! writes such as [`Store::commit_webhook`]) is atomic with respect to readers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use plangate_core::{
    Catalog, Customer, Feature, FeatureId, Invoice, Module, ModuleId, Payment, Plan, PlanFeature,
    PlanId, Processor, SubscriberContext, Subscription, SubscriptionId, UsageKey, UsageRecord,
    WebhookEvent, WebhookKey,
};

use crate::error::{Result, StoreError};
use crate::locks::{EventLease, KeyLocks, SubscriptionLease};
use crate::{external_key, Store, WebhookChanges};

#[derive(Debug, Default)]
struct Tables {
    plans: HashMap<PlanId, Plan>,
    modules: HashMap<ModuleId, Module>,
    features: HashMap<FeatureId, Feature>,
    plan_features: HashMap<(PlanId, FeatureId), PlanFeature>,
    customers: HashMap<String, Customer>,
    subscriptions: HashMap<SubscriptionId, Subscription>,
    subscriptions_by_external: HashMap<String, SubscriptionId>,
    usage: HashMap<String, UsageRecord>,
    webhook_events: HashMap<String, WebhookEvent>,
    invoices: HashMap<String, Invoice>,
    payments: HashMap<String, Payment>,
}

impl Tables {
    fn write_subscription(&mut self, subscription: &Subscription) {
        if !subscription.external_id.is_empty() && !subscription.is_superseded() {
            self.subscriptions_by_external.insert(
                external_key(subscription.processor, &subscription.external_id),
                subscription.id,
            );
        }
        self.subscriptions
            .insert(subscription.id, subscription.clone());
    }
}

/// In-memory storage backend.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    event_locks: KeyLocks,
    subscription_locks: KeyLocks,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    // =========================================================================
    // Catalog Operations
    // =========================================================================

    async fn put_plan(&self, plan: &Plan) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .plans
            .values()
            .any(|p| p.slug == plan.slug && p.id != plan.id)
        {
            return Err(StoreError::Conflict(format!(
                "plan slug '{}' already exists",
                plan.slug
            )));
        }
        tables.plans.insert(plan.id, plan.clone());
        Ok(())
    }

    async fn get_plan_by_slug(&self, slug: &str) -> Result<Option<Plan>> {
        let tables = self.tables.read().await;
        Ok(tables.plans.values().find(|p| p.slug == slug).cloned())
    }

    async fn put_module(&self, module: &Module) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .modules
            .values()
            .any(|m| m.slug == module.slug && m.id != module.id)
        {
            return Err(StoreError::Conflict(format!(
                "module slug '{}' already exists",
                module.slug
            )));
        }
        tables.modules.insert(module.id, module.clone());
        Ok(())
    }

    async fn get_module_by_slug(&self, slug: &str) -> Result<Option<Module>> {
        let tables = self.tables.read().await;
        Ok(tables.modules.values().find(|m| m.slug == slug).cloned())
    }

    async fn put_feature(&self, feature: &Feature) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.modules.contains_key(&feature.module_id) {
            return Err(StoreError::NotFound {
                entity: "module",
                id: feature.module_id.to_string(),
            });
        }
        if tables.features.values().any(|f| {
            f.module_id == feature.module_id && f.slug == feature.slug && f.id != feature.id
        }) {
            return Err(StoreError::Conflict(format!(
                "feature slug '{}' already exists in module {}",
                feature.slug, feature.module_id
            )));
        }
        tables.features.insert(feature.id, feature.clone());
        Ok(())
    }

    async fn put_plan_feature(&self, plan_feature: &PlanFeature) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.plans.contains_key(&plan_feature.plan_id) {
            return Err(StoreError::NotFound {
                entity: "plan",
                id: plan_feature.plan_id.to_string(),
            });
        }
        if !tables.features.contains_key(&plan_feature.feature_id) {
            return Err(StoreError::NotFound {
                entity: "feature",
                id: plan_feature.feature_id.to_string(),
            });
        }
        tables.plan_features.insert(
            (plan_feature.plan_id, plan_feature.feature_id),
            plan_feature.clone(),
        );
        Ok(())
    }

    async fn load_catalog(&self) -> Result<Catalog> {
        let tables = self.tables.read().await;
        Ok(Catalog::new(
            tables.plans.values().cloned().collect(),
            tables.modules.values().cloned().collect(),
            tables.features.values().cloned().collect(),
            tables.plan_features.values().cloned().collect(),
        )?)
    }

    // =========================================================================
    // Customer Operations
    // =========================================================================

    async fn get_customer(&self, subscriber: &SubscriberContext) -> Result<Option<Customer>> {
        let tables = self.tables.read().await;
        Ok(tables.customers.get(&subscriber.key()).cloned())
    }

    async fn put_customer(&self, customer: &Customer) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .customers
            .insert(customer.subscriber.key(), customer.clone());
        Ok(())
    }

    async fn ensure_customer(&self, template: Customer) -> Result<Customer> {
        let mut tables = self.tables.write().await;
        let customer = tables
            .customers
            .entry(template.subscriber.key())
            .or_insert(template);
        Ok(customer.clone())
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    async fn put_subscriptions(&self, subscriptions: &[Subscription]) -> Result<()> {
        let mut tables = self.tables.write().await;
        for subscription in subscriptions {
            tables.write_subscription(subscription);
        }
        Ok(())
    }

    async fn get_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>> {
        let tables = self.tables.read().await;
        Ok(tables.subscriptions.get(id).cloned())
    }

    async fn find_subscription_by_external_id(
        &self,
        processor: Processor,
        external_id: &str,
    ) -> Result<Option<Subscription>> {
        let tables = self.tables.read().await;
        Ok(tables
            .subscriptions_by_external
            .get(&external_key(processor, external_id))
            .and_then(|id| tables.subscriptions.get(id))
            .cloned())
    }

    async fn lock_subscription(
        &self,
        processor: Processor,
        key: &str,
    ) -> Result<SubscriptionLease> {
        Ok(self
            .subscription_locks
            .acquire(&external_key(processor, key))
            .await
            .into())
    }

    async fn list_subscriptions(
        &self,
        subscriber: &SubscriberContext,
    ) -> Result<Vec<Subscription>> {
        let tables = self.tables.read().await;
        let mut subscriptions: Vec<_> = tables
            .subscriptions
            .values()
            .filter(|s| s.subscriber == *subscriber)
            .cloned()
            .collect();
        subscriptions.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(subscriptions)
    }

    async fn list_live_subscriptions(&self) -> Result<Vec<Subscription>> {
        let tables = self.tables.read().await;
        let mut subscriptions: Vec<_> = tables
            .subscriptions
            .values()
            .filter(|s| s.is_active())
            .cloned()
            .collect();
        subscriptions.sort_by_key(|s| s.id);
        Ok(subscriptions)
    }

    async fn list_all_subscriptions(&self) -> Result<Vec<Subscription>> {
        let tables = self.tables.read().await;
        let mut subscriptions: Vec<_> = tables.subscriptions.values().cloned().collect();
        subscriptions.sort_by_key(|s| s.id);
        Ok(subscriptions)
    }

    // =========================================================================
    // Usage Operations
    // =========================================================================

    async fn increment_usage(
        &self,
        key: &UsageKey,
        period_end: DateTime<Utc>,
        delta: u64,
    ) -> Result<UsageRecord> {
        let mut tables = self.tables.write().await;
        let record = tables
            .usage
            .entry(key.storage_key())
            .or_insert_with(|| UsageRecord::new(*key, period_end));
        record.increment(delta);
        Ok(record.clone())
    }

    async fn get_usage(&self, key: &UsageKey) -> Result<Option<UsageRecord>> {
        let tables = self.tables.read().await;
        Ok(tables.usage.get(&key.storage_key()).cloned())
    }

    async fn list_usage_since(&self, since: DateTime<Utc>) -> Result<Vec<UsageRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .usage
            .values()
            .filter(|r| r.key.period_start >= since)
            .cloned()
            .collect())
    }

    // =========================================================================
    // Webhook Operations
    // =========================================================================

    async fn lock_webhook_event(&self, key: &WebhookKey) -> Result<EventLease> {
        Ok(self.event_locks.acquire(&key.storage_key()).await.into())
    }

    async fn get_webhook_event(&self, key: &WebhookKey) -> Result<Option<WebhookEvent>> {
        let tables = self.tables.read().await;
        Ok(tables.webhook_events.get(&key.storage_key()).cloned())
    }

    async fn put_webhook_event(&self, event: &WebhookEvent) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables
            .webhook_events
            .insert(event.key.storage_key(), event.clone());
        Ok(())
    }

    async fn commit_webhook(&self, event: &WebhookEvent, changes: &WebhookChanges) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(subscription) = &changes.subscription {
            tables.write_subscription(subscription);
        }
        if let Some(invoice) = &changes.invoice {
            tables.invoices.insert(
                external_key(invoice.processor, &invoice.external_id),
                invoice.clone(),
            );
        }
        if let Some(payment) = &changes.payment {
            tables.payments.insert(
                external_key(payment.processor, &payment.external_id),
                payment.clone(),
            );
        }
        tables
            .webhook_events
            .insert(event.key.storage_key(), event.clone());
        Ok(())
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    async fn get_invoice_by_external_id(
        &self,
        processor: Processor,
        external_id: &str,
    ) -> Result<Option<Invoice>> {
        let tables = self.tables.read().await;
        Ok(tables
            .invoices
            .get(&external_key(processor, external_id))
            .cloned())
    }

    async fn get_payment_by_external_id(
        &self,
        processor: Processor,
        external_id: &str,
    ) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .get(&external_key(processor, external_id))
            .cloned())
    }
}
