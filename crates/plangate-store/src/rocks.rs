//! `RocksDB` storage implementation.
//!
//! This module provides the `RocksStore` implementation of the `Store` trait.
//! Read-modify-write operations take a per-key lock first and then run a synchronous
//! database section; compound writes go through a single `WriteBatch`.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, SnapshotWithThreadMode, WriteBatch,
};

use plangate_core::{
    Catalog, Customer, Feature, Invoice, Module, Payment, Plan, PlanFeature, PlanId, Processor,
    SubscriberContext, Subscription, SubscriptionId, UsageKey, UsageRecord, WebhookEvent,
    WebhookKey,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::locks::{EventLease, KeyLocks, SubscriptionLease};
use crate::schema::{all_column_families, cf};
use crate::{external_key, Store, WebhookChanges};

/// Lock name serializing catalog writes (slug uniqueness checks).
const CATALOG_LOCK: &str = "catalog";

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    row_locks: KeyLocks,
    event_locks: KeyLocks,
    subscription_locks: KeyLocks,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(db_error)?;

        Ok(Self {
            db: Arc::new(db),
            row_locks: KeyLocks::new(),
            event_locks: KeyLocks::new(),
            subscription_locks: KeyLocks::new(),
        })
    }

    /// Get a column family handle.
    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    /// Serialize a value using CBOR.
    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    /// Deserialize a value from CBOR.
    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(db_error)?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn get_raw(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        self.db.get_cf(&cf, key).map_err(db_error)
    }

    fn put<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        let value = Self::serialize(value)?;
        self.db.put_cf(&cf, key, value).map_err(db_error)
    }

    /// Read every value of a column family.
    fn scan<T: serde::de::DeserializeOwned>(&self, cf_name: &str) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .iterator_cf(&cf, IteratorMode::Start)
            .map(|item| {
                let (_, value) = item.map_err(db_error)?;
                Self::deserialize(&value)
            })
            .collect()
    }

    /// Read every value of a column family as of `snapshot`.
    fn scan_at<T: serde::de::DeserializeOwned>(
        &self,
        snapshot: &SnapshotWithThreadMode<'_, DBWithThreadMode<MultiThreaded>>,
        cf_name: &str,
    ) -> Result<Vec<T>> {
        let cf = self.cf(cf_name)?;
        snapshot
            .iterator_cf(&cf, IteratorMode::Start)
            .map(|item| {
                let (_, value) = item.map_err(db_error)?;
                Self::deserialize(&value)
            })
            .collect()
    }

    // =========================================================================
    // Synchronous sections
    // =========================================================================

    fn put_plan_sync(&self, plan: &Plan) -> Result<()> {
        let slug_key = keys::string_key(&plan.slug);
        if let Some(owner) = self.get_raw(cf::PLANS_BY_SLUG, &slug_key)? {
            if owner.as_slice() != plan.id.as_bytes() {
                return Err(StoreError::Conflict(format!(
                    "plan slug '{}' already exists",
                    plan.slug
                )));
            }
        }
        let previous: Option<Plan> = self.get(cf::PLANS, &keys::plan_key(&plan.id))?;

        let cf_plans = self.cf(cf::PLANS)?;
        let cf_slugs = self.cf(cf::PLANS_BY_SLUG)?;
        let mut batch = WriteBatch::default();
        if let Some(previous) = previous.filter(|p| p.slug != plan.slug) {
            batch.delete_cf(&cf_slugs, keys::string_key(&previous.slug));
        }
        batch.put_cf(&cf_plans, keys::plan_key(&plan.id), Self::serialize(plan)?);
        batch.put_cf(&cf_slugs, &slug_key, plan.id.as_bytes());
        self.db.write(batch).map_err(db_error)
    }

    fn put_module_sync(&self, module: &Module) -> Result<()> {
        let slug_key = keys::string_key(&module.slug);
        if let Some(owner) = self.get_raw(cf::MODULES_BY_SLUG, &slug_key)? {
            if owner.as_slice() != module.id.as_bytes() {
                return Err(StoreError::Conflict(format!(
                    "module slug '{}' already exists",
                    module.slug
                )));
            }
        }
        let previous: Option<Module> = self.get(cf::MODULES, &keys::module_key(&module.id))?;

        let cf_modules = self.cf(cf::MODULES)?;
        let cf_slugs = self.cf(cf::MODULES_BY_SLUG)?;
        let mut batch = WriteBatch::default();
        if let Some(previous) = previous.filter(|m| m.slug != module.slug) {
            batch.delete_cf(&cf_slugs, keys::string_key(&previous.slug));
        }
        batch.put_cf(&cf_modules, keys::module_key(&module.id), Self::serialize(module)?);
        batch.put_cf(&cf_slugs, &slug_key, module.id.as_bytes());
        self.db.write(batch).map_err(db_error)
    }

    fn put_feature_sync(&self, feature: &Feature) -> Result<()> {
        if self
            .get_raw(cf::MODULES, &keys::module_key(&feature.module_id))?
            .is_none()
        {
            return Err(StoreError::NotFound {
                entity: "module",
                id: feature.module_id.to_string(),
            });
        }
        let slug_key = keys::feature_slug_key(&feature.module_id, &feature.slug);
        if let Some(owner) = self.get_raw(cf::FEATURES_BY_SLUG, &slug_key)? {
            if owner.as_slice() != feature.id.as_bytes() {
                return Err(StoreError::Conflict(format!(
                    "feature slug '{}' already exists in module {}",
                    feature.slug, feature.module_id
                )));
            }
        }
        let previous: Option<Feature> = self.get(cf::FEATURES, &keys::feature_key(&feature.id))?;

        let cf_features = self.cf(cf::FEATURES)?;
        let cf_slugs = self.cf(cf::FEATURES_BY_SLUG)?;
        let mut batch = WriteBatch::default();
        if let Some(previous) =
            previous.filter(|f| f.slug != feature.slug || f.module_id != feature.module_id)
        {
            batch.delete_cf(
                &cf_slugs,
                keys::feature_slug_key(&previous.module_id, &previous.slug),
            );
        }
        batch.put_cf(&cf_features, keys::feature_key(&feature.id), Self::serialize(feature)?);
        batch.put_cf(&cf_slugs, &slug_key, feature.id.as_bytes());
        self.db.write(batch).map_err(db_error)
    }

    fn put_plan_feature_sync(&self, plan_feature: &PlanFeature) -> Result<()> {
        if self
            .get_raw(cf::PLANS, &keys::plan_key(&plan_feature.plan_id))?
            .is_none()
        {
            return Err(StoreError::NotFound {
                entity: "plan",
                id: plan_feature.plan_id.to_string(),
            });
        }
        if self
            .get_raw(cf::FEATURES, &keys::feature_key(&plan_feature.feature_id))?
            .is_none()
        {
            return Err(StoreError::NotFound {
                entity: "feature",
                id: plan_feature.feature_id.to_string(),
            });
        }
        self.put(
            cf::PLAN_FEATURES,
            &keys::plan_feature_key(&plan_feature.plan_id, &plan_feature.feature_id),
            plan_feature,
        )
    }

    fn write_subscriptions(
        &self,
        batch: &mut WriteBatch,
        subscriptions: &[Subscription],
    ) -> Result<()> {
        let cf_subs = self.cf(cf::SUBSCRIPTIONS)?;
        let cf_external = self.cf(cf::SUBSCRIPTIONS_BY_EXTERNAL)?;
        let cf_by_subscriber = self.cf(cf::SUBSCRIPTIONS_BY_SUBSCRIBER)?;

        for subscription in subscriptions {
            batch.put_cf(
                &cf_subs,
                keys::subscription_key(&subscription.id),
                Self::serialize(subscription)?,
            );
            batch.put_cf(
                &cf_by_subscriber,
                keys::subscriber_subscription_key(&subscription.subscriber, &subscription.id),
                b"",
            );
            if !subscription.external_id.is_empty() && !subscription.is_superseded() {
                batch.put_cf(
                    &cf_external,
                    keys::string_key(&external_key(
                        subscription.processor,
                        &subscription.external_id,
                    )),
                    subscription.id.to_bytes(),
                );
            }
        }
        Ok(())
    }

    fn list_subscriptions_sync(&self, subscriber: &SubscriberContext) -> Result<Vec<Subscription>> {
        let cf_by_subscriber = self.cf(cf::SUBSCRIPTIONS_BY_SUBSCRIBER)?;
        let prefix = keys::subscriber_subscriptions_prefix(subscriber);

        let mut ids = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf_by_subscriber, IteratorMode::From(&prefix, Direction::Forward))
        {
            let (key, _) = item.map_err(db_error)?;
            if !key.starts_with(&prefix) {
                break;
            }
            if let Some(id) = keys::extract_subscription_id(&key) {
                ids.push(id);
            }
        }

        // ULID keys iterate oldest first
        ids.reverse();
        let mut subscriptions = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(subscription) = self.get(cf::SUBSCRIPTIONS, &keys::subscription_key(&id))? {
                subscriptions.push(subscription);
            }
        }
        Ok(subscriptions)
    }

    fn increment_usage_sync(
        &self,
        key: &UsageKey,
        period_end: DateTime<Utc>,
        delta: u64,
    ) -> Result<UsageRecord> {
        let storage_key = keys::string_key(&key.storage_key());
        let mut record = self
            .get(cf::USAGE_RECORDS, &storage_key)?
            .unwrap_or_else(|| UsageRecord::new(*key, period_end));
        record.increment(delta);
        self.put(cf::USAGE_RECORDS, &storage_key, &record)?;
        Ok(record)
    }

    fn commit_webhook_sync(&self, event: &WebhookEvent, changes: &WebhookChanges) -> Result<()> {
        let mut batch = WriteBatch::default();

        if let Some(subscription) = &changes.subscription {
            self.write_subscriptions(&mut batch, std::slice::from_ref(subscription))?;
        }
        if let Some(invoice) = &changes.invoice {
            let cf_invoices = self.cf(cf::INVOICES)?;
            batch.put_cf(
                &cf_invoices,
                keys::string_key(&external_key(invoice.processor, &invoice.external_id)),
                Self::serialize(invoice)?,
            );
        }
        if let Some(payment) = &changes.payment {
            let cf_payments = self.cf(cf::PAYMENTS)?;
            batch.put_cf(
                &cf_payments,
                keys::string_key(&external_key(payment.processor, &payment.external_id)),
                Self::serialize(payment)?,
            );
        }

        let cf_events = self.cf(cf::WEBHOOK_EVENTS)?;
        batch.put_cf(
            &cf_events,
            keys::string_key(&event.key.storage_key()),
            Self::serialize(event)?,
        );

        self.db.write(batch).map_err(db_error)
    }
}

#[async_trait]
impl Store for RocksStore {
    // =========================================================================
    // Catalog Operations
    // =========================================================================

    async fn put_plan(&self, plan: &Plan) -> Result<()> {
        let _guard = self.row_locks.acquire(CATALOG_LOCK).await;
        self.put_plan_sync(plan)
    }

    async fn get_plan_by_slug(&self, slug: &str) -> Result<Option<Plan>> {
        let Some(id) = self.get_raw(cf::PLANS_BY_SLUG, &keys::string_key(slug))? else {
            return Ok(None);
        };
        let id: [u8; 16] = id
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Database(format!("corrupt slug index for plan '{slug}'")))?;
        let plan_id = PlanId::from_uuid(uuid::Uuid::from_bytes(id));
        self.get(cf::PLANS, &keys::plan_key(&plan_id))
    }

    async fn put_module(&self, module: &Module) -> Result<()> {
        let _guard = self.row_locks.acquire(CATALOG_LOCK).await;
        self.put_module_sync(module)
    }

    async fn get_module_by_slug(&self, slug: &str) -> Result<Option<Module>> {
        let modules: Vec<Module> = self.scan(cf::MODULES)?;
        Ok(modules.into_iter().find(|m| m.slug == slug))
    }

    async fn put_feature(&self, feature: &Feature) -> Result<()> {
        let _guard = self.row_locks.acquire(CATALOG_LOCK).await;
        self.put_feature_sync(feature)
    }

    async fn put_plan_feature(&self, plan_feature: &PlanFeature) -> Result<()> {
        let _guard = self.row_locks.acquire(CATALOG_LOCK).await;
        self.put_plan_feature_sync(plan_feature)
    }

    async fn load_catalog(&self) -> Result<Catalog> {
        // One snapshot for all four tables; writers are never waited on.
        let snapshot = self.db.snapshot();
        Ok(Catalog::new(
            self.scan_at(&snapshot, cf::PLANS)?,
            self.scan_at(&snapshot, cf::MODULES)?,
            self.scan_at(&snapshot, cf::FEATURES)?,
            self.scan_at(&snapshot, cf::PLAN_FEATURES)?,
        )?)
    }

    // =========================================================================
    // Customer Operations
    // =========================================================================

    async fn get_customer(&self, subscriber: &SubscriberContext) -> Result<Option<Customer>> {
        self.get(cf::CUSTOMERS, &keys::string_key(&subscriber.key()))
    }

    async fn put_customer(&self, customer: &Customer) -> Result<()> {
        let key = customer.subscriber.key();
        let _guard = self.row_locks.acquire(&format!("customer:{key}")).await;
        self.put(cf::CUSTOMERS, &keys::string_key(&key), customer)
    }

    async fn ensure_customer(&self, template: Customer) -> Result<Customer> {
        let key = template.subscriber.key();
        let _guard = self.row_locks.acquire(&format!("customer:{key}")).await;
        if let Some(existing) = self.get(cf::CUSTOMERS, &keys::string_key(&key))? {
            return Ok(existing);
        }
        self.put(cf::CUSTOMERS, &keys::string_key(&key), &template)?;
        tracing::debug!(subscriber = %key, "Customer profile created");
        Ok(template)
    }

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    async fn put_subscriptions(&self, subscriptions: &[Subscription]) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.write_subscriptions(&mut batch, subscriptions)?;
        self.db.write(batch).map_err(db_error)
    }

    async fn get_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>> {
        self.get(cf::SUBSCRIPTIONS, &keys::subscription_key(id))
    }

    async fn find_subscription_by_external_id(
        &self,
        processor: Processor,
        external_id: &str,
    ) -> Result<Option<Subscription>> {
        let index_key = keys::string_key(&external_key(processor, external_id));
        let Some(id) = self.get_raw(cf::SUBSCRIPTIONS_BY_EXTERNAL, &index_key)? else {
            return Ok(None);
        };
        let id = keys::extract_subscription_id(&id).ok_or_else(|| {
            StoreError::Database(format!("corrupt external index for {external_id}"))
        })?;
        self.get(cf::SUBSCRIPTIONS, &keys::subscription_key(&id))
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
        self.list_subscriptions_sync(subscriber)
    }

    async fn list_live_subscriptions(&self) -> Result<Vec<Subscription>> {
        let subscriptions: Vec<Subscription> = self.scan(cf::SUBSCRIPTIONS)?;
        Ok(subscriptions.into_iter().filter(Subscription::is_active).collect())
    }

    async fn list_all_subscriptions(&self) -> Result<Vec<Subscription>> {
        self.scan(cf::SUBSCRIPTIONS)
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
        let _guard = self
            .row_locks
            .acquire(&format!("usage:{}", key.storage_key()))
            .await;
        self.increment_usage_sync(key, period_end, delta)
    }

    async fn get_usage(&self, key: &UsageKey) -> Result<Option<UsageRecord>> {
        self.get(cf::USAGE_RECORDS, &keys::string_key(&key.storage_key()))
    }

    async fn list_usage_since(&self, since: DateTime<Utc>) -> Result<Vec<UsageRecord>> {
        let records: Vec<UsageRecord> = self.scan(cf::USAGE_RECORDS)?;
        Ok(records
            .into_iter()
            .filter(|r| r.key.period_start >= since)
            .collect())
    }

    // =========================================================================
    // Webhook Operations
    // =========================================================================

    async fn lock_webhook_event(&self, key: &WebhookKey) -> Result<EventLease> {
        Ok(self.event_locks.acquire(&key.storage_key()).await.into())
    }

    async fn get_webhook_event(&self, key: &WebhookKey) -> Result<Option<WebhookEvent>> {
        self.get(cf::WEBHOOK_EVENTS, &keys::string_key(&key.storage_key()))
    }

    async fn put_webhook_event(&self, event: &WebhookEvent) -> Result<()> {
        self.put(
            cf::WEBHOOK_EVENTS,
            &keys::string_key(&event.key.storage_key()),
            event,
        )
    }

    async fn commit_webhook(&self, event: &WebhookEvent, changes: &WebhookChanges) -> Result<()> {
        self.commit_webhook_sync(event, changes)
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    async fn get_invoice_by_external_id(
        &self,
        processor: Processor,
        external_id: &str,
    ) -> Result<Option<Invoice>> {
        self.get(
            cf::INVOICES,
            &keys::string_key(&external_key(processor, external_id)),
        )
    }

    async fn get_payment_by_external_id(
        &self,
        processor: Processor,
        external_id: &str,
    ) -> Result<Option<Payment>> {
        self.get(
            cf::PAYMENTS,
            &keys::string_key(&external_key(processor, external_id)),
        )
    }
}

fn db_error(e: rocksdb::Error) -> StoreError {
    StoreError::Database(e.to_string())
}
