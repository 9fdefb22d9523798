//! Storage layer for plangate.
//!
//! This crate provides durable storage for the plan catalog and for the runtime
//! subscription state that the webhook reconciler and usage tracker mutate.
//!
//! # Backends
//!
//! - [`MemoryStore`]: always available; used by tests and single-process development.
//! - `RocksStore`: `RocksDB` with one column family per table, behind the
//!   `rocksdb-backend` feature.
//!
//! # Consistency
//!
//! - [`Store::increment_usage`] is an atomic upsert-and-increment per usage key.
//! - [`Store::lock_webhook_event`] serializes processing per `(processor, event_id)`.
//! - [`Store::lock_subscription`] serializes read-modify-write of one subscription
//!   row, so effects of different events on the same row never overwrite each other.
//! - [`Store::commit_webhook`] writes an event's effects and its processed flag in one
//!   atomic write.
//!
//! # Example
//!
//! ```no_run
//! use plangate_core::{BillingPeriod, Plan};
//! use plangate_store::{MemoryStore, Store};
//!
//! # async fn example() -> plangate_store::Result<()> {
//! let store = MemoryStore::new();
//! store.put_plan(&Plan::new("pro", "Pro", 2999, BillingPeriod::Monthly)).await?;
//! let catalog = store.load_catalog().await?;
//! assert_eq!(catalog.active_plans().len(), 1);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod locks;
pub mod memory;

#[cfg(feature = "rocksdb-backend")]
pub mod keys;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
#[cfg(feature = "rocksdb-backend")]
pub mod schema;

pub use error::{Result, StoreError};
pub use locks::{EventLease, KeyLocks, SubscriptionLease};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use plangate_core::{
    Catalog, Customer, Feature, Invoice, Module, Payment, Plan, PlanFeature, Processor,
    SubscriberContext, Subscription, SubscriptionId, UsageKey, UsageRecord, WebhookEvent,
    WebhookKey,
};

/// Effects of one webhook event, committed together with its processed flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebhookChanges {
    /// Subscription row to overwrite.
    pub subscription: Option<Subscription>,
    /// Invoice row to upsert.
    pub invoice: Option<Invoice>,
    /// Payment row to upsert.
    pub payment: Option<Payment>,
}

impl WebhookChanges {
    /// No effects.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Whether there is nothing to write besides the ledger row.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.subscription.is_none() && self.invoice.is_none() && self.payment.is_none()
    }
}

/// The storage trait defining all database operations.
///
/// Async so that backends can hold per-key locks across awaits.
#[async_trait]
pub trait Store: Send + Sync {
    // =========================================================================
    // Catalog Operations
    // =========================================================================

    /// Insert or update a plan.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if another plan already uses the slug.
    async fn put_plan(&self, plan: &Plan) -> Result<()>;

    /// Get a plan by slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_plan_by_slug(&self, slug: &str) -> Result<Option<Plan>>;

    /// Insert or update a module.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if another module already uses the slug.
    async fn put_module(&self, module: &Module) -> Result<()>;

    /// Get a module by slug.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_module_by_slug(&self, slug: &str) -> Result<Option<Module>>;

    /// Insert or update a feature.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if another feature of the same module already
    /// uses the slug, or `StoreError::NotFound` if the module does not exist.
    async fn put_feature(&self, feature: &Feature) -> Result<()>;

    /// Insert or update the association of a plan with a feature.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the plan or feature does not exist.
    async fn put_plan_feature(&self, plan_feature: &PlanFeature) -> Result<()>;

    /// Take a consistent snapshot of the whole catalog.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails or the stored rows do not
    /// form a valid catalog.
    async fn load_catalog(&self) -> Result<Catalog>;

    // =========================================================================
    // Customer Operations
    // =========================================================================

    /// Get a subscriber's billing profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_customer(&self, subscriber: &SubscriberContext) -> Result<Option<Customer>>;

    /// Insert or update a billing profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_customer(&self, customer: &Customer) -> Result<()>;

    /// Return the subscriber's billing profile, creating `template` if none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn ensure_customer(&self, template: Customer) -> Result<Customer>;

    // =========================================================================
    // Subscription Operations
    // =========================================================================

    /// Insert or update subscriptions in one atomic write.
    ///
    /// The processor external-id index points at the last written row that has not
    /// been superseded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_subscriptions(&self, subscriptions: &[Subscription]) -> Result<()>;

    /// Get a subscription by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_subscription(&self, id: &SubscriptionId) -> Result<Option<Subscription>>;

    /// Find the live subscription carrying a processor's subscription id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn find_subscription_by_external_id(
        &self,
        processor: Processor,
        external_id: &str,
    ) -> Result<Option<Subscription>>;

    /// Acquire write access to the subscription known to `processor` as `key`.
    ///
    /// `key` is the processor's subscription id, or the local id for rows the
    /// processor has not named yet. Callers reload the row after acquiring.
    ///
    /// # Errors
    ///
    /// Returns an error if the lease cannot be acquired.
    async fn lock_subscription(
        &self,
        processor: Processor,
        key: &str,
    ) -> Result<SubscriptionLease>;

    /// List a subscriber's subscriptions, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_subscriptions(&self, subscriber: &SubscriberContext)
        -> Result<Vec<Subscription>>;

    /// List every subscription whose status is trialing or active.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_live_subscriptions(&self) -> Result<Vec<Subscription>>;

    /// List every subscription row, superseded and terminal ones included.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_all_subscriptions(&self) -> Result<Vec<Subscription>>;

    // =========================================================================
    // Usage Operations
    // =========================================================================

    /// Atomically create-or-increment the accumulator for `key`.
    ///
    /// `period_end` initializes a newly created record. Returns the updated record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn increment_usage(
        &self,
        key: &UsageKey,
        period_end: DateTime<Utc>,
        delta: u64,
    ) -> Result<UsageRecord>;

    /// Get the accumulator for `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_usage(&self, key: &UsageKey) -> Result<Option<UsageRecord>>;

    /// List the accumulators of every period starting at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn list_usage_since(&self, since: DateTime<Utc>) -> Result<Vec<UsageRecord>>;

    // =========================================================================
    // Webhook Operations
    // =========================================================================

    /// Acquire the processing lease for one event; waits while another task holds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the lease cannot be acquired.
    async fn lock_webhook_event(&self, key: &WebhookKey) -> Result<EventLease>;

    /// Get the ledger row of an event.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_webhook_event(&self, key: &WebhookKey) -> Result<Option<WebhookEvent>>;

    /// Insert or update the ledger row of an event.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn put_webhook_event(&self, event: &WebhookEvent) -> Result<()>;

    /// Write an event's effects and its ledger row in one atomic write.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; nothing is written then.
    async fn commit_webhook(&self, event: &WebhookEvent, changes: &WebhookChanges) -> Result<()>;

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Get an invoice by processor id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_invoice_by_external_id(
        &self,
        processor: Processor,
        external_id: &str,
    ) -> Result<Option<Invoice>>;

    /// Get a payment by processor id.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    async fn get_payment_by_external_id(
        &self,
        processor: Processor,
        external_id: &str,
    ) -> Result<Option<Payment>>;
}

/// Index key of a processor-side id.
#[must_use]
pub fn external_key(processor: Processor, external_id: &str) -> String {
    format!("{processor}:{external_id}")
}

/// The key [`Store::lock_subscription`] is taken on for `subscription`.
#[must_use]
pub fn subscription_lock_key(subscription: &Subscription) -> String {
    if subscription.external_id.is_empty() {
        subscription.id.to_string()
    } else {
        subscription.external_id.clone()
    }
}
