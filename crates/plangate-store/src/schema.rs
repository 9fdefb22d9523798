//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Plans, keyed by `plan_id`.
    pub const PLANS: &str = "plans";

    /// Index: plan id by slug. Enforces slug uniqueness.
    pub const PLANS_BY_SLUG: &str = "plans_by_slug";

    /// Modules, keyed by `module_id`.
    pub const MODULES: &str = "modules";

    /// Index: module id by slug.
    pub const MODULES_BY_SLUG: &str = "modules_by_slug";

    /// Features, keyed by `feature_id`.
    pub const FEATURES: &str = "features";

    /// Index: feature id by `module_id || slug`.
    pub const FEATURES_BY_SLUG: &str = "features_by_slug";

    /// Plan-feature associations, keyed by `plan_id || feature_id`.
    pub const PLAN_FEATURES: &str = "plan_features";

    /// Customer billing profiles, keyed by subscriber reference.
    pub const CUSTOMERS: &str = "customers";

    /// Subscriptions, keyed by `subscription_id` (ULID).
    pub const SUBSCRIPTIONS: &str = "subscriptions";

    /// Index: live subscription id by `processor:external_id`.
    pub const SUBSCRIPTIONS_BY_EXTERNAL: &str = "subscriptions_by_external";

    /// Index: subscriptions by subscriber, keyed by `subscriber || 0x00 || subscription_id`.
    /// Value is empty (index only).
    pub const SUBSCRIPTIONS_BY_SUBSCRIBER: &str = "subscriptions_by_subscriber";

    /// Usage accumulators, keyed by `subscription:feature:period_start`.
    pub const USAGE_RECORDS: &str = "usage_records";

    /// Webhook dedup ledger, keyed by `processor:event_id`.
    pub const WEBHOOK_EVENTS: &str = "webhook_events";

    /// Invoices, keyed by `processor:external_id`.
    pub const INVOICES: &str = "invoices";

    /// Payments, keyed by `processor:external_id`.
    pub const PAYMENTS: &str = "payments";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::PLANS,
        cf::PLANS_BY_SLUG,
        cf::MODULES,
        cf::MODULES_BY_SLUG,
        cf::FEATURES,
        cf::FEATURES_BY_SLUG,
        cf::PLAN_FEATURES,
        cf::CUSTOMERS,
        cf::SUBSCRIPTIONS,
        cf::SUBSCRIPTIONS_BY_EXTERNAL,
        cf::SUBSCRIPTIONS_BY_SUBSCRIBER,
        cf::USAGE_RECORDS,
        cf::WEBHOOK_EVENTS,
        cf::INVOICES,
        cf::PAYMENTS,
    ]
}
