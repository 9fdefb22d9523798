//! Core types and rules for plangate.
//!
//! This crate provides the foundational types used throughout plangate:
//!
//! - **Identifiers**: `PlanId`, `FeatureId`, `SubscriptionId`, ...
//! - **Catalog**: `Plan`, `Module`, `Feature`, `PlanFeature`, and the `Catalog` snapshot
//! - **Subscriptions**: `Subscription`, `SubscriptionStatus`, `Customer`, `Processor`
//! - **Subscribers**: `SubscriberContext` (user or tenant)
//! - **Usage**: `UsageKey`, `UsageRecord`
//! - **Events**: `NormalizedEvent` and the `WebhookEvent` ledger row
//! - **Ledger**: `Invoice`, `Payment`
//! - **Entitlements**: `has_feature_access`, `remaining_quota`
//! - **Analytics**: recurring revenue, churn, trial conversion and feature usage
//!
//! # Money
//!
//! Prices and amounts are `i64` minor units (cents) with an ISO currency code.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod analytics;
pub mod catalog;
pub mod entitlement;
pub mod error;
pub mod events;
pub mod ids;
pub mod ledger;
pub mod proration;
pub mod subscriber;
pub mod subscription;
pub mod usage;

pub use analytics::{FeatureUsage, Rate};
pub use catalog::{
    BillingPeriod, Catalog, Feature, FeatureType, Module, Plan, PlanFeature, Quota,
    DEFAULT_CURRENCY,
};
pub use entitlement::{has_feature_access, remaining_quota, Remaining};
pub use error::{BillingError, Result};
pub use events::{
    EventPayload, InvoiceNotice, NormalizedEvent, PaymentNotice, SubscriptionDeletion,
    SubscriptionSnapshot, WebhookEvent, WebhookKey,
};
pub use ids::{FeatureId, IdError, InvoiceId, ModuleId, PaymentId, PlanId, SubscriptionId};
pub use ledger::{Invoice, InvoiceStatus, Payment, PaymentStatus};
pub use proration::calculate_proration;
pub use subscriber::{SubscriberContext, SubscriberKind};
pub use subscription::{validate_period, Customer, Processor, Subscription, SubscriptionStatus};
pub use usage::{UsageKey, UsageRecord};
