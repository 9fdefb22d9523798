//! Per-period usage accumulators for quota features.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{FeatureId, SubscriptionId};
use crate::subscription::Subscription;

/// Identifies one usage accumulator: a subscription's use of a feature within the
/// billing period starting at `period_start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UsageKey {
    /// The consuming subscription.
    pub subscription_id: SubscriptionId,
    /// The metered feature.
    pub feature_id: FeatureId,
    /// Start of the billing period.
    pub period_start: DateTime<Utc>,
}

impl UsageKey {
    /// Key for the subscription's current billing period.
    #[must_use]
    pub const fn current(subscription: &Subscription, feature_id: FeatureId) -> Self {
        Self {
            subscription_id: subscription.id,
            feature_id,
            period_start: subscription.current_period_start,
        }
    }

    /// Stable string form, used for storage keys and lock names.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.subscription_id,
            self.feature_id,
            self.period_start.timestamp_micros()
        )
    }
}

/// Accumulated usage within one billing period.
///
/// A new period start produces a new key, so records of past periods are retained
/// unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Accumulator key.
    pub key: UsageKey,
    /// Units consumed so far; only ever increases.
    pub usage_count: u64,
    /// End of the billing period.
    pub period_end: DateTime<Utc>,
    /// When the first unit was recorded.
    pub created_at: DateTime<Utc>,
    /// When the last unit was recorded.
    pub updated_at: DateTime<Utc>,
}

impl UsageRecord {
    /// An empty accumulator.
    #[must_use]
    pub fn new(key: UsageKey, period_end: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            key,
            usage_count: 0,
            period_end,
            created_at: now,
            updated_at: now,
        }
    }

    /// Add `delta` units, saturating at `u64::MAX`.
    pub fn increment(&mut self, delta: u64) {
        self.usage_count = self.usage_count.saturating_add(delta);
        self.updated_at = Utc::now();
    }
}
