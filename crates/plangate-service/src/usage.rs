//! Usage metering for quota features.

use std::sync::Arc;

use plangate_core::{Catalog, Subscription, UsageKey, UsageRecord};
use plangate_store::{Store, StoreError};

/// Usage recording errors.
#[derive(Debug, thiserror::Error)]
pub enum UsageError {
    /// The subscription's plan does not include the feature.
    #[error("feature not included in plan: {feature}")]
    NotEntitled {
        /// The requested feature slug.
        feature: String,
    },

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Records and reads per-period usage accumulators.
#[derive(Clone)]
pub struct UsageTracker {
    store: Arc<dyn Store>,
}

impl UsageTracker {
    /// Create a tracker over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Add `delta` units of `feature_slug` to the subscription's current period.
    ///
    /// The increment is a single atomic upsert in the store, so concurrent callers
    /// never lose updates. Usage beyond the quota is still recorded.
    ///
    /// # Errors
    ///
    /// Returns `UsageError::NotEntitled` if the plan does not include the feature.
    pub async fn record_usage(
        &self,
        subscription: &Subscription,
        feature_slug: &str,
        delta: u64,
    ) -> Result<UsageRecord, UsageError> {
        let catalog = self.store.load_catalog().await?;
        let (feature, _) = catalog
            .included_feature(&subscription.plan_id, feature_slug)
            .ok_or_else(|| UsageError::NotEntitled {
                feature: feature_slug.to_string(),
            })?;

        let key = UsageKey::current(subscription, feature.id);
        let record = self
            .store
            .increment_usage(&key, subscription.current_period_end, delta)
            .await?;

        tracing::debug!(
            subscription_id = %subscription.id,
            feature = %feature_slug,
            delta,
            usage_count = record.usage_count,
            "Usage recorded"
        );
        Ok(record)
    }

    /// Units of `feature_slug` used in the subscription's current period; 0 if none.
    ///
    /// `catalog` resolves the slug; callers pass the one they already loaded.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub async fn current_usage(
        &self,
        catalog: &Catalog,
        subscription: &Subscription,
        feature_slug: &str,
    ) -> Result<u64, StoreError> {
        let Some(feature) = catalog.resolve_feature(&subscription.plan_id, feature_slug) else {
            return Ok(0);
        };
        let record = self
            .store
            .get_usage(&UsageKey::current(subscription, feature.id))
            .await?;
        Ok(record.map_or(0, |r| r.usage_count))
    }
}
