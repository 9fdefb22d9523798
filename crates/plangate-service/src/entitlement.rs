//! Subscriber-level entitlement queries.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use plangate_core::{
    Catalog, PlanId, Processor, Remaining, SubscriberContext, Subscription, SubscriptionId,
    SubscriptionStatus,
};
use plangate_store::{Store, StoreError};

use crate::usage::UsageTracker;

/// Result of checking one feature for one subscriber.
#[derive(Debug, Clone, Serialize)]
pub struct FeatureCheck {
    /// The feature slug as requested.
    pub feature: String,
    /// Whether the subscriber may use the feature now.
    pub entitled: bool,
    /// Quota left in the current period.
    pub remaining: Remaining,
}

/// Summary of a subscriber's current subscription.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionSummary {
    /// Subscription id.
    pub subscription_id: SubscriptionId,
    /// Plan id.
    pub plan_id: PlanId,
    /// Plan slug; empty if the plan left the catalog.
    pub plan_slug: String,
    /// Plan display name.
    pub plan_name: String,
    /// Current status.
    pub status: SubscriptionStatus,
    /// Whether the subscription grants entitlements.
    pub is_active: bool,
    /// Whether the subscription is inside its free trial.
    pub is_trial: bool,
    /// Start of the current period.
    pub current_period_start: DateTime<Utc>,
    /// End of the current period.
    pub current_period_end: DateTime<Utc>,
    /// End of the free trial.
    pub trial_end: Option<DateTime<Utc>>,
    /// Cancellation instant.
    pub canceled_at: Option<DateTime<Utc>>,
    /// Slugs of the features the plan includes.
    pub features: Vec<String>,
    /// Consecutive failed payments.
    pub failed_payment_count: u32,
    /// Billing processor.
    pub processor: Processor,
}

/// Answers "may this subscriber use this feature, and how much is left".
///
/// Every lookup fails closed: a missing subscription, an inactive status or an
/// unknown feature all mean no access.
#[derive(Clone)]
pub struct EntitlementService {
    store: Arc<dyn Store>,
    usage: UsageTracker,
}

impl EntitlementService {
    /// Create a service over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, usage: UsageTracker) -> Self {
        Self { store, usage }
    }

    /// The subscriber's newest trialing or active subscription.
    pub async fn active_subscription(
        &self,
        subscriber: &SubscriberContext,
    ) -> Result<Option<Subscription>, StoreError> {
        let subscriptions = self.store.list_subscriptions(subscriber).await?;
        Ok(subscriptions.into_iter().find(Subscription::is_active))
    }

    /// The subscriber's newest subscription that was not replaced by a plan change,
    /// whatever its status.
    pub async fn current_subscription(
        &self,
        subscriber: &SubscriberContext,
    ) -> Result<Option<Subscription>, StoreError> {
        let subscriptions = self.store.list_subscriptions(subscriber).await?;
        Ok(subscriptions.into_iter().find(|s| !s.is_superseded()))
    }

    /// Whether the subscriber may use `feature_slug`.
    pub async fn has_feature_access(
        &self,
        subscriber: &SubscriberContext,
        feature_slug: &str,
    ) -> Result<bool, StoreError> {
        let subscription = self.active_subscription(subscriber).await?;
        let catalog = self.store.load_catalog().await?;
        Ok(plangate_core::has_feature_access(
            &catalog,
            subscription.as_ref(),
            feature_slug,
        ))
    }

    /// Quota of `feature_slug` left in the subscriber's current period.
    pub async fn remaining_quota(
        &self,
        subscriber: &SubscriberContext,
        feature_slug: &str,
    ) -> Result<Remaining, StoreError> {
        let subscription = self.active_subscription(subscriber).await?;
        self.remaining_for(subscription.as_ref(), feature_slug).await
    }

    /// Quota of `feature_slug` left on a known subscription.
    pub async fn remaining_for(
        &self,
        subscription: Option<&Subscription>,
        feature_slug: &str,
    ) -> Result<Remaining, StoreError> {
        if !subscription.is_some_and(Subscription::is_active) {
            return Ok(Remaining::Limited(0));
        }
        let catalog = self.store.load_catalog().await?;
        self.remaining_in(&catalog, subscription, feature_slug).await
    }

    async fn remaining_in(
        &self,
        catalog: &Catalog,
        subscription: Option<&Subscription>,
        feature_slug: &str,
    ) -> Result<Remaining, StoreError> {
        let Some(subscription) = subscription.filter(|s| s.is_active()) else {
            return Ok(Remaining::Limited(0));
        };
        let used = self
            .usage
            .current_usage(catalog, subscription, feature_slug)
            .await?;
        Ok(plangate_core::remaining_quota(
            catalog,
            Some(subscription),
            feature_slug,
            used,
        ))
    }

    /// Access and remaining quota in one call.
    pub async fn check(
        &self,
        subscriber: &SubscriberContext,
        feature_slug: &str,
    ) -> Result<FeatureCheck, StoreError> {
        let subscription = self.active_subscription(subscriber).await?;
        let check = self
            .check_subscription(subscription.as_ref(), feature_slug)
            .await?;

        tracing::debug!(
            subscriber = %subscriber,
            feature = %feature_slug,
            entitled = check.entitled,
            "Feature checked"
        );
        Ok(check)
    }

    /// Access and remaining quota on an already loaded subscription.
    ///
    /// Reads the catalog once for both answers.
    pub async fn check_subscription(
        &self,
        subscription: Option<&Subscription>,
        feature_slug: &str,
    ) -> Result<FeatureCheck, StoreError> {
        let catalog = self.store.load_catalog().await?;
        let entitled = plangate_core::has_feature_access(&catalog, subscription, feature_slug);
        let remaining = self
            .remaining_in(&catalog, subscription, feature_slug)
            .await?;
        Ok(FeatureCheck {
            feature: feature_slug.to_string(),
            entitled,
            remaining,
        })
    }

    /// Summary of the subscriber's current subscription, if they ever subscribed.
    pub async fn summary(
        &self,
        subscriber: &SubscriberContext,
    ) -> Result<Option<SubscriptionSummary>, StoreError> {
        let Some(subscription) = self.current_subscription(subscriber).await? else {
            return Ok(None);
        };
        let catalog = self.store.load_catalog().await?;
        let plan = catalog.plan(&subscription.plan_id);

        Ok(Some(SubscriptionSummary {
            subscription_id: subscription.id,
            plan_id: subscription.plan_id,
            plan_slug: plan.map(|p| p.slug.clone()).unwrap_or_default(),
            plan_name: plan.map(|p| p.name.clone()).unwrap_or_default(),
            status: subscription.status,
            is_active: subscription.is_active(),
            is_trial: subscription.is_trial(Utc::now()),
            current_period_start: subscription.current_period_start,
            current_period_end: subscription.current_period_end,
            trial_end: subscription.trial_end,
            canceled_at: subscription.canceled_at,
            features: catalog.included_feature_slugs(&subscription.plan_id),
            failed_payment_count: subscription.failed_payment_count,
            processor: subscription.processor,
        }))
    }
}
