//! Subscription lifecycle: customer provisioning, subscribe, cancel, plan changes
//! and the expiry sweep.
//!
//! Processor calls go through the [`PaymentGateway`] of the subscription's processor;
//! the local row is written from the processor's answer so that later webhooks only
//! confirm what is already stored.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plangate_core::{
    calculate_proration, validate_period, BillingError, Customer, Plan, Processor,
    SubscriberContext, Subscription, SubscriptionId, SubscriptionSnapshot, SubscriptionStatus,
};
use plangate_store::{subscription_lock_key, Store, StoreError, SubscriptionLease};

use crate::gateway::{
    CustomerRequest, GatewayError, GatewayRegistry, PaymentGateway, SubscriptionRequest,
};

/// Lifecycle errors.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    /// No plan has the slug.
    #[error("unknown plan: {0}")]
    UnknownPlan(String),

    /// The plan is no longer offered.
    #[error("plan is not available: {0}")]
    InactivePlan(String),

    /// The subscriber has no subscription to act on.
    #[error("no active subscription")]
    NoSubscription,

    /// The subscriber already has an active subscription.
    #[error("already subscribed")]
    AlreadySubscribed,

    /// The requested plan is the current one.
    #[error("already on plan {0}")]
    SamePlan(String),

    /// The processor is not configured.
    #[error("payment processor not configured: {0}")]
    ProcessorUnavailable(Processor),

    /// The processor rejected or failed the call.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A domain rule was violated.
    #[error(transparent)]
    Billing(#[from] BillingError),

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Billing details supplied when a subscriber is provisioned.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CustomerDetails {
    /// Address invoices are sent to.
    #[serde(default)]
    pub billing_email: Option<String>,
    /// Company name on invoices.
    #[serde(default)]
    pub company_name: Option<String>,
    /// Tax registration number.
    #[serde(default)]
    pub tax_id: Option<String>,
}

/// Result of a plan change.
#[derive(Debug, Clone, Serialize)]
pub struct PlanChange {
    /// The replaced row, now canceled and superseded.
    pub previous: Subscription,
    /// The new row.
    pub subscription: Subscription,
    /// Amount owed (positive) or credited (negative) for the rest of the period.
    pub proration_minor: i64,
}

/// Drives subscriptions through their lifecycle.
pub struct SubscriptionLifecycle {
    store: Arc<dyn Store>,
    gateways: GatewayRegistry,
}

impl SubscriptionLifecycle {
    /// Create a lifecycle manager.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, gateways: GatewayRegistry) -> Self {
        Self { store, gateways }
    }

    /// Make sure the subscriber has a billing profile; existing profiles are returned
    /// unchanged.
    pub async fn ensure_customer(
        &self,
        subscriber: &SubscriberContext,
        details: CustomerDetails,
    ) -> Result<Customer, LifecycleError> {
        let mut template = Customer::new(subscriber.clone());
        template.billing_email = details.billing_email;
        template.company_name = details.company_name;
        template.tax_id = details.tax_id;

        let customer = self.store.ensure_customer(template).await?;
        tracing::debug!(subscriber = %subscriber, "Customer ensured");
        Ok(customer)
    }

    /// Subscribe to `plan_slug` through `processor`, or the default processor.
    pub async fn subscribe(
        &self,
        subscriber: &SubscriberContext,
        plan_slug: &str,
        processor: Option<Processor>,
    ) -> Result<Subscription, LifecycleError> {
        let catalog = self.store.load_catalog().await?;
        let plan = offered_plan(catalog.plan_by_slug(plan_slug), plan_slug)?;

        if self.active_subscription(subscriber).await?.is_some() {
            return Err(LifecycleError::AlreadySubscribed);
        }

        let processor = processor.unwrap_or_else(|| self.gateways.default_processor());
        let gateway = self.gateway(processor)?;
        let customer_id = self.processor_customer(gateway.as_ref(), subscriber).await?;

        let created = gateway
            .create_subscription(&SubscriptionRequest {
                customer_id,
                plan_slug: plan.slug.clone(),
                trial_period_days: plan.trial_period_days,
            })
            .await?;

        let now = Utc::now();
        let mut subscription = Subscription::start(subscriber.clone(), plan, processor, now)?;
        apply_processor_state(&mut subscription, &created);
        self.store
            .put_subscriptions(std::slice::from_ref(&subscription))
            .await?;

        tracing::info!(
            subscriber = %subscriber,
            subscription_id = %subscription.id,
            plan = %plan.slug,
            %processor,
            status = %subscription.status,
            "Subscription created"
        );
        Ok(subscription)
    }

    /// Cancel the current subscription now, or at the end of its period.
    ///
    /// Cancelling at period end leaves the status alone; the processor's webhook
    /// settles it when the period runs out.
    pub async fn cancel(
        &self,
        subscriber: &SubscriberContext,
        at_period_end: bool,
    ) -> Result<Subscription, LifecycleError> {
        let cancelable = |s: &Subscription| !s.is_superseded() && !s.status.is_terminal();
        let current = self
            .store
            .list_subscriptions(subscriber)
            .await?
            .into_iter()
            .find(cancelable)
            .ok_or(LifecycleError::NoSubscription)?;
        let (_row, mut subscription) = self.lock_current(&current, cancelable).await?;

        let confirmed = if subscription.external_id.is_empty() {
            None
        } else {
            let gateway = self.gateway(subscription.processor)?;
            Some(
                gateway
                    .cancel_subscription(&subscription.external_id, at_period_end)
                    .await?,
            )
        };

        let now = Utc::now();
        if !at_period_end {
            subscription.transition(SubscriptionStatus::Canceled, now)?;
            if let Some(canceled_at) = confirmed.and_then(|s| s.canceled_at) {
                subscription.canceled_at = Some(canceled_at);
            }
        }
        subscription.updated_at = now;
        self.store
            .put_subscriptions(std::slice::from_ref(&subscription))
            .await?;

        tracing::info!(
            subscriber = %subscriber,
            subscription_id = %subscription.id,
            at_period_end,
            "Subscription canceled"
        );
        Ok(subscription)
    }

    /// Move the active subscription to `plan_slug`.
    ///
    /// The old row is canceled and marked superseded, a new row takes over the
    /// processor subscription, and both are written in one atomic batch.
    pub async fn change_plan(
        &self,
        subscriber: &SubscriberContext,
        plan_slug: &str,
    ) -> Result<PlanChange, LifecycleError> {
        let catalog = self.store.load_catalog().await?;
        let new_plan = offered_plan(catalog.plan_by_slug(plan_slug), plan_slug)?;
        let current = self
            .active_subscription(subscriber)
            .await?
            .ok_or(LifecycleError::NoSubscription)?;
        let (_row, mut previous) = self
            .lock_current(&current, |s| s.is_active() && !s.is_superseded())
            .await?;
        if previous.plan_id == new_plan.id {
            return Err(LifecycleError::SamePlan(plan_slug.to_string()));
        }
        let old_plan = catalog
            .plan(&previous.plan_id)
            .ok_or_else(|| LifecycleError::UnknownPlan(previous.plan_id.to_string()))?;

        let confirmed = if previous.external_id.is_empty() {
            None
        } else {
            let gateway = self.gateway(previous.processor)?;
            Some(
                gateway
                    .update_subscription(&previous.external_id, &new_plan.slug)
                    .await?,
            )
        };

        let now = Utc::now();
        let days_remaining = u32::try_from((previous.current_period_end - now).num_days().max(0))
            .unwrap_or(u32::MAX);
        let proration_minor = calculate_proration(old_plan, new_plan, days_remaining);

        let mut subscription =
            Subscription::start(subscriber.clone(), new_plan, previous.processor, now)?;
        subscription.external_id.clone_from(&previous.external_id);
        subscription.status = SubscriptionStatus::Active;
        subscription.trial_end = None;
        subscription.current_period_start = previous.current_period_start;
        subscription.current_period_end = previous.current_period_end;
        if let Some(snapshot) = &confirmed {
            apply_processor_state(&mut subscription, snapshot);
        }

        previous.transition(SubscriptionStatus::Canceled, now)?;
        previous.superseded_by = Some(subscription.id);

        self.store
            .put_subscriptions(&[previous.clone(), subscription.clone()])
            .await?;

        tracing::info!(
            subscriber = %subscriber,
            from = %old_plan.slug,
            to = %new_plan.slug,
            proration_minor,
            "Plan changed"
        );
        Ok(PlanChange {
            previous,
            subscription,
            proration_minor,
        })
    }

    /// Move trials that ended and periods that lapsed before `now` to past_due.
    ///
    /// Each row is rechecked under its lease, so a webhook that renewed it in the
    /// meantime wins. Returns the ids of the subscriptions that changed.
    pub async fn expire_overdue(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<SubscriptionId>, LifecycleError> {
        let mut expired = Vec::new();
        for candidate in self.store.list_live_subscriptions().await? {
            if !lapsed(&candidate, now) {
                continue;
            }
            let (_row, mut subscription) =
                match self.lock_current(&candidate, |s| lapsed(s, now)).await {
                    Ok(locked) => locked,
                    Err(LifecycleError::NoSubscription) => continue,
                    Err(e) => return Err(e),
                };
            subscription.transition(SubscriptionStatus::PastDue, now)?;
            self.store
                .put_subscriptions(std::slice::from_ref(&subscription))
                .await?;
            expired.push(subscription.id);
        }

        if !expired.is_empty() {
            tracing::info!(count = expired.len(), "Expired overdue subscriptions");
        }
        Ok(expired)
    }

    /// Take the lease of `found` and reload it; fails with `NoSubscription` if the
    /// reloaded row no longer satisfies `still`.
    async fn lock_current(
        &self,
        found: &Subscription,
        still: impl Fn(&Subscription) -> bool,
    ) -> Result<(SubscriptionLease, Subscription), LifecycleError> {
        let lease = self
            .store
            .lock_subscription(found.processor, &subscription_lock_key(found))
            .await?;
        let current = self
            .store
            .get_subscription(&found.id)
            .await?
            .filter(|s| still(s))
            .ok_or(LifecycleError::NoSubscription)?;
        Ok((lease, current))
    }

    async fn active_subscription(
        &self,
        subscriber: &SubscriberContext,
    ) -> Result<Option<Subscription>, StoreError> {
        let subscriptions = self.store.list_subscriptions(subscriber).await?;
        Ok(subscriptions.into_iter().find(Subscription::is_active))
    }

    fn gateway(&self, processor: Processor) -> Result<Arc<dyn PaymentGateway>, LifecycleError> {
        self.gateways
            .get(processor)
            .ok_or(LifecycleError::ProcessorUnavailable(processor))
    }

    /// The subscriber's customer id at the gateway's processor, created on first use.
    async fn processor_customer(
        &self,
        gateway: &dyn PaymentGateway,
        subscriber: &SubscriberContext,
    ) -> Result<String, LifecycleError> {
        let processor = gateway.processor();
        let mut customer = self
            .ensure_customer(subscriber, CustomerDetails::default())
            .await?;
        if let Some(id) = customer.processor_customer_id(processor) {
            return Ok(id.to_string());
        }

        let created = gateway
            .create_customer(&CustomerRequest {
                subscriber: subscriber.clone(),
                email: customer.billing_email.clone(),
                name: customer.company_name.clone(),
            })
            .await?;
        customer
            .processor_customer_ids
            .insert(processor, created.id.clone());
        customer.updated_at = Utc::now();
        self.store.put_customer(&customer).await?;

        tracing::info!(subscriber = %subscriber, %processor, "Processor customer created");
        Ok(created.id)
    }
}

fn lapsed(subscription: &Subscription, now: DateTime<Utc>) -> bool {
    match subscription.status {
        SubscriptionStatus::Trialing => subscription.trial_end.is_some_and(|end| end < now),
        SubscriptionStatus::Active => subscription.current_period_end < now,
        _ => false,
    }
}

fn offered_plan<'a>(plan: Option<&'a Plan>, slug: &str) -> Result<&'a Plan, LifecycleError> {
    match plan {
        None => Err(LifecycleError::UnknownPlan(slug.to_string())),
        Some(plan) if !plan.active => Err(LifecycleError::InactivePlan(slug.to_string())),
        Some(plan) => Ok(plan),
    }
}

/// Overwrite the local row with what the processor reported.
fn apply_processor_state(subscription: &mut Subscription, snapshot: &SubscriptionSnapshot) {
    subscription.external_id.clone_from(&snapshot.external_id);
    subscription.status = snapshot.status;
    if validate_period(snapshot.current_period_start, snapshot.current_period_end).is_ok() {
        subscription.current_period_start = snapshot.current_period_start;
        subscription.current_period_end = snapshot.current_period_end;
    }
    subscription.trial_end = snapshot.trial_end;
    subscription.canceled_at = snapshot.canceled_at;
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::testing::{seed_catalog, subscribe, FakeGateway};
    use plangate_store::MemoryStore;

    fn lifecycle(store: &Arc<dyn Store>) -> (SubscriptionLifecycle, Arc<FakeGateway>) {
        let gateway = Arc::new(FakeGateway::default());
        let registry = GatewayRegistry::new(Processor::Stripe).with_gateway(gateway.clone());
        (SubscriptionLifecycle::new(store.clone(), registry), gateway)
    }

    #[tokio::test]
    async fn subscribe_provisions_customer_once() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        seed_catalog(store.as_ref()).await;
        let (lifecycle, gateway) = lifecycle(&store);
        let user = SubscriberContext::from_user("7");

        let subscription = lifecycle.subscribe(&user, "pro", None).await.unwrap();
        assert_eq!(subscription.status, SubscriptionStatus::Active);
        assert_eq!(subscription.external_id, "sub_fake_1");
        assert!(matches!(
            lifecycle.subscribe(&user, "basic", None).await,
            Err(LifecycleError::AlreadySubscribed)
        ));

        lifecycle.cancel(&user, false).await.unwrap();
        lifecycle.subscribe(&user, "basic", None).await.unwrap();

        let customer = store.get_customer(&user).await.unwrap().unwrap();
        assert_eq!(customer.processor_customer_id(Processor::Stripe), Some("cus_7"));
        let creates = gateway
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("create_customer"))
            .count();
        assert_eq!(creates, 1);
    }

    #[tokio::test]
    async fn trial_plans_start_trialing() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let plans = seed_catalog(store.as_ref()).await;
        store
            .put_plan(&plans.pro.clone().with_trial_days(14))
            .await
            .unwrap();
        let (lifecycle, _) = lifecycle(&store);

        let subscription = lifecycle
            .subscribe(&SubscriberContext::from_tenant("acme"), "pro", None)
            .await
            .unwrap();

        assert_eq!(subscription.status, SubscriptionStatus::Trialing);
        assert!(subscription.is_trial(Utc::now()));
    }

    #[tokio::test]
    async fn unknown_and_inactive_plans_are_rejected() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let plans = seed_catalog(store.as_ref()).await;
        let mut retired = plans.basic.clone();
        retired.active = false;
        store.put_plan(&retired).await.unwrap();
        let (lifecycle, _) = lifecycle(&store);
        let user = SubscriberContext::from_user("1");

        assert!(matches!(
            lifecycle.subscribe(&user, "gold", None).await,
            Err(LifecycleError::UnknownPlan(_))
        ));
        assert!(matches!(
            lifecycle.subscribe(&user, "basic", None).await,
            Err(LifecycleError::InactivePlan(_))
        ));
        assert!(matches!(
            lifecycle.subscribe(&user, "pro", Some(Processor::Paddle)).await,
            Err(LifecycleError::ProcessorUnavailable(Processor::Paddle))
        ));
    }

    #[tokio::test]
    async fn cancel_at_period_end_keeps_access() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let plans = seed_catalog(store.as_ref()).await;
        subscribe(store.as_ref(), &plans.pro, "1").await;
        let (lifecycle, gateway) = lifecycle(&store);
        let user = SubscriberContext::from_user("1");

        let kept = lifecycle.cancel(&user, true).await.unwrap();
        assert_eq!(kept.status, SubscriptionStatus::Active);

        let ended = lifecycle.cancel(&user, false).await.unwrap();
        assert_eq!(ended.status, SubscriptionStatus::Canceled);
        assert!(ended.canceled_at.is_some());
        assert_eq!(
            gateway.calls(),
            vec!["cancel_subscription sub_1 true", "cancel_subscription sub_1 false"]
        );

        assert!(matches!(
            lifecycle.cancel(&user, false).await,
            Err(LifecycleError::NoSubscription)
        ));
    }

    #[tokio::test]
    async fn change_plan_supersedes_and_prorates() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let plans = seed_catalog(store.as_ref()).await;
        let original = subscribe(store.as_ref(), &plans.basic, "1").await;
        let (lifecycle, _) = lifecycle(&store);
        let user = SubscriberContext::from_user("1");

        let change = lifecycle.change_plan(&user, "pro").await.unwrap();

        assert_eq!(change.previous.id, original.id);
        assert_eq!(change.previous.status, SubscriptionStatus::Canceled);
        assert_eq!(change.previous.superseded_by, Some(change.subscription.id));
        assert_eq!(change.subscription.plan_id, plans.pro.id);
        assert_eq!(change.subscription.external_id, "sub_1");
        // 2100 per 30 days, scaled by the days left in this calendar month.
        assert!((1800..=2100).contains(&change.proration_minor));

        let live = store
            .find_subscription_by_external_id(Processor::Stripe, "sub_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(live.id, change.subscription.id);

        assert!(matches!(
            lifecycle.change_plan(&user, "pro").await,
            Err(LifecycleError::SamePlan(_))
        ));
    }

    #[tokio::test]
    async fn expire_overdue_moves_lapsed_rows_to_past_due() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let plans = seed_catalog(store.as_ref()).await;
        let mut lapsed = subscribe(store.as_ref(), &plans.pro, "1").await;
        lapsed.current_period_end = Utc::now() - Duration::hours(1);
        lapsed.current_period_start = lapsed.current_period_end - Duration::days(30);
        store.put_subscriptions(&[lapsed.clone()]).await.unwrap();
        let current = subscribe(store.as_ref(), &plans.pro, "2").await;
        let (lifecycle, _) = lifecycle(&store);

        let expired = lifecycle.expire_overdue(Utc::now()).await.unwrap();

        assert_eq!(expired, vec![lapsed.id]);
        let stored = store.get_subscription(&lapsed.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::PastDue);
        let untouched = store.get_subscription(&current.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn cancel_waits_for_a_webhook_holding_the_row() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let plans = seed_catalog(store.as_ref()).await;
        let mut subscription = subscribe(store.as_ref(), &plans.pro, "1").await;
        let (lifecycle, _) = lifecycle(&store);
        let lifecycle = Arc::new(lifecycle);

        let lease = store
            .lock_subscription(Processor::Stripe, "sub_1")
            .await
            .unwrap();
        let cancel = {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move {
                lifecycle
                    .cancel(&SubscriberContext::from_user("1"), false)
                    .await
            })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!cancel.is_finished());

        // The webhook moves the row to past_due while cancel waits.
        subscription.status = SubscriptionStatus::PastDue;
        subscription.failed_payment_count = 1;
        store.put_subscriptions(&[subscription.clone()]).await.unwrap();
        drop(lease);

        let canceled = cancel.await.unwrap().unwrap();
        assert_eq!(canceled.status, SubscriptionStatus::Canceled);
        assert_eq!(canceled.failed_payment_count, 1);
    }

    #[tokio::test]
    async fn expire_sweep_skips_rows_renewed_meanwhile() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let plans = seed_catalog(store.as_ref()).await;
        let mut lapsed = subscribe(store.as_ref(), &plans.pro, "1").await;
        lapsed.current_period_end = Utc::now() - Duration::hours(1);
        lapsed.current_period_start = lapsed.current_period_end - Duration::days(30);
        store.put_subscriptions(&[lapsed.clone()]).await.unwrap();
        let (lifecycle, _) = lifecycle(&store);
        let lifecycle = Arc::new(lifecycle);

        let lease = store
            .lock_subscription(Processor::Stripe, "sub_1")
            .await
            .unwrap();
        let sweep = {
            let lifecycle = Arc::clone(&lifecycle);
            tokio::spawn(async move { lifecycle.expire_overdue(Utc::now()).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        let mut renewed = lapsed.clone();
        renewed.current_period_start = Utc::now();
        renewed.current_period_end = renewed.current_period_start + Duration::days(30);
        store.put_subscriptions(&[renewed]).await.unwrap();
        drop(lease);

        assert!(sweep.await.unwrap().unwrap().is_empty());
        let stored = store.get_subscription(&lapsed.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Active);
    }

    #[tokio::test]
    async fn ensure_customer_is_idempotent() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let (lifecycle, _) = lifecycle(&store);
        let user = SubscriberContext::from_user("1");

        let first = lifecycle
            .ensure_customer(
                &user,
                CustomerDetails {
                    billing_email: Some("a@example.com".into()),
                    ..CustomerDetails::default()
                },
            )
            .await
            .unwrap();
        let second = lifecycle
            .ensure_customer(&user, CustomerDetails::default())
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(second.billing_email.as_deref(), Some("a@example.com"));
    }
}
