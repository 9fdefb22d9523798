//! Webhook reconciliation.
//!
//! Turns verified processor events into local subscription, invoice and payment
//! state. Every delivery is deduplicated on `(processor, event_id)`:
//!
//! 1. The gateway verifies the signature and parses the body.
//! 2. The per-event lease is taken; a delivery already marked processed is a no-op.
//! 3. The ledger row is persisted before any effect is planned.
//! 4. The lease of the referenced subscription is taken, so events for the same
//!    subscription plan their effects against each other's results.
//! 5. Effects and the processed flag are committed in one atomic store write.
//!
//! A failure after step 3 leaves the row unprocessed with its `error_count` bumped, so
//! the processor's redelivery applies the effects exactly once.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plangate_core::{
    validate_period, EventPayload, Invoice, NormalizedEvent, Payment, PaymentNotice, Processor,
    Subscription, SubscriptionDeletion, SubscriptionSnapshot, SubscriptionStatus, WebhookEvent,
    WebhookKey,
};
use plangate_store::{Store, StoreError, WebhookChanges};

use crate::gateway::{GatewayError, GatewayRegistry, PaymentGateway};

// ============================================================================
// Types
// ============================================================================

/// How out-of-order subscription updates are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WebhookOrdering {
    /// Apply updates in the order they are processed; the last one wins.
    #[default]
    ProcessingOrder,
    /// Skip an update that happened before the last applied event.
    EventTimestamp,
}

impl FromStr for WebhookOrdering {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "processing_order" => Ok(Self::ProcessingOrder),
            "event_timestamp" => Ok(Self::EventTimestamp),
            other => Err(format!("unknown webhook ordering: {other}")),
        }
    }
}

/// What happened to a delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileOutcome {
    /// Effects were written.
    Applied,
    /// The event was already processed; nothing was written.
    Duplicate,
    /// The event references a subscription this service does not know.
    Orphaned,
    /// The event type has no local effect.
    Ignored,
    /// The update is older than the last applied event.
    Stale,
}

/// Reconciliation errors.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// No gateway is configured for the processor named in the request.
    #[error("unknown payment processor: {0}")]
    UnknownProcessor(String),

    /// The delivery failed verification or parsing; nothing was persisted.
    #[error("webhook rejected: {0}")]
    Rejected(GatewayError),

    /// The ledger could not be read or written.
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// Effects could not be applied; the event stays unprocessed.
    #[error("failed to apply event {event_id}: {message}")]
    Effect {
        /// Processor event id.
        event_id: String,
        /// Cause.
        message: String,
    },
}

// ============================================================================
// Reconciler
// ============================================================================

/// Applies processor webhooks to local state.
pub struct WebhookReconciler {
    store: Arc<dyn Store>,
    gateways: GatewayRegistry,
    ordering: WebhookOrdering,
}

impl WebhookReconciler {
    /// Create a reconciler.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        gateways: GatewayRegistry,
        ordering: WebhookOrdering,
    ) -> Self {
        Self {
            store,
            gateways,
            ordering,
        }
    }

    /// The configured gateway for a processor name taken from a request path.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::UnknownProcessor` for unsupported or disabled processors.
    pub fn gateway(&self, name: &str) -> Result<Arc<dyn PaymentGateway>, ReconcileError> {
        name.parse::<Processor>()
            .ok()
            .and_then(|processor| self.gateways.get(processor))
            .ok_or_else(|| ReconcileError::UnknownProcessor(name.to_string()))
    }

    /// Verify, deduplicate and apply one delivery.
    ///
    /// # Errors
    ///
    /// Returns `ReconcileError::Rejected` if verification fails, and
    /// `ReconcileError::Storage` or `ReconcileError::Effect` if the event could not be
    /// recorded or applied; the processor should redeliver in those cases.
    pub async fn reconcile(
        &self,
        gateway: &dyn PaymentGateway,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let processor = gateway.processor();
        let event = gateway
            .verify_and_parse_webhook(payload, signature)
            .map_err(|e| {
                tracing::warn!(%processor, error = %e, "Rejected webhook");
                ReconcileError::Rejected(e)
            })?;

        let key = WebhookKey::new(processor, event.event_id.clone());
        let _lease = self.store.lock_webhook_event(&key).await?;

        let mut record = match self.store.get_webhook_event(&key).await? {
            Some(existing) if existing.processed => {
                tracing::info!(
                    %processor,
                    event_id = %event.event_id,
                    "Duplicate webhook, already processed"
                );
                return Ok(ReconcileOutcome::Duplicate);
            }
            Some(existing) => existing,
            None => {
                let record = WebhookEvent::received(
                    processor,
                    &event,
                    String::from_utf8_lossy(payload).into_owned(),
                );
                self.store.put_webhook_event(&record).await?;
                record
            }
        };

        tracing::info!(
            %processor,
            event_id = %event.event_id,
            event_type = %event.event_type,
            attempt = record.error_count + 1,
            "Processing webhook"
        );

        let _row = match subscription_reference(&event.payload) {
            Some(external_id) => Some(self.store.lock_subscription(processor, external_id).await?),
            None => None,
        };

        let now = Utc::now();
        let applied = match self.plan_effects(processor, &event, now).await {
            Ok((outcome, changes)) => {
                record.mark_processed(now);
                self.store
                    .commit_webhook(&record, &changes)
                    .await
                    .map(|()| outcome)
            }
            Err(e) => Err(e),
        };

        match applied {
            Ok(outcome) => {
                tracing::info!(
                    %processor,
                    event_id = %event.event_id,
                    outcome = ?outcome,
                    "Webhook processed"
                );
                Ok(outcome)
            }
            Err(err) => {
                let message = err.to_string();
                record.record_failure(message.clone(), now);
                if let Err(e) = self.store.put_webhook_event(&record).await {
                    tracing::error!(
                        event_id = %event.event_id,
                        error = %e,
                        "Failed to record webhook failure"
                    );
                }
                tracing::error!(
                    %processor,
                    event_id = %event.event_id,
                    error_count = record.error_count,
                    error = %message,
                    "Webhook processing failed"
                );
                Err(ReconcileError::Effect {
                    event_id: event.event_id,
                    message,
                })
            }
        }
    }

    async fn plan_effects(
        &self,
        processor: Processor,
        event: &NormalizedEvent,
        now: DateTime<Utc>,
    ) -> Result<(ReconcileOutcome, WebhookChanges), StoreError> {
        match &event.payload {
            EventPayload::SubscriptionUpdated(snapshot) => {
                self.subscription_updated(processor, event, snapshot, now)
                    .await
            }
            EventPayload::SubscriptionDeleted(deletion) => {
                self.subscription_deleted(processor, event, deletion, now)
                    .await
            }
            EventPayload::PaymentSucceeded(notice) => {
                self.payment(processor, event, notice, true, now).await
            }
            EventPayload::PaymentFailed(notice) => {
                self.payment(processor, event, notice, false, now).await
            }
            EventPayload::Unhandled => {
                tracing::debug!(event_type = %event.event_type, "Unhandled webhook event");
                Ok((ReconcileOutcome::Ignored, WebhookChanges::none()))
            }
        }
    }

    async fn subscription_updated(
        &self,
        processor: Processor,
        event: &NormalizedEvent,
        snapshot: &SubscriptionSnapshot,
        now: DateTime<Utc>,
    ) -> Result<(ReconcileOutcome, WebhookChanges), StoreError> {
        let Some(mut subscription) = self
            .find(processor, event, &snapshot.external_id)
            .await?
        else {
            return Ok((ReconcileOutcome::Orphaned, WebhookChanges::none()));
        };

        if self.ordering == WebhookOrdering::EventTimestamp
            && subscription
                .last_synced_at
                .is_some_and(|last| event.occurred_at < last)
        {
            tracing::info!(
                event_id = %event.event_id,
                subscription_id = %subscription.id,
                occurred_at = %event.occurred_at,
                "Skipping stale subscription update"
            );
            return Ok((ReconcileOutcome::Stale, WebhookChanges::none()));
        }

        apply_snapshot(&mut subscription, snapshot);
        mark_synced(&mut subscription, event.occurred_at, now);

        tracing::info!(
            subscription_id = %subscription.id,
            status = %subscription.status,
            "Subscription updated from webhook"
        );
        Ok((ReconcileOutcome::Applied, subscription_change(subscription)))
    }

    async fn subscription_deleted(
        &self,
        processor: Processor,
        event: &NormalizedEvent,
        deletion: &SubscriptionDeletion,
        now: DateTime<Utc>,
    ) -> Result<(ReconcileOutcome, WebhookChanges), StoreError> {
        let Some(mut subscription) = self
            .find(processor, event, &deletion.external_id)
            .await?
        else {
            return Ok((ReconcileOutcome::Orphaned, WebhookChanges::none()));
        };

        subscription.status = SubscriptionStatus::Canceled;
        subscription.canceled_at = deletion
            .canceled_at
            .or(subscription.canceled_at)
            .or(Some(now));
        mark_synced(&mut subscription, event.occurred_at, now);

        tracing::info!(subscription_id = %subscription.id, "Subscription canceled from webhook");
        Ok((ReconcileOutcome::Applied, subscription_change(subscription)))
    }

    async fn payment(
        &self,
        processor: Processor,
        event: &NormalizedEvent,
        notice: &PaymentNotice,
        succeeded: bool,
        now: DateTime<Utc>,
    ) -> Result<(ReconcileOutcome, WebhookChanges), StoreError> {
        let Some(subscription_external_id) = &notice.subscription_external_id else {
            tracing::debug!(
                event_id = %event.event_id,
                payment = %notice.external_id,
                "Payment without subscription, ignoring"
            );
            return Ok((ReconcileOutcome::Ignored, WebhookChanges::none()));
        };
        let Some(mut subscription) = self.find(processor, event, subscription_external_id).await?
        else {
            return Ok((ReconcileOutcome::Orphaned, WebhookChanges::none()));
        };

        let invoice = match &notice.invoice {
            Some(invoice_notice) => {
                let existing = self
                    .store
                    .get_invoice_by_external_id(processor, &invoice_notice.external_id)
                    .await?;
                Some(Invoice::upsert(existing, &subscription, invoice_notice, now))
            }
            None => None,
        };

        let existing = self
            .store
            .get_payment_by_external_id(processor, &notice.external_id)
            .await?;
        let payment = Payment::upsert(
            existing,
            &subscription,
            notice,
            PaymentNotice::status(succeeded),
            invoice.as_ref().map(|i| i.id),
            now,
        );

        subscription.failed_payment_count = if succeeded {
            0
        } else {
            subscription.failed_payment_count.saturating_add(1)
        };
        mark_synced(&mut subscription, event.occurred_at, now);

        tracing::info!(
            subscription_id = %subscription.id,
            payment = %notice.external_id,
            succeeded,
            failed_payment_count = subscription.failed_payment_count,
            "Payment recorded from webhook"
        );
        Ok((
            ReconcileOutcome::Applied,
            WebhookChanges {
                subscription: Some(subscription),
                invoice,
                payment: Some(payment),
            },
        ))
    }

    async fn find(
        &self,
        processor: Processor,
        event: &NormalizedEvent,
        external_id: &str,
    ) -> Result<Option<Subscription>, StoreError> {
        let found = self
            .store
            .find_subscription_by_external_id(processor, external_id)
            .await?;
        if found.is_none() {
            tracing::warn!(
                %processor,
                event_id = %event.event_id,
                event_type = %event.event_type,
                external_id = %external_id,
                "Webhook references unknown subscription"
            );
        }
        Ok(found)
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Copy processor state onto the local row.
///
/// Terminal statuses are kept. Edges missing from the state machine are applied
/// anyway since the processor is the source of truth.
fn apply_snapshot(subscription: &mut Subscription, snapshot: &SubscriptionSnapshot) {
    let current = subscription.status;
    if current != snapshot.status {
        if current.is_terminal() {
            tracing::warn!(
                subscription_id = %subscription.id,
                from = %current,
                to = %snapshot.status,
                "Ignoring status change of a terminal subscription"
            );
        } else {
            if !current.can_transition_to(snapshot.status) {
                tracing::warn!(
                    subscription_id = %subscription.id,
                    from = %current,
                    to = %snapshot.status,
                    "Processor reported a transition outside the state machine"
                );
            }
            subscription.status = snapshot.status;
        }
    }

    match validate_period(snapshot.current_period_start, snapshot.current_period_end) {
        Ok(()) => {
            subscription.current_period_start = snapshot.current_period_start;
            subscription.current_period_end = snapshot.current_period_end;
        }
        Err(e) => {
            tracing::warn!(subscription_id = %subscription.id, error = %e, "Keeping local period");
        }
    }

    if snapshot.trial_end.is_some() {
        subscription.trial_end = snapshot.trial_end;
    }
    if snapshot.canceled_at.is_some() || subscription.status != SubscriptionStatus::Canceled {
        subscription.canceled_at = snapshot.canceled_at;
    }
}

/// The processor subscription id an event's effects are written to.
fn subscription_reference(payload: &EventPayload) -> Option<&str> {
    match payload {
        EventPayload::SubscriptionUpdated(snapshot) => Some(&snapshot.external_id),
        EventPayload::SubscriptionDeleted(deletion) => Some(&deletion.external_id),
        EventPayload::PaymentSucceeded(notice) | EventPayload::PaymentFailed(notice) => {
            notice.subscription_external_id.as_deref()
        }
        EventPayload::Unhandled => None,
    }
}

fn mark_synced(subscription: &mut Subscription, occurred_at: DateTime<Utc>, now: DateTime<Utc>) {
    subscription.last_synced_at = Some(
        subscription
            .last_synced_at
            .map_or(occurred_at, |last| last.max(occurred_at)),
    );
    subscription.updated_at = now;
}

fn subscription_change(subscription: Subscription) -> WebhookChanges {
    WebhookChanges {
        subscription: Some(subscription),
        ..WebhookChanges::none()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::testing::{event, pro_catalog, snapshot, subscribe, FakeGateway};
    use plangate_core::{InvoiceNotice, InvoiceStatus, PaymentStatus};
    use plangate_store::MemoryStore;

    fn reconciler(store: &Arc<dyn Store>, ordering: WebhookOrdering) -> WebhookReconciler {
        let gateways =
            GatewayRegistry::new(Processor::Stripe).with_gateway(Arc::new(FakeGateway::default()));
        WebhookReconciler::new(store.clone(), gateways, ordering)
    }

    fn updated(external_id: &str, status: SubscriptionStatus) -> EventPayload {
        EventPayload::SubscriptionUpdated(snapshot(external_id, status))
    }

    fn failed_payment(external_id: &str) -> EventPayload {
        EventPayload::PaymentFailed(PaymentNotice {
            external_id: external_id.to_string(),
            subscription_external_id: Some("sub_1".into()),
            amount_minor: 3000,
            currency: "USD".into(),
            failure_code: Some("card_declined".into()),
            failure_message: None,
            invoice: Some(InvoiceNotice {
                external_id: "in_1".into(),
                number: None,
                status: InvoiceStatus::Open,
                total_minor: 3000,
                amount_paid_minor: 0,
                amount_due_minor: 3000,
                currency: "USD".into(),
            }),
        })
    }

    #[tokio::test]
    async fn replayed_event_is_applied_once() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let plan = pro_catalog(store.as_ref()).await;
        let subscription = subscribe(store.as_ref(), &plan, "1").await;
        let reconciler = reconciler(&store, WebhookOrdering::ProcessingOrder);
        let gateway = reconciler.gateway("stripe").unwrap();

        let body = event("evt_1", Utc::now(), failed_payment("pay_1"));
        let first = reconciler.reconcile(gateway.as_ref(), &body, Some("valid")).await;
        let second = reconciler.reconcile(gateway.as_ref(), &body, Some("valid")).await;

        assert_eq!(first.unwrap(), ReconcileOutcome::Applied);
        assert_eq!(second.unwrap(), ReconcileOutcome::Duplicate);
        let stored = store.get_subscription(&subscription.id).await.unwrap().unwrap();
        assert_eq!(stored.failed_payment_count, 1);
        assert_eq!(stored.status, SubscriptionStatus::Active);

        let payment = store
            .get_payment_by_external_id(Processor::Stripe, "pay_1")
            .await
            .unwrap()
            .unwrap();
        let invoice = store
            .get_invoice_by_external_id(Processor::Stripe, "in_1")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(payment.status, PaymentStatus::Failed);
        assert_eq!(payment.invoice_id, Some(invoice.id));
    }

    #[tokio::test]
    async fn successful_payment_resets_dunning_counter() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let plan = pro_catalog(store.as_ref()).await;
        let subscription = subscribe(store.as_ref(), &plan, "1").await;
        let reconciler = reconciler(&store, WebhookOrdering::ProcessingOrder);
        let gateway = reconciler.gateway("stripe").unwrap();

        let deliveries = [
            ("evt_1", failed_payment("pay_1")),
            ("evt_2", failed_payment("pay_2")),
        ];
        for (id, payload) in deliveries {
            let body = event(id, Utc::now(), payload);
            reconciler.reconcile(gateway.as_ref(), &body, Some("valid")).await.unwrap();
        }
        let EventPayload::PaymentFailed(notice) = failed_payment("pay_3") else {
            unreachable!()
        };
        let body = event("evt_3", Utc::now(), EventPayload::PaymentSucceeded(notice));
        reconciler.reconcile(gateway.as_ref(), &body, Some("valid")).await.unwrap();

        let stored = store.get_subscription(&subscription.id).await.unwrap().unwrap();
        assert_eq!(stored.failed_payment_count, 0);
    }

    #[tokio::test]
    async fn orphan_deletion_creates_nothing() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let reconciler = reconciler(&store, WebhookOrdering::ProcessingOrder);
        let gateway = reconciler.gateway("stripe").unwrap();

        let body = event(
            "evt_9",
            Utc::now(),
            EventPayload::SubscriptionDeleted(SubscriptionDeletion {
                external_id: "sub_missing".into(),
                canceled_at: None,
            }),
        );
        let outcome = reconciler
            .reconcile(gateway.as_ref(), &body, Some("valid"))
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Orphaned);
        let record = store
            .get_webhook_event(&WebhookKey::new(Processor::Stripe, "evt_9"))
            .await
            .unwrap()
            .unwrap();
        assert!(record.processed);
        assert!(store
            .find_subscription_by_external_id(Processor::Stripe, "sub_missing")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn bad_signature_persists_nothing() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let reconciler = reconciler(&store, WebhookOrdering::ProcessingOrder);
        let gateway = reconciler.gateway("stripe").unwrap();

        let body = event("evt_1", Utc::now(), EventPayload::Unhandled);
        let err = reconciler
            .reconcile(gateway.as_ref(), &body, Some("forged"))
            .await
            .unwrap_err();

        assert!(matches!(err, ReconcileError::Rejected(GatewayError::InvalidSignature)));
        assert!(store
            .get_webhook_event(&WebhookKey::new(Processor::Stripe, "evt_1"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn unknown_processor_names_are_rejected() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let reconciler = reconciler(&store, WebhookOrdering::ProcessingOrder);

        assert!(matches!(
            reconciler.gateway("paypal"),
            Err(ReconcileError::UnknownProcessor(name)) if name == "paypal"
        ));
        // Supported but not configured.
        assert!(reconciler.gateway("paddle").is_err());
    }

    #[tokio::test]
    async fn terminal_status_is_sticky_but_deletion_cancels() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let plan = pro_catalog(store.as_ref()).await;
        let mut subscription = subscribe(store.as_ref(), &plan, "1").await;
        subscription.status = SubscriptionStatus::Unpaid;
        store.put_subscriptions(&[subscription.clone()]).await.unwrap();
        let reconciler = reconciler(&store, WebhookOrdering::ProcessingOrder);
        let gateway = reconciler.gateway("stripe").unwrap();

        let body = event("evt_1", Utc::now(), updated("sub_1", SubscriptionStatus::Active));
        reconciler.reconcile(gateway.as_ref(), &body, Some("valid")).await.unwrap();
        let stored = store.get_subscription(&subscription.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Unpaid);

        let body = event(
            "evt_2",
            Utc::now(),
            EventPayload::SubscriptionDeleted(SubscriptionDeletion {
                external_id: "sub_1".into(),
                canceled_at: None,
            }),
        );
        reconciler.reconcile(gateway.as_ref(), &body, Some("valid")).await.unwrap();
        let stored = store.get_subscription(&subscription.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Canceled);
        assert!(stored.canceled_at.is_some());
    }

    #[tokio::test]
    async fn event_timestamp_ordering_skips_stale_updates() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let plan = pro_catalog(store.as_ref()).await;
        let subscription = subscribe(store.as_ref(), &plan, "1").await;
        let reconciler = reconciler(&store, WebhookOrdering::EventTimestamp);
        let gateway = reconciler.gateway("stripe").unwrap();
        let now = Utc::now();

        let newer = event("evt_new", now, updated("sub_1", SubscriptionStatus::PastDue));
        let older = event(
            "evt_old",
            now - Duration::minutes(5),
            updated("sub_1", SubscriptionStatus::Active),
        );
        reconciler.reconcile(gateway.as_ref(), &newer, Some("valid")).await.unwrap();
        let outcome = reconciler
            .reconcile(gateway.as_ref(), &older, Some("valid"))
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Stale);
        let stored = store.get_subscription(&subscription.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::PastDue);
        assert_eq!(stored.last_synced_at, Some(now));
    }

    #[tokio::test]
    async fn processing_order_lets_the_last_delivery_win() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let plan = pro_catalog(store.as_ref()).await;
        let subscription = subscribe(store.as_ref(), &plan, "1").await;
        let reconciler = reconciler(&store, WebhookOrdering::ProcessingOrder);
        let gateway = reconciler.gateway("stripe").unwrap();
        let now = Utc::now();

        let newer = event("evt_new", now, updated("sub_1", SubscriptionStatus::PastDue));
        let older = event(
            "evt_old",
            now - Duration::minutes(5),
            updated("sub_1", SubscriptionStatus::Active),
        );
        reconciler.reconcile(gateway.as_ref(), &newer, Some("valid")).await.unwrap();
        let outcome = reconciler
            .reconcile(gateway.as_ref(), &older, Some("valid"))
            .await
            .unwrap();

        assert_eq!(outcome, ReconcileOutcome::Applied);
        let stored = store.get_subscription(&subscription.id).await.unwrap().unwrap();
        assert_eq!(stored.status, SubscriptionStatus::Active);
        // The sync watermark never moves backwards.
        assert_eq!(stored.last_synced_at, Some(now));
    }

    #[test]
    fn ordering_parses_configuration_names() {
        assert_eq!(
            "event_timestamp".parse::<WebhookOrdering>().unwrap(),
            WebhookOrdering::EventTimestamp
        );
        assert_eq!(
            " Processing_Order ".parse::<WebhookOrdering>().unwrap(),
            WebhookOrdering::ProcessingOrder
        );
        assert!("newest".parse::<WebhookOrdering>().is_err());
    }
}
