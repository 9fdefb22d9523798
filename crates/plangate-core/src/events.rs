//! Processor events after signature verification, and the webhook dedup ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ledger::{InvoiceStatus, PaymentStatus};
use crate::subscription::{Processor, SubscriptionStatus};

/// A verified processor event in processor-agnostic form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Processor-assigned event id; the dedup key together with the processor.
    pub event_id: String,
    /// Processor-specific event type, e.g. `customer.subscription.updated`.
    pub event_type: String,
    /// When the processor says the event happened.
    pub occurred_at: DateTime<Utc>,
    /// Typed payload discriminated by the event type.
    pub payload: EventPayload,
}

/// Payload of a [`NormalizedEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EventPayload {
    /// Full subscription state after a change.
    SubscriptionUpdated(SubscriptionSnapshot),
    /// The subscription ended at the processor.
    SubscriptionDeleted(SubscriptionDeletion),
    /// A payment settled.
    PaymentSucceeded(PaymentNotice),
    /// A payment attempt failed.
    PaymentFailed(PaymentNotice),
    /// An event type with no local effect.
    Unhandled,
}

/// Processor view of a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionSnapshot {
    /// Processor subscription id.
    pub external_id: String,
    /// Status after the change.
    pub status: SubscriptionStatus,
    /// Start of the current period.
    pub current_period_start: DateTime<Utc>,
    /// End of the current period.
    pub current_period_end: DateTime<Utc>,
    /// Trial end, if the processor reports one.
    pub trial_end: Option<DateTime<Utc>>,
    /// Cancellation instant, if any.
    pub canceled_at: Option<DateTime<Utc>>,
}

/// A subscription removed at the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDeletion {
    /// Processor subscription id.
    pub external_id: String,
    /// Cancellation instant, if the processor reports one.
    pub canceled_at: Option<DateTime<Utc>>,
}

/// A payment outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentNotice {
    /// Processor payment id.
    pub external_id: String,
    /// Processor subscription the payment belongs to.
    pub subscription_external_id: Option<String>,
    /// Amount in minor units.
    pub amount_minor: i64,
    /// ISO currency code, upper case.
    pub currency: String,
    /// Processor failure code.
    pub failure_code: Option<String>,
    /// Processor failure message.
    pub failure_message: Option<String>,
    /// The invoice the payment settles, if any.
    pub invoice: Option<InvoiceNotice>,
}

impl PaymentNotice {
    /// Local payment status implied by the event kind.
    #[must_use]
    pub const fn status(succeeded: bool) -> PaymentStatus {
        if succeeded {
            PaymentStatus::Succeeded
        } else {
            PaymentStatus::Failed
        }
    }
}

/// Processor view of an invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceNotice {
    /// Processor invoice id.
    pub external_id: String,
    /// Human-facing invoice number.
    pub number: Option<String>,
    /// Invoice status.
    pub status: InvoiceStatus,
    /// Invoice total in minor units.
    pub total_minor: i64,
    /// Amount paid in minor units.
    pub amount_paid_minor: i64,
    /// Amount still due in minor units.
    pub amount_due_minor: i64,
    /// ISO currency code, upper case.
    pub currency: String,
}

// ============================================================================
// Webhook ledger
// ============================================================================

/// Dedup key of a webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WebhookKey {
    /// Sending processor.
    pub processor: Processor,
    /// Processor event id.
    pub event_id: String,
}

impl WebhookKey {
    /// Build a key.
    #[must_use]
    pub fn new(processor: Processor, event_id: impl Into<String>) -> Self {
        Self {
            processor,
            event_id: event_id.into(),
        }
    }

    /// Stable string form, used for storage keys and lock names.
    #[must_use]
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.processor, self.event_id)
    }
}

/// Ledger row for one processor event.
///
/// Written before any effect is applied. Only the processing fields change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Dedup key.
    pub key: WebhookKey,
    /// Processor event type.
    pub event_type: String,
    /// Raw request body as received.
    pub payload: String,
    /// Event time reported by the processor.
    pub occurred_at: DateTime<Utc>,
    /// Set once effects are durably applied.
    pub processed: bool,
    /// When effects were applied.
    pub processed_at: Option<DateTime<Utc>>,
    /// Failed processing attempts.
    pub error_count: u32,
    /// Message of the most recent failure.
    pub last_error: Option<String>,
    /// First delivery.
    pub created_at: DateTime<Utc>,
    /// Last processing attempt.
    pub updated_at: DateTime<Utc>,
}

impl WebhookEvent {
    /// Ledger row for a freshly received event.
    #[must_use]
    pub fn received(processor: Processor, event: &NormalizedEvent, payload: String) -> Self {
        let now = Utc::now();
        Self {
            key: WebhookKey::new(processor, event.event_id.clone()),
            event_type: event.event_type.clone(),
            payload,
            occurred_at: event.occurred_at,
            processed: false,
            processed_at: None,
            error_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark effects as applied.
    pub fn mark_processed(&mut self, at: DateTime<Utc>) {
        self.processed = true;
        self.processed_at = Some(at);
        self.updated_at = at;
    }

    /// Record a failed attempt; the event stays unprocessed.
    pub fn record_failure(&mut self, error: impl Into<String>, at: DateTime<Utc>) {
        self.processed = false;
        self.processed_at = None;
        self.error_count = self.error_count.saturating_add(1);
        self.last_error = Some(error.into());
        self.updated_at = at;
    }
}
