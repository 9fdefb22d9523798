//! Invoice and payment ledger entries mirrored from the processor.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{InvoiceNotice, PaymentNotice};
use crate::ids::{InvoiceId, PaymentId, SubscriptionId};
use crate::subscriber::SubscriberContext;
use crate::subscription::{Processor, Subscription};

/// Invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    /// Being prepared.
    Draft,
    /// Issued and awaiting payment.
    Open,
    /// Settled.
    Paid,
    /// Cancelled.
    Void,
    /// Written off.
    Uncollectible,
}

/// Payment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Awaiting settlement.
    Pending,
    /// Settled.
    Succeeded,
    /// Declined or errored.
    Failed,
    /// Abandoned.
    Canceled,
    /// Returned to the customer.
    Refunded,
}

/// An invoice, keyed by `(processor, external_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invoice {
    /// Local identifier.
    pub id: InvoiceId,
    /// Issuing processor.
    pub processor: Processor,
    /// Processor invoice id.
    pub external_id: String,
    /// Billed subscription.
    pub subscription_id: SubscriptionId,
    /// Billed subscriber.
    pub subscriber: SubscriberContext,
    /// Human-facing invoice number.
    pub number: Option<String>,
    /// Invoice status.
    pub status: InvoiceStatus,
    /// Total in minor units.
    pub total_minor: i64,
    /// Paid so far in minor units.
    pub amount_paid_minor: i64,
    /// Still due in minor units.
    pub amount_due_minor: i64,
    /// ISO currency code.
    pub currency: String,
    /// When the invoice was first seen.
    pub issued_at: DateTime<Utc>,
    /// When the invoice was settled.
    pub paid_at: Option<DateTime<Utc>>,
    /// When the row was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Invoice {
    /// Create or refresh an invoice from a processor notice.
    #[must_use]
    pub fn upsert(
        existing: Option<Self>,
        subscription: &Subscription,
        notice: &InvoiceNotice,
        at: DateTime<Utc>,
    ) -> Self {
        let mut invoice = existing.unwrap_or_else(|| Self {
            id: InvoiceId::generate(),
            processor: subscription.processor,
            external_id: notice.external_id.clone(),
            subscription_id: subscription.id,
            subscriber: subscription.subscriber.clone(),
            number: None,
            status: notice.status,
            total_minor: 0,
            amount_paid_minor: 0,
            amount_due_minor: 0,
            currency: notice.currency.clone(),
            issued_at: at,
            paid_at: None,
            updated_at: at,
        });

        invoice.number = notice.number.clone().or(invoice.number);
        invoice.status = notice.status;
        invoice.total_minor = notice.total_minor;
        invoice.amount_paid_minor = notice.amount_paid_minor;
        invoice.amount_due_minor = notice.amount_due_minor;
        invoice.currency.clone_from(&notice.currency);
        if notice.status == InvoiceStatus::Paid && invoice.paid_at.is_none() {
            invoice.paid_at = Some(at);
        }
        invoice.updated_at = at;
        invoice
    }
}

/// A payment attempt, keyed by `(processor, external_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    /// Local identifier.
    pub id: PaymentId,
    /// Processing processor.
    pub processor: Processor,
    /// Processor payment id.
    pub external_id: String,
    /// Settled invoice, if any.
    pub invoice_id: Option<InvoiceId>,
    /// Paid subscription.
    pub subscription_id: SubscriptionId,
    /// Paying customer.
    pub subscriber: SubscriberContext,
    /// Amount in minor units.
    pub amount_minor: i64,
    /// ISO currency code.
    pub currency: String,
    /// Outcome.
    pub status: PaymentStatus,
    /// Processor failure code.
    pub failure_code: Option<String>,
    /// Processor failure message.
    pub failure_message: Option<String>,
    /// When the outcome was recorded.
    pub processed_at: DateTime<Utc>,
}

impl Payment {
    /// Create or refresh a payment from a processor notice.
    #[must_use]
    pub fn upsert(
        existing: Option<Self>,
        subscription: &Subscription,
        notice: &PaymentNotice,
        status: PaymentStatus,
        invoice_id: Option<InvoiceId>,
        at: DateTime<Utc>,
    ) -> Self {
        let id = existing.as_ref().map_or_else(PaymentId::generate, |p| p.id);
        Self {
            id,
            processor: subscription.processor,
            external_id: notice.external_id.clone(),
            invoice_id: invoice_id.or_else(|| existing.and_then(|p| p.invoice_id)),
            subscription_id: subscription.id,
            subscriber: subscription.subscriber.clone(),
            amount_minor: notice.amount_minor,
            currency: notice.currency.clone(),
            status,
            failure_code: notice.failure_code.clone(),
            failure_message: notice.failure_message.clone(),
            processed_at: at,
        }
    }
}
