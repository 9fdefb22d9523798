//! Subscriptions, their status machine, and customer billing profiles.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::Plan;
use crate::error::{BillingError, Result};
use crate::ids::{PlanId, SubscriptionId};
use crate::subscriber::SubscriberContext;

// ============================================================================
// Processors
// ============================================================================

/// Payment processors a subscription can be billed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Processor {
    /// Stripe.
    Stripe,
    /// Paddle Billing.
    Paddle,
}

impl Processor {
    /// All supported processors.
    pub const ALL: [Self; 2] = [Self::Stripe, Self::Paddle];

    /// The canonical configuration name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stripe => "stripe",
            Self::Paddle => "paddle",
        }
    }
}

impl fmt::Display for Processor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Processor {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stripe" => Ok(Self::Stripe),
            "paddle" => Ok(Self::Paddle),
            other => Err(BillingError::UnsupportedProcessor(other.to_string())),
        }
    }
}

// ============================================================================
// Status
// ============================================================================

/// Subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// In a free trial.
    Trialing,
    /// Paid and current.
    Active,
    /// A renewal payment failed; not entitled.
    PastDue,
    /// Ended. Terminal.
    Canceled,
    /// Dunning exhausted. Terminal.
    Unpaid,
}

impl SubscriptionStatus {
    /// Whether this status grants entitlements.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Trialing | Self::Active)
    }

    /// Terminal statuses have no outbound transitions.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Canceled | Self::Unpaid)
    }

    /// Whether `self -> next` is an edge of the status machine.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Trialing, Self::Active | Self::PastDue | Self::Canceled)
                | (Self::Active, Self::PastDue | Self::Canceled | Self::Unpaid)
                | (Self::PastDue, Self::Active | Self::Canceled)
        )
    }

    /// The canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trialing => "trialing",
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Unpaid => "unpaid",
        }
    }
}

impl fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionStatus {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "trialing" => Ok(Self::Trialing),
            "active" => Ok(Self::Active),
            "past_due" => Ok(Self::PastDue),
            "canceled" | "cancelled" => Ok(Self::Canceled),
            "unpaid" => Ok(Self::Unpaid),
            other => Err(BillingError::UnknownStatus(other.to_string())),
        }
    }
}

// ============================================================================
// Subscription
// ============================================================================

/// A subscriber's enrolment in a plan.
///
/// Rows are never deleted. A plan change marks the old row canceled with
/// `superseded_by` pointing at its replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Subscription identifier.
    pub id: SubscriptionId,
    /// Owner.
    pub subscriber: SubscriberContext,
    /// Subscribed plan.
    pub plan_id: PlanId,
    /// Current status.
    pub status: SubscriptionStatus,
    /// Start of the current billing period.
    pub current_period_start: DateTime<Utc>,
    /// End of the current billing period.
    pub current_period_end: DateTime<Utc>,
    /// End of the free trial, if any.
    pub trial_end: Option<DateTime<Utc>>,
    /// When the subscription was canceled.
    pub canceled_at: Option<DateTime<Utc>>,
    /// Processor-side subscription id; empty until the first sync.
    pub external_id: String,
    /// Processor billing this subscription.
    pub processor: Processor,
    /// Consecutive failed payments (dunning counter).
    #[serde(default)]
    pub failed_payment_count: u32,
    /// `occurred_at` of the last processor event applied.
    #[serde(default)]
    pub last_synced_at: Option<DateTime<Utc>>,
    /// Replacement created by a plan change.
    #[serde(default)]
    pub superseded_by: Option<SubscriptionId>,
    /// When the row was created.
    pub created_at: DateTime<Utc>,
    /// When the row was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Subscription {
    /// Start a subscription on `plan` at `start`.
    ///
    /// Plans with trial days start `trialing` with the trial covering the front of the
    /// first period; otherwise they start `active`.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidPeriod` if the period or trial end overflows.
    pub fn start(
        subscriber: SubscriberContext,
        plan: &Plan,
        processor: Processor,
        start: DateTime<Utc>,
    ) -> Result<Self> {
        let period_end = plan.billing_period.period_end(start)?;
        let trial_end = if plan.trial_period_days > 0 {
            let end = start
                .checked_add_signed(Duration::days(i64::from(plan.trial_period_days)))
                .ok_or_else(|| {
                    BillingError::InvalidPeriod(format!(
                        "{}-day trial from {start} overflows",
                        plan.trial_period_days
                    ))
                })?;
            Some(end.min(period_end))
        } else {
            None
        };
        let status = if trial_end.is_some() {
            SubscriptionStatus::Trialing
        } else {
            SubscriptionStatus::Active
        };

        Ok(Self {
            id: SubscriptionId::generate(),
            subscriber,
            plan_id: plan.id,
            status,
            current_period_start: start,
            current_period_end: period_end,
            trial_end,
            canceled_at: None,
            external_id: String::new(),
            processor,
            failed_payment_count: 0,
            last_synced_at: None,
            superseded_by: None,
            created_at: start,
            updated_at: start,
        })
    }

    /// Whether the subscription grants entitlements.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.status.is_active()
    }

    /// Whether the subscription is inside its free trial at `now`.
    #[must_use]
    pub fn is_trial(&self, now: DateTime<Utc>) -> bool {
        self.status == SubscriptionStatus::Trialing && self.trial_end.is_some_and(|end| now < end)
    }

    /// Whether a later plan change replaced this row.
    #[must_use]
    pub const fn is_superseded(&self) -> bool {
        self.superseded_by.is_some()
    }

    /// Check the period invariants.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidPeriod` if the period is inverted.
    pub fn validate(&self) -> Result<()> {
        validate_period(self.current_period_start, self.current_period_end)
    }

    /// Move to `next` along an edge of the status machine.
    ///
    /// Setting the current status again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidTransition` for any other change.
    pub fn transition(&mut self, next: SubscriptionStatus, at: DateTime<Utc>) -> Result<()> {
        if self.status == next {
            return Ok(());
        }
        if !self.status.can_transition_to(next) {
            return Err(BillingError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        if next == SubscriptionStatus::Canceled && self.canceled_at.is_none() {
            self.canceled_at = Some(at);
        }
        self.updated_at = at;
        Ok(())
    }
}

/// Check that a period does not end before it starts.
///
/// # Errors
///
/// Returns `BillingError::InvalidPeriod` if `end < start`.
pub fn validate_period(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<()> {
    if start > end {
        return Err(BillingError::InvalidPeriod(format!(
            "period starts at {start} after it ends at {end}"
        )));
    }
    Ok(())
}

// ============================================================================
// Customer
// ============================================================================

/// Billing profile of a subscriber, provisioned explicitly when the subscriber is
/// created or first subscribes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Owner.
    pub subscriber: SubscriberContext,
    /// Address invoices are sent to.
    pub billing_email: Option<String>,
    /// Company name on invoices.
    pub company_name: Option<String>,
    /// Tax registration number.
    pub tax_id: Option<String>,
    /// Processor-side customer ids.
    #[serde(default)]
    pub processor_customer_ids: BTreeMap<Processor, String>,
    /// When the profile was created.
    pub created_at: DateTime<Utc>,
    /// When the profile was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// Create an empty profile.
    #[must_use]
    pub fn new(subscriber: SubscriberContext) -> Self {
        let now = Utc::now();
        Self {
            subscriber,
            billing_email: None,
            company_name: None,
            tax_id: None,
            processor_customer_ids: BTreeMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Processor-side id for `processor`, if one was created.
    #[must_use]
    pub fn processor_customer_id(&self, processor: Processor) -> Option<&str> {
        self.processor_customer_ids.get(&processor).map(String::as_str)
    }
}
