//! Request and response types for the plangate client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plangate_core::{
    BillingPeriod, PlanId, Processor, Quota, Remaining, Subscription, SubscriptionId,
    SubscriptionStatus,
};

/// Feature check result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FeatureCheck {
    /// Feature slug as requested.
    pub feature: String,
    /// Whether the subscriber may use the feature now.
    pub entitled: bool,
    /// Quota left in the current period.
    pub remaining: Remaining,
}

/// Usage recording request.
#[derive(Debug, Clone, Serialize)]
pub struct UsageRequest {
    /// Feature slug, bare or module-qualified.
    pub feature: String,
    /// Units consumed.
    pub delta: u64,
}

/// Usage recording response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UsageResponse {
    /// Feature slug as requested.
    pub feature: String,
    /// Units used in the current period.
    pub usage_count: u64,
    /// Quota left in the current period.
    pub remaining: Remaining,
    /// Start of the current period.
    pub period_start: DateTime<Utc>,
    /// End of the current period.
    pub period_end: DateTime<Utc>,
}

/// A subscriber's current subscription.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriptionSummary {
    /// Subscription id.
    pub subscription_id: SubscriptionId,
    /// Plan id.
    pub plan_id: PlanId,
    /// Plan slug.
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
    /// Slugs of the included features.
    pub features: Vec<String>,
    /// Consecutive failed payments.
    pub failed_payment_count: u32,
    /// Billing processor.
    pub processor: Processor,
}

/// A plan as offered to subscribers.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanView {
    /// Plan slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Price per period in minor units.
    pub price_minor: i64,
    /// ISO currency code.
    pub currency: String,
    /// Billing cadence.
    pub billing_period: BillingPeriod,
    /// Free trial length.
    pub trial_period_days: u32,
    /// Included features.
    pub features: Vec<PlanFeatureView>,
}

/// A feature included in a plan.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanFeatureView {
    /// Module slug.
    pub module: String,
    /// Feature slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Quota granted per period.
    pub quota: Quota,
}

/// Billing details for a new customer profile.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CustomerDetails {
    /// Billing email.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub billing_email: Option<String>,
    /// Company name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    /// Tax id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tax_id: Option<String>,
}

/// Result of a plan change.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanChange {
    /// The superseded row, now canceled.
    pub previous: Subscription,
    /// The new row.
    pub subscription: Subscription,
    /// Amount owed (positive) or credited (negative) for the rest of the period.
    pub proration_minor: i64,
}

/// API error response format.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional details.
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}
