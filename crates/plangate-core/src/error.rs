//! Error types for plangate.

use crate::ids::IdError;
use crate::subscription::SubscriptionStatus;

/// Result type for plangate domain operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors that can occur in plangate domain operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BillingError {
    /// The status change is not part of the subscription state machine.
    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        /// The current status.
        from: SubscriptionStatus,
        /// The requested status.
        to: SubscriptionStatus,
    },

    /// Billing period bounds are inconsistent.
    #[error("invalid billing period: {0}")]
    InvalidPeriod(String),

    /// The catalog violates a uniqueness or completeness rule.
    #[error("invalid catalog: {0}")]
    InvalidCatalog(String),

    /// The subscriber's plan does not include the feature.
    #[error("feature not included in plan: {feature}")]
    NotEntitled {
        /// The feature slug that was requested.
        feature: String,
    },

    /// A status string did not name a known subscription status.
    #[error("unknown subscription status: {0}")]
    UnknownStatus(String),

    /// A processor name is not supported.
    #[error("unsupported payment processor: {0}")]
    UnsupportedProcessor(String),

    /// A billing period name is not supported.
    #[error("unknown billing period: {0}")]
    UnknownBillingPeriod(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),
}
