//! API handlers.

pub mod admin;
pub mod customers;
pub mod features;
pub mod health;
pub mod plans;
pub mod subscriptions;
pub mod usage;
pub mod webhooks;

use plangate_core::SubscriberContext;

use crate::error::ApiError;

/// Parse a `user:<id>` or `tenant:<id>` path segment.
fn parse_subscriber(raw: &str) -> Result<SubscriberContext, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid subscriber: {raw}")))
}
