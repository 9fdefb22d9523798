//! Route-level feature gating.
//!
//! Compose the gate when registering routes:
//!
//! ```ignore
//! let reports = Router::new()
//!     .route("/reports", get(reports))
//!     .route_layer(axum::middleware::from_fn_with_state(
//!         FeatureGate::new(state.clone(), "analytics/reports"),
//!         gate::require_feature,
//!     ));
//! ```
//!
//! The subscriber is taken from the `x-tenant-id` header, then `x-user-id`, then a
//! `:subscriber` path segment (`user:<id>` or `tenant:<id>`). Allowed requests carry
//! the [`Decision`] in their extensions.

use std::fmt;
use std::sync::Arc;

use axum::extract::{RawPathParams, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use plangate_core::{Remaining, SubscriberContext, Subscription};
use plangate_store::StoreError;

use crate::entitlement::EntitlementService;
use crate::error::ApiError;
use crate::state::AppState;

/// Header naming the tenant a request acts for.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Header naming the user a request acts for.
pub const USER_HEADER: &str = "x-user-id";

/// Why a gated request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DenyReason {
    /// The request names no subscriber.
    MissingSubscriber,
    /// The subscriber has no trialing or active subscription.
    NoActiveSubscription,
    /// The plan does not include the feature.
    FeatureNotIncluded,
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingSubscriber => "no subscriber in request",
            Self::NoActiveSubscription => "no active subscription",
            Self::FeatureNotIncluded => "feature not included in plan",
        })
    }
}

/// Outcome of gating one request.
#[derive(Debug, Clone)]
pub enum Decision {
    /// Access granted.
    Allow {
        /// The subscription granting access.
        subscription: Box<Subscription>,
        /// Quota left in the current period.
        remaining: Remaining,
    },
    /// Access refused.
    Deny {
        /// Why.
        reason: DenyReason,
        /// The feature requested.
        feature: String,
    },
}

impl Decision {
    /// Whether access was granted.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }
}

/// Middleware state: which feature a route requires.
#[derive(Clone)]
pub struct FeatureGate {
    state: Arc<AppState>,
    feature: &'static str,
}

impl FeatureGate {
    /// Gate on `feature`, bare (`sso`) or module-qualified (`api/api-access`).
    #[must_use]
    pub fn new(state: Arc<AppState>, feature: &'static str) -> Self {
        Self { state, feature }
    }
}

/// Resolve the subscriber a request acts for.
#[must_use]
pub fn subscriber_from_request(
    headers: &HeaderMap,
    path: Option<&RawPathParams>,
) -> Option<SubscriberContext> {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    SubscriberContext::resolve(header(TENANT_HEADER), header(USER_HEADER)).or_else(|| {
        path?
            .iter()
            .find(|(key, _)| *key == "subscriber")
            .and_then(|(_, value)| value.parse().ok())
    })
}

/// Decide whether `subscriber` may use `feature`.
///
/// # Errors
///
/// Returns an error if the store cannot be read.
pub async fn decide(
    entitlements: &EntitlementService,
    subscriber: Option<&SubscriberContext>,
    feature: &str,
) -> Result<Decision, StoreError> {
    let deny = |reason| Decision::Deny {
        reason,
        feature: feature.to_string(),
    };

    let Some(subscriber) = subscriber else {
        return Ok(deny(DenyReason::MissingSubscriber));
    };
    let Some(subscription) = entitlements.active_subscription(subscriber).await? else {
        return Ok(deny(DenyReason::NoActiveSubscription));
    };
    let check = entitlements
        .check_subscription(Some(&subscription), feature)
        .await?;
    if !check.entitled {
        return Ok(deny(DenyReason::FeatureNotIncluded));
    }

    Ok(Decision::Allow {
        subscription: Box::new(subscription),
        remaining: check.remaining,
    })
}

/// Middleware refusing requests whose subscriber lacks the gate's feature with
/// 403 `not_entitled`.
pub async fn require_feature(
    State(gate): State<FeatureGate>,
    path: Option<RawPathParams>,
    mut request: Request,
    next: Next,
) -> Response {
    let subscriber = subscriber_from_request(request.headers(), path.as_ref());

    match decide(&gate.state.entitlements, subscriber.as_ref(), gate.feature).await {
        Ok(decision @ Decision::Allow { .. }) => {
            request.extensions_mut().insert(decision);
            next.run(request).await
        }
        Ok(Decision::Deny { reason, feature }) => {
            tracing::info!(
                subscriber = ?subscriber,
                feature = %feature,
                reason = %reason,
                "Feature gate denied request"
            );
            ApiError::NotEntitled { feature, reason }.into_response()
        }
        Err(e) => ApiError::from(e).into_response(),
    }
}
