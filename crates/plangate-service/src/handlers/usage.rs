//! Usage recording handler.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plangate_core::Remaining;

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::gate::{self, Decision};
use crate::handlers::parse_subscriber;
use crate::state::AppState;

/// Usage request.
#[derive(Debug, Deserialize)]
pub struct UsageRequest {
    /// Feature slug, bare or module-qualified.
    pub feature: String,
    /// Units consumed.
    #[serde(default = "default_delta")]
    pub delta: u64,
}

const fn default_delta() -> u64 {
    1
}

/// Usage response.
#[derive(Debug, Serialize)]
pub struct UsageResponse {
    /// Feature slug as requested.
    pub feature: String,
    /// Units used in the current period, including this request.
    pub usage_count: u64,
    /// Quota left in the current period.
    pub remaining: Remaining,
    /// Start of the current period.
    pub period_start: DateTime<Utc>,
    /// End of the current period.
    pub period_end: DateTime<Utc>,
}

/// Record usage of a feature.
///
/// Gated on the requested feature. Usage past the quota is still recorded; the
/// response then reports zero remaining.
pub async fn record_usage(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Path(subscriber): Path<String>,
    Json(body): Json<UsageRequest>,
) -> Result<Json<UsageResponse>, ApiError> {
    if body.delta == 0 {
        return Err(ApiError::BadRequest("delta must be positive".into()));
    }
    let subscriber = parse_subscriber(&subscriber)?;

    let subscription =
        match gate::decide(&state.entitlements, Some(&subscriber), &body.feature).await? {
            Decision::Allow { subscription, .. } => subscription,
            Decision::Deny { reason, feature } => {
                return Err(ApiError::NotEntitled { feature, reason });
            }
        };

    let record = state
        .usage
        .record_usage(&subscription, &body.feature, body.delta)
        .await?;
    let remaining = state
        .entitlements
        .remaining_for(Some(&*subscription), &body.feature)
        .await?;

    tracing::info!(
        service = %auth.service_name,
        subscriber = %subscriber,
        feature = %body.feature,
        delta = body.delta,
        usage_count = record.usage_count,
        "Usage recorded"
    );

    Ok(Json(UsageResponse {
        feature: body.feature,
        usage_count: record.usage_count,
        remaining,
        period_start: record.key.period_start,
        period_end: record.period_end,
    }))
}
