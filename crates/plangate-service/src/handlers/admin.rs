//! Maintenance endpoints for scheduled callers.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use plangate_core::SubscriptionId;

use crate::analytics::{self, AnalyticsReport, MAX_WINDOW_DAYS};
use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Expiry sweep response.
#[derive(Debug, Serialize)]
pub struct ExpireResponse {
    /// Subscriptions moved to past_due.
    pub expired: Vec<SubscriptionId>,
}

/// Move lapsed trials and periods to past_due.
pub async fn expire_overdue(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
) -> Result<Json<ExpireResponse>, ApiError> {
    let expired = state.lifecycle.expire_overdue(Utc::now()).await?;
    tracing::info!(
        service = %auth.service_name,
        count = expired.len(),
        "Expiry sweep finished"
    );
    Ok(Json(ExpireResponse { expired }))
}

/// Analytics query parameters.
#[derive(Debug, Deserialize)]
pub struct AnalyticsQuery {
    /// Window length in days; 30 when absent.
    #[serde(default = "default_window_days")]
    pub days: u32,
}

const fn default_window_days() -> u32 {
    30
}

/// Revenue, churn, trial conversion and feature usage over a trailing window.
pub async fn analytics(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Query(query): Query<AnalyticsQuery>,
) -> Result<Json<AnalyticsReport>, ApiError> {
    if query.days == 0 || query.days > MAX_WINDOW_DAYS {
        return Err(ApiError::BadRequest(format!(
            "days must be between 1 and {MAX_WINDOW_DAYS}"
        )));
    }

    let report = analytics::report(state.store.as_ref(), Utc::now(), query.days).await?;
    tracing::info!(
        service = %auth.service_name,
        window_days = query.days,
        "Analytics served"
    );
    Ok(Json(report))
}
