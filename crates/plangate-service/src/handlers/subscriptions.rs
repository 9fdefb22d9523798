//! Subscription handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use plangate_core::{Processor, Subscription};

use crate::auth::ServiceAuth;
use crate::entitlement::SubscriptionSummary;
use crate::error::ApiError;
use crate::handlers::parse_subscriber;
use crate::lifecycle::PlanChange;
use crate::state::AppState;

/// Subscribe request.
#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    /// Plan slug.
    pub plan: String,
    /// Processor name; the configured default when absent.
    #[serde(default)]
    pub processor: Option<String>,
}

/// Cancel request.
#[derive(Debug, Deserialize)]
pub struct CancelRequest {
    /// Keep access until the period ends (default) or end it now.
    #[serde(default = "default_at_period_end")]
    pub at_period_end: bool,
}

const fn default_at_period_end() -> bool {
    true
}

/// Plan change request.
#[derive(Debug, Deserialize)]
pub struct ChangePlanRequest {
    /// Slug of the new plan.
    pub plan: String,
}

/// Summary of the subscriber's current subscription.
pub async fn get_subscription(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(subscriber): Path<String>,
) -> Result<Json<SubscriptionSummary>, ApiError> {
    let subscriber = parse_subscriber(&subscriber)?;
    state
        .entitlements
        .summary(&subscriber)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("no subscription for {subscriber}")))
}

/// Subscribe to a plan.
pub async fn subscribe(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Path(subscriber): Path<String>,
    Json(body): Json<SubscribeRequest>,
) -> Result<(StatusCode, Json<Subscription>), ApiError> {
    let subscriber = parse_subscriber(&subscriber)?;
    let processor = body
        .processor
        .as_deref()
        .map(str::parse::<Processor>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        service = %auth.service_name,
        subscriber = %subscriber,
        plan = %body.plan,
        "Subscribe requested"
    );
    let subscription = state
        .lifecycle
        .subscribe(&subscriber, &body.plan, processor)
        .await?;
    Ok((StatusCode::CREATED, Json(subscription)))
}

/// Cancel the current subscription.
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(subscriber): Path<String>,
    Json(body): Json<CancelRequest>,
) -> Result<Json<Subscription>, ApiError> {
    let subscriber = parse_subscriber(&subscriber)?;
    let subscription = state
        .lifecycle
        .cancel(&subscriber, body.at_period_end)
        .await?;
    Ok(Json(subscription))
}

/// Move the active subscription to another plan.
pub async fn change_plan(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path(subscriber): Path<String>,
    Json(body): Json<ChangePlanRequest>,
) -> Result<Json<PlanChange>, ApiError> {
    let subscriber = parse_subscriber(&subscriber)?;
    let change = state.lifecycle.change_plan(&subscriber, &body.plan).await?;
    Ok(Json(change))
}
