//! Customer provisioning.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use plangate_core::Customer;

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::handlers::parse_subscriber;
use crate::lifecycle::CustomerDetails;
use crate::state::AppState;

/// Ensure-customer request, sent when a user or tenant is created.
#[derive(Debug, Deserialize)]
pub struct EnsureCustomerRequest {
    /// `user:<id>` or `tenant:<id>`.
    pub subscriber: String,
    /// Billing details for a new profile.
    #[serde(flatten)]
    pub details: CustomerDetails,
}

/// Create the subscriber's billing profile if it does not exist.
pub async fn ensure_customer(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<EnsureCustomerRequest>,
) -> Result<Json<Customer>, ApiError> {
    let subscriber = parse_subscriber(&body.subscriber)?;
    let customer = state
        .lifecycle
        .ensure_customer(&subscriber, body.details)
        .await?;
    tracing::info!(
        service = %auth.service_name,
        subscriber = %subscriber,
        "Customer provisioned"
    );
    Ok(Json(customer))
}
