//! Feature check handler.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;

use crate::auth::ServiceAuth;
use crate::entitlement::FeatureCheck;
use crate::error::ApiError;
use crate::handlers::parse_subscriber;
use crate::state::AppState;

/// Whether the subscriber may use a feature, and how much quota is left.
pub async fn check_feature(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    Path((subscriber, feature)): Path<(String, String)>,
) -> Result<Json<FeatureCheck>, ApiError> {
    let subscriber = parse_subscriber(&subscriber)?;
    let check = state.entitlements.check(&subscriber, &feature).await?;
    Ok(Json(check))
}
