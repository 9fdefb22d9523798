//! Plan listing.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use plangate_core::{BillingPeriod, Plan, Quota};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// A plan as offered to subscribers.
#[derive(Debug, Serialize)]
pub struct PlanView {
    /// Plan slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
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
#[derive(Debug, Serialize)]
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

impl PlanView {
    fn new(plan: &Plan, features: Vec<PlanFeatureView>) -> Self {
        Self {
            slug: plan.slug.clone(),
            name: plan.name.clone(),
            description: plan.description.clone(),
            price_minor: plan.price_minor,
            currency: plan.currency.clone(),
            billing_period: plan.billing_period,
            trial_period_days: plan.trial_period_days,
            features,
        }
    }
}

/// Active plans in display order with their features.
pub async fn list_plans(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
) -> Result<Json<Vec<PlanView>>, ApiError> {
    let catalog = state.store.load_catalog().await?;
    let plans = catalog
        .active_plans()
        .into_iter()
        .map(|plan| {
            let features = catalog
                .included_features(&plan.id)
                .into_iter()
                .map(|(module, feature, quota)| PlanFeatureView {
                    module: module.slug.clone(),
                    slug: feature.slug.clone(),
                    name: feature.name.clone(),
                    quota,
                })
                .collect();
            PlanView::new(plan, features)
        })
        .collect();
    Ok(Json(plans))
}
