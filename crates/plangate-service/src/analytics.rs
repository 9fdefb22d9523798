//! Subscription metrics for operators.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use plangate_core::analytics::{
    churn_rate, feature_usage, monthly_recurring_revenue, trial_conversion_rate,
};
use plangate_core::{FeatureUsage, Rate};
use plangate_store::{Store, StoreError};

/// Longest window a report may cover.
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// A rate with its percentage precomputed.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct RateView {
    /// Rows that matched.
    pub count: u64,
    /// Rows considered.
    pub total: u64,
    /// `count / total` in percent.
    pub percent: f64,
}

impl From<Rate> for RateView {
    fn from(rate: Rate) -> Self {
        Self {
            count: rate.count,
            total: rate.total,
            percent: rate.percent(),
        }
    }
}

/// Metrics over the window ending at `generated_at`.
#[derive(Debug, Clone, Serialize)]
pub struct AnalyticsReport {
    /// End of the window.
    pub generated_at: DateTime<Utc>,
    /// Window length in days.
    pub window_days: u32,
    /// Monthly recurring revenue in minor units, by currency.
    pub mrr: BTreeMap<String, i64>,
    /// Subscribers alive at the window start who canceled inside it.
    pub churn: RateView,
    /// Trials started inside the window that are now active.
    pub trial_conversion: RateView,
    /// Usage of periods starting inside the window, by feature.
    pub feature_usage: Vec<FeatureUsage>,
}

/// Compute the report for the `window_days` days before `now`.
///
/// # Errors
///
/// Returns an error if the store cannot be read. Windows reaching before the
/// representable range are clamped to it.
pub async fn report(
    store: &dyn Store,
    now: DateTime<Utc>,
    window_days: u32,
) -> Result<AnalyticsReport, StoreError> {
    let since = now
        .checked_sub_signed(Duration::days(i64::from(window_days)))
        .unwrap_or(DateTime::<Utc>::MIN_UTC);

    let catalog = store.load_catalog().await?;
    let subscriptions = store.list_all_subscriptions().await?;
    let usage = store.list_usage_since(since).await?;

    let report = AnalyticsReport {
        generated_at: now,
        window_days,
        mrr: monthly_recurring_revenue(&catalog, &subscriptions),
        churn: churn_rate(&subscriptions, since, now).into(),
        trial_conversion: trial_conversion_rate(&subscriptions, since, now).into(),
        feature_usage: feature_usage(&catalog, &subscriptions, &usage),
    };

    tracing::debug!(
        window_days,
        subscriptions = subscriptions.len(),
        usage_records = usage.len(),
        "Analytics computed"
    );
    Ok(report)
}
