//! Subscription metrics over stored rows.
//!
//! Money is summed in minor units per currency. Rates keep their counts so callers
//! choose how to present them. Rows replaced by a plan change are history, not
//! subscribers, and are left out of churn and trial conversion.

use std::collections::{BTreeMap, HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::catalog::{Catalog, QUALIFIED_SLUG_SEPARATOR};
use crate::ids::{FeatureId, SubscriptionId};
use crate::subscription::{Subscription, SubscriptionStatus};
use crate::usage::UsageRecord;

/// `count` out of `total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Rate {
    /// Rows that matched.
    pub count: u64,
    /// Rows considered.
    pub total: u64,
}

impl Rate {
    /// The rate as a percentage; 0 when nothing was considered.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn percent(self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        self.count as f64 * 100.0 / self.total as f64
    }
}

/// Usage of one feature across subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeatureUsage {
    /// Qualified `module/feature` slug.
    pub feature: String,
    /// Units consumed.
    pub total_usage: u64,
    /// Period accumulators contributing.
    pub records: u64,
    /// Mean units per accumulator, rounded down.
    pub average_usage: u64,
    /// Distinct subscribers with usage.
    pub unique_subscribers: u64,
}

/// Monthly recurring revenue of trialing and active subscriptions, per currency.
///
/// Quarterly prices count a third and yearly prices a twelfth. Lifetime plans do not
/// recur and count zero. Each currency is rounded down once, after summing.
#[must_use]
pub fn monthly_recurring_revenue(
    catalog: &Catalog,
    subscriptions: &[Subscription],
) -> BTreeMap<String, i64> {
    let mut annual: BTreeMap<String, i128> = BTreeMap::new();
    for subscription in subscriptions.iter().filter(|s| s.is_active()) {
        let Some(plan) = catalog.plan(&subscription.plan_id) else {
            continue;
        };
        let periods_per_year = 12 / plan.billing_period.months();
        *annual.entry(plan.currency.clone()).or_default() +=
            i128::from(plan.price_minor) * i128::from(periods_per_year);
    }

    annual
        .into_iter()
        .map(|(currency, total)| {
            let monthly = total.div_euclid(12);
            let monthly = i64::try_from(monthly)
                .unwrap_or(if monthly > 0 { i64::MAX } else { i64::MIN });
            (currency, monthly)
        })
        .collect()
}

/// Subscriptions alive at `since` that were canceled in `[since, now)`.
#[must_use]
pub fn churn_rate(
    subscriptions: &[Subscription],
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Rate {
    let cohort = subscriptions.iter().filter(|s| {
        !s.is_superseded()
            && s.created_at < since
            && !s.canceled_at.is_some_and(|at| at < since)
    });

    let mut rate = Rate::default();
    for subscription in cohort {
        rate.total += 1;
        if subscription.canceled_at.is_some_and(|at| at < now) {
            rate.count += 1;
        }
    }
    rate
}

/// Trials started in `[since, now)` that are now active.
#[must_use]
pub fn trial_conversion_rate(
    subscriptions: &[Subscription],
    since: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Rate {
    let trials = subscriptions.iter().filter(|s| {
        !s.is_superseded()
            && s.trial_end.is_some()
            && (since..now).contains(&s.created_at)
    });

    let mut rate = Rate::default();
    for subscription in trials {
        rate.total += 1;
        if subscription.status == SubscriptionStatus::Active {
            rate.count += 1;
        }
    }
    rate
}

/// Per-feature totals over `records`, sorted by feature slug.
///
/// Records of features no longer in the catalog are skipped.
#[must_use]
pub fn feature_usage(
    catalog: &Catalog,
    subscriptions: &[Subscription],
    records: &[UsageRecord],
) -> Vec<FeatureUsage> {
    let subscribers: HashMap<SubscriptionId, String> = subscriptions
        .iter()
        .map(|s| (s.id, s.subscriber.key()))
        .collect();

    let mut by_feature: HashMap<FeatureId, (u64, u64, HashSet<&str>)> = HashMap::new();
    for record in records {
        let (total, count, seen) = by_feature.entry(record.key.feature_id).or_default();
        *total = total.saturating_add(record.usage_count);
        *count += 1;
        if let Some(subscriber) = subscribers.get(&record.key.subscription_id) {
            seen.insert(subscriber.as_str());
        }
    }

    let mut usage: Vec<FeatureUsage> = by_feature
        .into_iter()
        .filter_map(|(feature_id, (total, count, seen))| {
            let feature = catalog.feature(&feature_id)?;
            let module = catalog.module(&feature.module_id)?;
            Some(FeatureUsage {
                feature: format!("{}{QUALIFIED_SLUG_SEPARATOR}{}", module.slug, feature.slug),
                total_usage: total,
                records: count,
                average_usage: total / count,
                unique_subscribers: u64::try_from(seen.len()).unwrap_or(u64::MAX),
            })
        })
        .collect();
    usage.sort_by(|a, b| a.feature.cmp(&b.feature));
    usage
}
