//! Proration for mid-period plan changes.

use crate::catalog::Plan;

/// Price difference owed (positive) or credited (negative) for switching from `old`
/// to `new` with `days_remaining` days left in the period, in minor units.
///
/// Uses a flat daily rate: 30 days per month, 90 per quarter, 365 per year. Plans
/// with different billing periods, and lifetime plans, prorate to zero.
#[must_use]
pub fn calculate_proration(old: &Plan, new: &Plan, days_remaining: u32) -> i64 {
    if old.billing_period != new.billing_period {
        return 0;
    }
    let Some(days_in_period) = old.billing_period.proration_days() else {
        return 0;
    };

    let difference = i128::from(new.price_minor) - i128::from(old.price_minor);
    let prorated = difference * i128::from(days_remaining) / i128::from(days_in_period);
    i64::try_from(prorated).unwrap_or(if prorated > 0 { i64::MAX } else { i64::MIN })
}
