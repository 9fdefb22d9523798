//! Entitlement rules.
//!
//! These functions are pure: callers supply the catalog snapshot, the subscription
//! (if any) and the current-period usage. Every path that cannot prove access
//! answers "no access" or "nothing remaining".

use serde::{Deserialize, Serialize};

use crate::catalog::{Catalog, Quota};
use crate::subscription::Subscription;

/// Quota left in the current billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "remaining", rename_all = "snake_case")]
pub enum Remaining {
    /// Units left; zero once the quota is exhausted.
    Limited(u64),
    /// No ceiling applies.
    Unlimited,
}

impl Remaining {
    /// Whether at least `units` more may be consumed.
    #[must_use]
    pub const fn allows(self, units: u64) -> bool {
        match self {
            Self::Limited(left) => left >= units,
            Self::Unlimited => true,
        }
    }
}

/// Whether `subscription` grants `feature_slug`.
///
/// False without a subscription, for any status other than trialing or active, and
/// for features the plan does not include.
#[must_use]
pub fn has_feature_access(
    catalog: &Catalog,
    subscription: Option<&Subscription>,
    feature_slug: &str,
) -> bool {
    subscription
        .filter(|s| s.is_active())
        .is_some_and(|s| catalog.effective_quota(&s.plan_id, feature_slug).is_included())
}

/// Quota left after `used` units in the current period, floored at zero.
#[must_use]
pub fn remaining_quota(
    catalog: &Catalog,
    subscription: Option<&Subscription>,
    feature_slug: &str,
    used: u64,
) -> Remaining {
    let Some(subscription) = subscription.filter(|s| s.is_active()) else {
        return Remaining::Limited(0);
    };
    match catalog.effective_quota(&subscription.plan_id, feature_slug) {
        Quota::Limited(limit) => Remaining::Limited(limit.saturating_sub(used)),
        Quota::Unlimited => Remaining::Unlimited,
        Quota::NotIncluded => Remaining::Limited(0),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::catalog::{BillingPeriod, Feature, Module, Plan, PlanFeature};
    use crate::subscriber::SubscriberContext;
    use crate::subscription::{Processor, SubscriptionStatus};

    fn setup() -> (Catalog, Subscription) {
        let module = Module::new("api", "API");
        let api_access = Feature::quota(module.id, "api-access", "API access", 1000, "requests");
        let sso = Feature::binary(module.id, "sso", "SSO");
        let plan = Plan::new("pro", "Pro", 2999, BillingPeriod::Monthly);
        let pfs = vec![
            PlanFeature::included(plan.id, api_access.id).with_quota(5000),
            PlanFeature::included(plan.id, sso.id),
        ];
        let sub = Subscription::start(
            SubscriberContext::from_user("1"),
            &plan,
            Processor::Stripe,
            Utc::now(),
        )
        .unwrap();
        let catalog = Catalog::new(vec![plan], vec![module], vec![api_access, sso], pfs).unwrap();
        (catalog, sub)
    }

    #[test]
    fn access_is_fail_closed() {
        let (catalog, mut sub) = setup();
        assert!(!has_feature_access(&catalog, None, "sso"));

        for status in [
            SubscriptionStatus::PastDue,
            SubscriptionStatus::Canceled,
            SubscriptionStatus::Unpaid,
        ] {
            sub.status = status;
            assert!(!has_feature_access(&catalog, Some(&sub), "sso"), "{status}");
        }

        for status in [SubscriptionStatus::Trialing, SubscriptionStatus::Active] {
            sub.status = status;
            assert!(has_feature_access(&catalog, Some(&sub), "sso"), "{status}");
            assert!(!has_feature_access(&catalog, Some(&sub), "unknown"));
        }
    }

    #[test]
    fn remaining_floors_at_zero() {
        let (catalog, sub) = setup();
        assert_eq!(
            remaining_quota(&catalog, Some(&sub), "api-access", 4990),
            Remaining::Limited(10)
        );
        assert_eq!(
            remaining_quota(&catalog, Some(&sub), "api-access", 5010),
            Remaining::Limited(0)
        );
        assert_eq!(
            remaining_quota(&catalog, Some(&sub), "sso", 1_000_000),
            Remaining::Unlimited
        );
    }

    #[test]
    fn remaining_is_zero_without_entitlement() {
        let (catalog, mut sub) = setup();
        assert_eq!(remaining_quota(&catalog, None, "api-access", 0), Remaining::Limited(0));
        sub.status = SubscriptionStatus::PastDue;
        assert_eq!(
            remaining_quota(&catalog, Some(&sub), "api-access", 0),
            Remaining::Limited(0)
        );
    }

    #[test]
    fn allows_checks_headroom() {
        assert!(Remaining::Limited(10).allows(10));
        assert!(!Remaining::Limited(10).allows(11));
        assert!(Remaining::Unlimited.allows(u64::MAX));
    }
}
