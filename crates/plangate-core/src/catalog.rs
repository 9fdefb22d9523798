//! Plan catalog: plans, modules, features and their associations.
//!
//! A [`Catalog`] is an immutable snapshot taken once per request. Every entitlement
//! answer is derived from it, so it never performs I/O and never fails after
//! construction; construction validates the uniqueness rules.
//!
//! # Feature slugs
//!
//! Feature slugs are unique only within their module. Lookups accept either a
//! module-qualified slug (`api/api-access`) or a bare slug (`api-access`). A bare slug
//! that matches features in more than one module of the plan resolves to
//! [`Quota::NotIncluded`] so that ambiguous gates stay closed.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Months, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};
use crate::ids::{FeatureId, ModuleId, PlanId};

/// Default currency for plan prices.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Separator between module and feature in a qualified slug.
pub const QUALIFIED_SLUG_SEPARATOR: char = '/';

// ============================================================================
// Plans
// ============================================================================

/// How often a plan bills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingPeriod {
    /// Billed every month.
    Monthly,
    /// Billed every three months.
    Quarterly,
    /// Billed every year.
    Yearly,
    /// Paid once, never renews.
    Lifetime,
}

impl BillingPeriod {
    /// Months covered by one period. Lifetime plans use a century-long period.
    #[must_use]
    pub const fn months(self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Quarterly => 3,
            Self::Yearly => 12,
            Self::Lifetime => 1200,
        }
    }

    /// Day count used to derive a daily rate for proration.
    ///
    /// Returns `None` for lifetime plans, which are never prorated.
    #[must_use]
    pub const fn proration_days(self) -> Option<i64> {
        match self {
            Self::Monthly => Some(30),
            Self::Quarterly => Some(90),
            Self::Yearly => Some(365),
            Self::Lifetime => None,
        }
    }

    /// End of the period starting at `start`.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidPeriod` if the end is not representable.
    pub fn period_end(self, start: DateTime<Utc>) -> Result<DateTime<Utc>> {
        start
            .checked_add_months(Months::new(self.months()))
            .ok_or_else(|| BillingError::InvalidPeriod(format!("period from {start} overflows")))
    }

    /// The canonical name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Monthly => "monthly",
            Self::Quarterly => "quarterly",
            Self::Yearly => "yearly",
            Self::Lifetime => "lifetime",
        }
    }
}

impl fmt::Display for BillingPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BillingPeriod {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "monthly" => Ok(Self::Monthly),
            "quarterly" => Ok(Self::Quarterly),
            "yearly" => Ok(Self::Yearly),
            "lifetime" => Ok(Self::Lifetime),
            other => Err(BillingError::UnknownBillingPeriod(other.to_string())),
        }
    }
}

/// A purchasable subscription plan.
///
/// Subscriptions reference plans by id and read the price only at checkout and
/// proration time, so editing a price never changes an existing subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    /// Plan identifier.
    pub id: PlanId,
    /// Unique slug, also used as the processor-side price reference.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Price per period in minor currency units.
    pub price_minor: i64,
    /// ISO currency code.
    pub currency: String,
    /// Billing cadence.
    pub billing_period: BillingPeriod,
    /// Free trial length granted on subscribe.
    pub trial_period_days: u32,
    /// Whether the plan is offered to new subscribers.
    pub active: bool,
    /// Display ordering.
    pub sort_order: i32,
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// When the plan was last modified.
    pub updated_at: DateTime<Utc>,
}

impl Plan {
    /// Create an active plan with no trial.
    #[must_use]
    pub fn new(
        slug: impl Into<String>,
        name: impl Into<String>,
        price_minor: i64,
        billing_period: BillingPeriod,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: PlanId::generate(),
            slug: slug.into(),
            name: name.into(),
            description: String::new(),
            price_minor,
            currency: DEFAULT_CURRENCY.to_string(),
            billing_period,
            trial_period_days: 0,
            active: true,
            sort_order: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the trial length.
    #[must_use]
    pub fn with_trial_days(mut self, days: u32) -> Self {
        self.trial_period_days = days;
        self
    }

    /// Set the display ordering.
    #[must_use]
    pub fn with_sort_order(mut self, sort_order: i32) -> Self {
        self.sort_order = sort_order;
        self
    }
}

// ============================================================================
// Modules and Features
// ============================================================================

/// A group of related features.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    /// Module identifier.
    pub id: ModuleId,
    /// Unique slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Inactive modules hide all of their features.
    pub active: bool,
    /// Display ordering.
    pub sort_order: i32,
}

impl Module {
    /// Create an active module.
    #[must_use]
    pub fn new(slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ModuleId::generate(),
            slug: slug.into(),
            name: name.into(),
            description: String::new(),
            active: true,
            sort_order: 0,
        }
    }
}

/// How a feature is metered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureType {
    /// On or off.
    Binary,
    /// Numeric ceiling per billing period.
    Quota,
    /// Plan tier decides behavior; gated like a binary feature.
    Tiered,
}

/// A gateable capability of the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feature {
    /// Feature identifier.
    pub id: FeatureId,
    /// Owning module.
    pub module_id: ModuleId,
    /// Slug, unique within the module.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Metering style.
    pub feature_type: FeatureType,
    /// Quota granted when a plan sets no override.
    pub default_quota: Option<u64>,
    /// Unit of the quota, e.g. `requests`.
    pub quota_unit: Option<String>,
    /// Inactive features are never included.
    pub active: bool,
    /// Display ordering.
    pub sort_order: i32,
}

impl Feature {
    /// Create an active binary feature.
    #[must_use]
    pub fn binary(module_id: ModuleId, slug: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: FeatureId::generate(),
            module_id,
            slug: slug.into(),
            name: name.into(),
            description: String::new(),
            feature_type: FeatureType::Binary,
            default_quota: None,
            quota_unit: None,
            active: true,
            sort_order: 0,
        }
    }

    /// Create an active quota feature.
    #[must_use]
    pub fn quota(
        module_id: ModuleId,
        slug: impl Into<String>,
        name: impl Into<String>,
        default_quota: u64,
        unit: impl Into<String>,
    ) -> Self {
        Self {
            feature_type: FeatureType::Quota,
            default_quota: Some(default_quota),
            quota_unit: Some(unit.into()),
            ..Self::binary(module_id, slug, name)
        }
    }
}

/// Association of one feature with one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanFeature {
    /// The plan.
    pub plan_id: PlanId,
    /// The feature.
    pub feature_id: FeatureId,
    /// Whether the plan grants the feature.
    pub included: bool,
    /// Replaces the feature's default quota for this plan.
    pub quota_override: Option<u64>,
}

impl PlanFeature {
    /// Include a feature with its default quota.
    #[must_use]
    pub const fn included(plan_id: PlanId, feature_id: FeatureId) -> Self {
        Self {
            plan_id,
            feature_id,
            included: true,
            quota_override: None,
        }
    }

    /// Override the quota for this plan.
    #[must_use]
    pub const fn with_quota(mut self, quota: u64) -> Self {
        self.quota_override = Some(quota);
        self
    }
}

/// Resolved quota for a plan and feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "limit", rename_all = "snake_case")]
pub enum Quota {
    /// Usage is capped per billing period.
    Limited(u64),
    /// No ceiling applies.
    Unlimited,
    /// The plan does not grant the feature.
    NotIncluded,
}

impl Quota {
    /// Whether the plan grants the feature at all.
    #[must_use]
    pub const fn is_included(self) -> bool {
        !matches!(self, Self::NotIncluded)
    }
}

// ============================================================================
// Catalog snapshot
// ============================================================================

/// Immutable view of the plan catalog.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    plans: HashMap<PlanId, Plan>,
    modules: HashMap<ModuleId, Module>,
    features: HashMap<FeatureId, Feature>,
    plan_features: HashMap<(PlanId, FeatureId), PlanFeature>,
}

impl Catalog {
    /// Build a validated snapshot.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidCatalog` when a slug is duplicated, a quota
    /// feature lacks its default quota or unit, a plan/feature pair appears twice, or
    /// a row references a missing plan, module or feature.
    pub fn new(
        plans: Vec<Plan>,
        modules: Vec<Module>,
        features: Vec<Feature>,
        plan_features: Vec<PlanFeature>,
    ) -> Result<Self> {
        let mut plan_slugs = HashSet::new();
        for plan in &plans {
            if !plan_slugs.insert(plan.slug.as_str()) {
                return Err(invalid(format!("duplicate plan slug '{}'", plan.slug)));
            }
        }

        let mut module_slugs = HashSet::new();
        for module in &modules {
            if !module_slugs.insert(module.slug.as_str()) {
                return Err(invalid(format!("duplicate module slug '{}'", module.slug)));
            }
        }
        let modules: HashMap<_, _> = modules.into_iter().map(|m| (m.id, m)).collect();

        let mut feature_slugs = HashSet::new();
        for feature in &features {
            if !modules.contains_key(&feature.module_id) {
                return Err(invalid(format!(
                    "feature '{}' references unknown module {}",
                    feature.slug, feature.module_id
                )));
            }
            if !feature_slugs.insert((feature.module_id, feature.slug.as_str())) {
                return Err(invalid(format!(
                    "duplicate feature slug '{}' in module {}",
                    feature.slug, feature.module_id
                )));
            }
            if feature.slug.contains(QUALIFIED_SLUG_SEPARATOR) {
                return Err(invalid(format!(
                    "feature slug '{}' must not contain '{QUALIFIED_SLUG_SEPARATOR}'",
                    feature.slug
                )));
            }
            if feature.feature_type == FeatureType::Quota
                && (feature.default_quota.is_none() || feature.quota_unit.is_none())
            {
                return Err(invalid(format!(
                    "quota feature '{}' needs a default quota and unit",
                    feature.slug
                )));
            }
        }

        let plans: HashMap<_, _> = plans.into_iter().map(|p| (p.id, p)).collect();
        let features: HashMap<_, _> = features.into_iter().map(|f| (f.id, f)).collect();

        let mut associations = HashMap::with_capacity(plan_features.len());
        for pf in plan_features {
            if !plans.contains_key(&pf.plan_id) || !features.contains_key(&pf.feature_id) {
                return Err(invalid(format!(
                    "plan feature ({}, {}) references an unknown row",
                    pf.plan_id, pf.feature_id
                )));
            }
            let key = (pf.plan_id, pf.feature_id);
            if associations.insert(key, pf).is_some() {
                return Err(invalid(format!(
                    "duplicate plan feature ({}, {})",
                    key.0, key.1
                )));
            }
        }

        Ok(Self {
            plans,
            modules,
            features,
            plan_features: associations,
        })
    }

    /// Look up a plan by id.
    #[must_use]
    pub fn plan(&self, plan_id: &PlanId) -> Option<&Plan> {
        self.plans.get(plan_id)
    }

    /// Look up a plan by slug.
    #[must_use]
    pub fn plan_by_slug(&self, slug: &str) -> Option<&Plan> {
        self.plans.values().find(|p| p.slug == slug)
    }

    /// Look up a feature by id.
    #[must_use]
    pub fn feature(&self, feature_id: &FeatureId) -> Option<&Feature> {
        self.features.get(feature_id)
    }

    /// Look up a module by id.
    #[must_use]
    pub fn module(&self, module_id: &ModuleId) -> Option<&Module> {
        self.modules.get(module_id)
    }

    /// Active plans ordered by `(sort_order, price)`, slug breaking ties.
    #[must_use]
    pub fn active_plans(&self) -> Vec<&Plan> {
        let mut plans: Vec<_> = self.plans.values().filter(|p| p.active).collect();
        plans.sort_by(|a, b| {
            (a.sort_order, a.price_minor, &a.slug).cmp(&(b.sort_order, b.price_minor, &b.slug))
        });
        plans
    }

    /// Look up a feature by module slug and feature slug.
    #[must_use]
    pub fn feature_in_module(&self, module_slug: &str, feature_slug: &str) -> Option<&Feature> {
        let module = self.modules.values().find(|m| m.slug == module_slug)?;
        self.features
            .values()
            .find(|f| f.module_id == module.id && f.slug == feature_slug)
    }

    /// Resolve a feature slug in the context of a plan.
    ///
    /// Returns `None` for unknown or ambiguous slugs.
    #[must_use]
    pub fn resolve_feature(&self, plan_id: &PlanId, feature_slug: &str) -> Option<&Feature> {
        if let Some((module_slug, slug)) = feature_slug.split_once(QUALIFIED_SLUG_SEPARATOR) {
            return self.feature_in_module(module_slug, slug);
        }

        let candidates: Vec<_> = self
            .features
            .values()
            .filter(|f| f.slug == feature_slug)
            .collect();
        match candidates.as_slice() {
            [] => None,
            [only] => Some(*only),
            many => {
                let mut linked = many
                    .iter()
                    .filter(|f| self.plan_features.contains_key(&(*plan_id, f.id)));
                match (linked.next(), linked.next()) {
                    (Some(feature), None) => Some(*feature),
                    _ => None,
                }
            }
        }
    }

    /// Effective quota of a feature under a plan.
    ///
    /// Unknown features, inactive features or modules, missing associations and
    /// `included = false` all resolve to [`Quota::NotIncluded`]. Non-quota features
    /// are unlimited. Otherwise the plan override wins over the feature default.
    #[must_use]
    pub fn effective_quota(&self, plan_id: &PlanId, feature_slug: &str) -> Quota {
        self.included_feature(plan_id, feature_slug)
            .map_or(Quota::NotIncluded, |(_, quota)| quota)
    }

    /// The resolved feature together with its quota, if the plan includes it.
    #[must_use]
    pub fn included_feature(
        &self,
        plan_id: &PlanId,
        feature_slug: &str,
    ) -> Option<(&Feature, Quota)> {
        let feature = self.resolve_feature(plan_id, feature_slug)?;
        if !self.is_live(feature) {
            return None;
        }
        let association = self.plan_features.get(&(*plan_id, feature.id))?;
        if !association.included {
            return None;
        }

        Some((feature, quota_of(feature, association)))
    }

    /// Every live feature the plan includes with its module and quota, in module then
    /// feature order.
    #[must_use]
    pub fn included_features(&self, plan_id: &PlanId) -> Vec<(&Module, &Feature, Quota)> {
        let mut included: Vec<_> = self
            .plan_features
            .values()
            .filter(|pf| pf.plan_id == *plan_id && pf.included)
            .filter_map(|pf| self.features.get(&pf.feature_id).map(|f| (pf, f)))
            .filter(|(_, f)| self.is_live(f))
            .filter_map(|(pf, f)| {
                let module = self.modules.get(&f.module_id)?;
                Some((module, f, quota_of(f, pf)))
            })
            .collect();
        included.sort_by(|(ma, fa, _), (mb, fb, _)| {
            (ma.sort_order, &ma.slug, fa.sort_order, &fa.slug).cmp(&(
                mb.sort_order,
                &mb.slug,
                fb.sort_order,
                &fb.slug,
            ))
        });
        included
    }

    /// Slugs of every live feature the plan includes, in module then feature order.
    #[must_use]
    pub fn included_feature_slugs(&self, plan_id: &PlanId) -> Vec<String> {
        self.included_features(plan_id)
            .into_iter()
            .map(|(_, f, _)| f.slug.clone())
            .collect()
    }

    fn is_live(&self, feature: &Feature) -> bool {
        feature.active
            && self
                .modules
                .get(&feature.module_id)
                .is_some_and(|m| m.active)
    }
}

/// Quota of an included association: non-quota features are unlimited, otherwise the
/// plan override wins over the feature default.
fn quota_of(feature: &Feature, association: &PlanFeature) -> Quota {
    if feature.feature_type == FeatureType::Quota {
        association
            .quota_override
            .or(feature.default_quota)
            .map_or(Quota::Unlimited, Quota::Limited)
    } else {
        Quota::Unlimited
    }
}

fn invalid(message: String) -> BillingError {
    BillingError::InvalidCatalog(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        catalog: Catalog,
        pro: PlanId,
        basic: PlanId,
    }

    fn fixture() -> Fixture {
        let api = Module::new("api", "API");
        let reports = Module::new("reports", "Reports");

        let api_access = Feature::quota(api.id, "api-access", "API access", 1000, "requests");
        let webhooks = Feature::binary(api.id, "webhooks", "Webhooks");
        let export = Feature::binary(reports.id, "export", "Export");
        let mut retired = Feature::binary(reports.id, "retired", "Retired");
        retired.active = false;
        let tiers = Feature {
            feature_type: FeatureType::Tiered,
            ..Feature::binary(reports.id, "tiers", "Tiers")
        };

        let pro = Plan::new("pro", "Pro", 2999, BillingPeriod::Monthly).with_sort_order(2);
        let basic = Plan::new("basic", "Basic", 999, BillingPeriod::Monthly).with_sort_order(1);

        let plan_features = vec![
            PlanFeature::included(pro.id, api_access.id).with_quota(5000),
            PlanFeature::included(pro.id, webhooks.id),
            PlanFeature::included(pro.id, retired.id),
            PlanFeature::included(pro.id, tiers.id),
            PlanFeature::included(basic.id, api_access.id),
            PlanFeature {
                included: false,
                ..PlanFeature::included(basic.id, export.id)
            },
        ];

        let (pro_id, basic_id) = (pro.id, basic.id);
        let catalog = Catalog::new(
            vec![pro, basic],
            vec![api, reports],
            vec![api_access, webhooks, export, retired, tiers],
            plan_features,
        )
        .unwrap();

        Fixture {
            catalog,
            pro: pro_id,
            basic: basic_id,
        }
    }

    #[test]
    fn override_wins_over_default() {
        let f = fixture();
        assert_eq!(f.catalog.effective_quota(&f.pro, "api-access"), Quota::Limited(5000));
        assert_eq!(f.catalog.effective_quota(&f.basic, "api-access"), Quota::Limited(1000));
    }

    #[test]
    fn non_quota_features_are_unlimited() {
        let f = fixture();
        assert_eq!(f.catalog.effective_quota(&f.pro, "webhooks"), Quota::Unlimited);
        assert_eq!(f.catalog.effective_quota(&f.pro, "tiers"), Quota::Unlimited);
    }

    #[test]
    fn missing_excluded_and_inactive_are_not_included() {
        let f = fixture();
        assert_eq!(f.catalog.effective_quota(&f.basic, "webhooks"), Quota::NotIncluded);
        assert_eq!(f.catalog.effective_quota(&f.basic, "export"), Quota::NotIncluded);
        assert_eq!(f.catalog.effective_quota(&f.pro, "retired"), Quota::NotIncluded);
        assert_eq!(f.catalog.effective_quota(&f.pro, "no-such-feature"), Quota::NotIncluded);
        assert_eq!(
            f.catalog.effective_quota(&PlanId::generate(), "api-access"),
            Quota::NotIncluded
        );
    }

    #[test]
    fn zero_override_is_a_real_limit() {
        let module = Module::new("api", "API");
        let feature = Feature::quota(module.id, "calls", "Calls", 100, "calls");
        let plan = Plan::new("free", "Free", 0, BillingPeriod::Monthly);
        let pf = PlanFeature::included(plan.id, feature.id).with_quota(0);
        let plan_id = plan.id;
        let catalog = Catalog::new(vec![plan], vec![module], vec![feature], vec![pf]).unwrap();

        assert_eq!(catalog.effective_quota(&plan_id, "calls"), Quota::Limited(0));
    }

    #[test]
    fn qualified_slugs_resolve_exactly() {
        let f = fixture();
        assert_eq!(
            f.catalog.effective_quota(&f.pro, "api/api-access"),
            Quota::Limited(5000)
        );
        assert_eq!(
            f.catalog.effective_quota(&f.pro, "reports/api-access"),
            Quota::NotIncluded
        );
    }

    #[test]
    fn ambiguous_bare_slug_is_not_included() {
        let a = Module::new("a", "A");
        let b = Module::new("b", "B");
        let fa = Feature::binary(a.id, "export", "Export A");
        let fb = Feature::binary(b.id, "export", "Export B");
        let plan = Plan::new("team", "Team", 100, BillingPeriod::Monthly);
        let plan_id = plan.id;
        let pfs = vec![
            PlanFeature::included(plan.id, fa.id),
            PlanFeature::included(plan.id, fb.id),
        ];
        let catalog = Catalog::new(vec![plan], vec![a, b], vec![fa, fb], pfs).unwrap();

        assert_eq!(catalog.effective_quota(&plan_id, "export"), Quota::NotIncluded);
        assert_eq!(catalog.effective_quota(&plan_id, "a/export"), Quota::Unlimited);
    }

    #[test]
    fn bare_slug_narrows_to_the_plan() {
        let a = Module::new("a", "A");
        let b = Module::new("b", "B");
        let fa = Feature::binary(a.id, "export", "Export A");
        let fb = Feature::binary(b.id, "export", "Export B");
        let plan = Plan::new("team", "Team", 100, BillingPeriod::Monthly);
        let plan_id = plan.id;
        let pfs = vec![PlanFeature::included(plan.id, fb.id)];
        let catalog = Catalog::new(vec![plan], vec![a, b], vec![fa, fb], pfs).unwrap();

        assert_eq!(catalog.effective_quota(&plan_id, "export"), Quota::Unlimited);
    }

    #[test]
    fn active_plans_are_ordered() {
        let f = fixture();
        let slugs: Vec<_> = f.catalog.active_plans().iter().map(|p| p.slug.as_str()).collect();
        assert_eq!(slugs, ["basic", "pro"]);
    }

    #[test]
    fn included_slugs_skip_inactive_and_excluded() {
        let f = fixture();
        assert_eq!(
            f.catalog.included_feature_slugs(&f.pro),
            ["api-access", "webhooks", "tiers"]
        );
        assert_eq!(f.catalog.included_feature_slugs(&f.basic), ["api-access"]);
    }

    #[test]
    fn rejects_quota_feature_without_unit() {
        let module = Module::new("api", "API");
        let mut feature = Feature::quota(module.id, "calls", "Calls", 10, "calls");
        feature.quota_unit = None;
        let err = Catalog::new(vec![], vec![module], vec![feature], vec![]).unwrap_err();
        assert!(matches!(err, BillingError::InvalidCatalog(_)));
    }

    #[test]
    fn rejects_duplicate_slugs() {
        let p1 = Plan::new("pro", "Pro", 1, BillingPeriod::Monthly);
        let p2 = Plan::new("pro", "Pro again", 2, BillingPeriod::Yearly);
        assert!(Catalog::new(vec![p1, p2], vec![], vec![], vec![]).is_err());

        let module = Module::new("api", "API");
        let f1 = Feature::binary(module.id, "x", "X");
        let f2 = Feature::binary(module.id, "x", "X again");
        assert!(Catalog::new(vec![], vec![module], vec![f1, f2], vec![]).is_err());
    }

    #[test]
    fn billing_period_ends() {
        let start = DateTime::parse_from_rfc3339("2024-01-31T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let end = BillingPeriod::Monthly.period_end(start).unwrap();
        assert_eq!(end.to_rfc3339(), "2024-02-29T00:00:00+00:00");
        let end = BillingPeriod::Yearly.period_end(start).unwrap();
        assert_eq!(end.to_rfc3339(), "2025-01-31T00:00:00+00:00");
    }
}
