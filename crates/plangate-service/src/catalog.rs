//! Catalog file import.
//!
//! The catalog is authored as JSON and upserted by slug at startup:
//!
//! ```json
//! {
//!   "modules": [{
//!     "slug": "api", "name": "API",
//!     "features": [
//!       { "slug": "api-access", "name": "API access", "type": "quota",
//!         "default_quota": 1000, "quota_unit": "requests" },
//!       { "slug": "sso", "name": "Single sign-on" }
//!     ]
//!   }],
//!   "plans": [{
//!     "slug": "pro", "name": "Pro", "price_minor": 2999, "billing_period": "monthly",
//!     "features": [{ "feature": "api/api-access", "quota": 5000 }, { "feature": "api/sso" }]
//!   }]
//! }
//! ```
//!
//! Rows keep their ids across imports. Rows missing from the file are left alone.

use std::path::Path;

use serde::Deserialize;

use plangate_core::{
    BillingError, BillingPeriod, Catalog, Feature, FeatureType, Module, Plan, PlanFeature,
};
use plangate_store::{Store, StoreError};

/// Catalog import errors.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// The file could not be read.
    #[error("failed to read catalog file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid catalog JSON.
    #[error("failed to parse catalog file: {0}")]
    Parse(#[from] serde_json::Error),

    /// A plan references a feature the file does not define.
    #[error("plan {plan} references unknown feature {feature}")]
    UnknownFeature {
        /// Plan slug.
        plan: String,
        /// Feature reference as written.
        feature: String,
    },

    /// The catalog breaks a uniqueness or completeness rule.
    #[error(transparent)]
    Invalid(#[from] BillingError),

    /// Storage failure.
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Values applied to plans that do not set them.
#[derive(Debug, Clone)]
pub struct CatalogDefaults {
    /// ISO currency code.
    pub currency: String,
    /// Trial length in days.
    pub trial_period_days: u32,
}

/// Counts of rows written by an import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportSummary {
    /// Modules written.
    pub modules: usize,
    /// Features written.
    pub features: usize,
    /// Plans written.
    pub plans: usize,
    /// Plan/feature associations written.
    pub plan_features: usize,
}

// ============================================================================
// File format
// ============================================================================

/// Root of a catalog file.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogFile {
    /// Modules with their features.
    #[serde(default)]
    pub modules: Vec<ModuleEntry>,
    /// Plans with their feature associations.
    #[serde(default)]
    pub plans: Vec<PlanEntry>,
}

/// A module in a catalog file.
#[derive(Debug, Clone, Deserialize)]
pub struct ModuleEntry {
    /// Unique slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Whether the module's features are live.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Display ordering.
    #[serde(default)]
    pub sort_order: i32,
    /// Features of the module.
    #[serde(default)]
    pub features: Vec<FeatureEntry>,
}

/// A feature in a catalog file.
#[derive(Debug, Clone, Deserialize)]
pub struct FeatureEntry {
    /// Slug, unique within the module.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Metering style; binary when absent.
    #[serde(rename = "type", default = "default_feature_type")]
    pub feature_type: FeatureType,
    /// Quota when a plan sets no override.
    #[serde(default)]
    pub default_quota: Option<u64>,
    /// Unit of the quota.
    #[serde(default)]
    pub quota_unit: Option<String>,
    /// Whether the feature is live.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Display ordering.
    #[serde(default)]
    pub sort_order: i32,
}

/// A plan in a catalog file.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanEntry {
    /// Unique slug.
    pub slug: String,
    /// Display name.
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// Price per period in minor units.
    pub price_minor: i64,
    /// ISO currency code.
    #[serde(default)]
    pub currency: Option<String>,
    /// Billing cadence.
    pub billing_period: BillingPeriod,
    /// Trial length in days.
    #[serde(default)]
    pub trial_period_days: Option<u32>,
    /// Whether the plan is offered.
    #[serde(default = "default_true")]
    pub active: bool,
    /// Display ordering.
    #[serde(default)]
    pub sort_order: i32,
    /// Included features.
    #[serde(default)]
    pub features: Vec<PlanFeatureEntry>,
}

/// A plan's association with a feature.
#[derive(Debug, Clone, Deserialize)]
pub struct PlanFeatureEntry {
    /// `module/feature`, or a bare slug when it names one feature of the file.
    pub feature: String,
    /// Quota override.
    #[serde(default)]
    pub quota: Option<u64>,
    /// Set to false to list a feature as explicitly excluded.
    #[serde(default = "default_true")]
    pub included: bool,
}

const fn default_true() -> bool {
    true
}

const fn default_feature_type() -> FeatureType {
    FeatureType::Binary
}

// ============================================================================
// Import
// ============================================================================

/// Read and import a catalog file.
///
/// # Errors
///
/// Returns `CatalogError` if the file cannot be read, parsed or validated, or the
/// store rejects a row.
pub async fn import_catalog_file(
    store: &dyn Store,
    path: impl AsRef<Path>,
    defaults: &CatalogDefaults,
) -> Result<ImportSummary, CatalogError> {
    let contents = tokio::fs::read_to_string(path.as_ref()).await?;
    let file: CatalogFile = serde_json::from_str(&contents)?;
    let summary = import_catalog(store, file, defaults).await?;
    tracing::info!(
        path = %path.as_ref().display(),
        plans = summary.plans,
        features = summary.features,
        "Catalog imported"
    );
    Ok(summary)
}

/// Validate and upsert a parsed catalog.
///
/// # Errors
///
/// Returns `CatalogError` if the catalog is invalid or the store rejects a row.
pub async fn import_catalog(
    store: &dyn Store,
    file: CatalogFile,
    defaults: &CatalogDefaults,
) -> Result<ImportSummary, CatalogError> {
    let existing = store.load_catalog().await?;

    let mut modules = Vec::with_capacity(file.modules.len());
    let mut features = Vec::new();
    for entry in file.modules {
        let module = module_row(store, &entry).await?;
        for feature in entry.features {
            features.push((module.slug.clone(), feature_row(&existing, &module, feature)));
        }
        modules.push(module);
    }

    let mut plans = Vec::with_capacity(file.plans.len());
    let mut plan_features = Vec::new();
    for entry in file.plans {
        let plan = plan_row(&existing, &entry, defaults);
        for association in &entry.features {
            let feature = find_feature(&features, &association.feature).ok_or_else(|| {
                CatalogError::UnknownFeature {
                    plan: entry.slug.clone(),
                    feature: association.feature.clone(),
                }
            })?;
            plan_features.push(PlanFeature {
                plan_id: plan.id,
                feature_id: feature.id,
                included: association.included,
                quota_override: association.quota,
            });
        }
        plans.push(plan);
    }
    let features: Vec<Feature> = features.into_iter().map(|(_, f)| f).collect();

    // Validate the file on its own before touching the store.
    Catalog::new(
        plans.clone(),
        modules.clone(),
        features.clone(),
        plan_features.clone(),
    )?;

    for module in &modules {
        store.put_module(module).await?;
    }
    for feature in &features {
        store.put_feature(feature).await?;
    }
    for plan in &plans {
        store.put_plan(plan).await?;
    }
    for plan_feature in &plan_features {
        store.put_plan_feature(plan_feature).await?;
    }

    Ok(ImportSummary {
        modules: modules.len(),
        features: features.len(),
        plans: plans.len(),
        plan_features: plan_features.len(),
    })
}

async fn module_row(store: &dyn Store, entry: &ModuleEntry) -> Result<Module, StoreError> {
    let mut module = store
        .get_module_by_slug(&entry.slug)
        .await?
        .unwrap_or_else(|| Module::new(entry.slug.clone(), entry.name.clone()));
    module.name.clone_from(&entry.name);
    module.description.clone_from(&entry.description);
    module.active = entry.active;
    module.sort_order = entry.sort_order;
    Ok(module)
}

fn feature_row(existing: &Catalog, module: &Module, entry: FeatureEntry) -> Feature {
    let mut feature = existing
        .feature_in_module(&module.slug, &entry.slug)
        .filter(|f| f.module_id == module.id)
        .cloned()
        .unwrap_or_else(|| Feature::binary(module.id, entry.slug.clone(), entry.name.clone()));
    feature.name = entry.name;
    feature.description = entry.description;
    feature.feature_type = entry.feature_type;
    feature.default_quota = entry.default_quota;
    feature.quota_unit = entry.quota_unit;
    feature.active = entry.active;
    feature.sort_order = entry.sort_order;
    feature
}

fn plan_row(existing: &Catalog, entry: &PlanEntry, defaults: &CatalogDefaults) -> Plan {
    let mut plan = existing.plan_by_slug(&entry.slug).cloned().unwrap_or_else(|| {
        Plan::new(
            entry.slug.clone(),
            entry.name.clone(),
            entry.price_minor,
            entry.billing_period,
        )
    });
    plan.name.clone_from(&entry.name);
    plan.description.clone_from(&entry.description);
    plan.price_minor = entry.price_minor;
    plan.currency = entry
        .currency
        .clone()
        .unwrap_or_else(|| defaults.currency.clone())
        .to_ascii_uppercase();
    plan.billing_period = entry.billing_period;
    plan.trial_period_days = entry.trial_period_days.unwrap_or(defaults.trial_period_days);
    plan.active = entry.active;
    plan.sort_order = entry.sort_order;
    plan.updated_at = chrono::Utc::now();
    plan
}

/// Resolve a plan's feature reference against the features of the file.
fn find_feature<'a>(features: &'a [(String, Feature)], reference: &str) -> Option<&'a Feature> {
    if let Some((module_slug, slug)) = reference.split_once('/') {
        return features
            .iter()
            .find(|(m, f)| m == module_slug && f.slug == slug)
            .map(|(_, f)| f);
    }
    let mut matches = features.iter().filter(|(_, f)| f.slug == reference);
    match (matches.next(), matches.next()) {
        (Some((_, feature)), None) => Some(feature),
        _ => None,
    }
}
