//! Application state.

use std::sync::Arc;

use plangate_store::Store;

use crate::config::{ConfigError, ServiceConfig};
use crate::entitlement::EntitlementService;
use crate::gateway::GatewayRegistry;
use crate::lifecycle::SubscriptionLifecycle;
use crate::reconciler::WebhookReconciler;
use crate::usage::UsageTracker;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Configured payment processors.
    pub gateways: GatewayRegistry,

    /// Entitlement queries.
    pub entitlements: EntitlementService,

    /// Usage metering.
    pub usage: UsageTracker,

    /// Webhook processing.
    pub reconciler: Arc<WebhookReconciler>,

    /// Subscribe, cancel and plan changes.
    pub lifecycle: Arc<SubscriptionLifecycle>,
}

impl AppState {
    /// Wire the services over `store` and the given gateways.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig, gateways: GatewayRegistry) -> Self {
        let usage = UsageTracker::new(store.clone());
        let entitlements = EntitlementService::new(store.clone(), usage.clone());
        let reconciler = Arc::new(WebhookReconciler::new(
            store.clone(),
            gateways.clone(),
            config.webhook_ordering,
        ));
        let lifecycle = Arc::new(SubscriptionLifecycle::new(store.clone(), gateways.clone()));

        if config.service_api_key.is_none() {
            tracing::warn!("SERVICE_API_KEY not configured - service API will reject all calls");
        }

        Self {
            store,
            config,
            gateways,
            entitlements,
            usage,
            reconciler,
            lifecycle,
        }
    }

    /// Build the gateways from configuration, then wire the services.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if the processor configuration is invalid.
    pub fn from_config(store: Arc<dyn Store>, config: ServiceConfig) -> Result<Self, ConfigError> {
        let gateways = GatewayRegistry::from_config(&config)?;
        Ok(Self::new(store, config, gateways))
    }
}
