//! Payment processor gateways.
//!
//! Every processor is reached through the [`PaymentGateway`] trait. Adapters translate
//! processor REST calls and webhook payloads into plangate types; the rest of the
//! service never sees processor-specific JSON.

pub mod paddle;
pub mod signature;
pub mod stripe;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use plangate_core::{
    NormalizedEvent, PaymentStatus, Processor, SubscriberContext, SubscriptionSnapshot,
};

use crate::config::{ConfigError, ServiceConfig};

pub use paddle::PaddleGateway;
pub use stripe::StripeGateway;

/// Error type for processor operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The webhook signature is missing, stale or does not match.
    #[error("invalid webhook signature")]
    InvalidSignature,

    /// The webhook body could not be understood.
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The processor API returned an error.
    #[error("{processor} API error ({status}): {message}")]
    Api {
        /// Processor that answered.
        processor: Processor,
        /// HTTP status code.
        status: u16,
        /// Processor error code.
        code: Option<String>,
        /// Processor error message.
        message: String,
    },

    /// The processor does not offer the operation.
    #[error("{processor} does not support {operation}")]
    Unsupported {
        /// Processor asked.
        processor: Processor,
        /// Operation name.
        operation: &'static str,
    },

    /// The request lacks data the processor requires.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl GatewayError {
    /// Whether the error was caused by the webhook request itself.
    #[must_use]
    pub const fn is_rejection(&self) -> bool {
        matches!(self, Self::InvalidSignature | Self::MalformedPayload(_))
    }
}

// ============================================================================
// Request and response types
// ============================================================================

/// Customer to create at a processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerRequest {
    /// Local owner, stored as processor metadata.
    pub subscriber: SubscriberContext,
    /// Billing email.
    pub email: Option<String>,
    /// Display or company name.
    pub name: Option<String>,
}

/// Customer created at a processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorCustomer {
    /// Processor customer id.
    pub id: String,
    /// Email on file.
    pub email: Option<String>,
}

/// Subscription to create at a processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// Processor customer id.
    pub customer_id: String,
    /// Plan slug, used as the processor price reference.
    pub plan_slug: String,
    /// Trial length; zero for none.
    pub trial_period_days: u32,
}

/// Payment method to attach to a customer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentMethodRequest {
    /// Processor customer id.
    pub customer_id: String,
    /// Processor-side token collected by the client.
    pub token: String,
}

/// Payment method attached at a processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorPaymentMethod {
    /// Processor payment method id.
    pub id: String,
    /// Method type, e.g. `card`.
    pub kind: String,
}

/// One-off charge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChargeRequest {
    /// Processor customer id.
    pub customer_id: String,
    /// Amount in minor units.
    pub amount_minor: i64,
    /// ISO currency code.
    pub currency: String,
    /// Statement description.
    pub description: Option<String>,
    /// Payment method to charge; the customer default otherwise.
    pub payment_method_id: Option<String>,
}

/// Result of a one-off charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorCharge {
    /// Processor payment id.
    pub external_id: String,
    /// Outcome so far.
    pub status: PaymentStatus,
    /// Amount in minor units.
    pub amount_minor: i64,
    /// ISO currency code.
    pub currency: String,
}

// ============================================================================
// Gateway trait
// ============================================================================

/// Uniform interface to a payment processor.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// The processor this adapter talks to.
    fn processor(&self) -> Processor;

    /// Name of the HTTP header carrying the webhook signature.
    fn signature_header(&self) -> &'static str;

    /// Create a customer.
    async fn create_customer(
        &self,
        request: &CustomerRequest,
    ) -> Result<ProcessorCustomer, GatewayError>;

    /// Create a subscription.
    async fn create_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<SubscriptionSnapshot, GatewayError>;

    /// Cancel a subscription now or at the end of the current period.
    async fn cancel_subscription(
        &self,
        external_id: &str,
        at_period_end: bool,
    ) -> Result<SubscriptionSnapshot, GatewayError>;

    /// Move a subscription to another plan.
    async fn update_subscription(
        &self,
        external_id: &str,
        plan_slug: &str,
    ) -> Result<SubscriptionSnapshot, GatewayError>;

    /// Fetch a subscription; `None` if the processor does not know it.
    async fn get_subscription(
        &self,
        external_id: &str,
    ) -> Result<Option<SubscriptionSnapshot>, GatewayError>;

    /// Attach a payment method to a customer.
    async fn create_payment_method(
        &self,
        request: &PaymentMethodRequest,
    ) -> Result<ProcessorPaymentMethod, GatewayError>;

    /// Charge a customer once.
    async fn charge_customer(&self, request: &ChargeRequest)
        -> Result<ProcessorCharge, GatewayError>;

    /// Verify a webhook signature and translate the body.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::InvalidSignature` when the signature is missing or wrong
    /// and `GatewayError::MalformedPayload` when the body cannot be understood.
    fn verify_and_parse_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<NormalizedEvent, GatewayError>;
}

// ============================================================================
// Registry
// ============================================================================

/// The configured gateways, selected by [`Processor`].
#[derive(Clone)]
pub struct GatewayRegistry {
    gateways: HashMap<Processor, Arc<dyn PaymentGateway>>,
    default_processor: Processor,
}

impl std::fmt::Debug for GatewayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayRegistry")
            .field("processors", &self.processors())
            .field("default_processor", &self.default_processor)
            .finish()
    }
}

impl GatewayRegistry {
    /// An empty registry; gateways are added with [`Self::with_gateway`].
    #[must_use]
    pub fn new(default_processor: Processor) -> Self {
        Self {
            gateways: HashMap::new(),
            default_processor,
        }
    }

    /// Build the gateways named by the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` for an unsupported processor name, a missing secret or a
    /// default processor that is not enabled.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, ConfigError> {
        let enabled = config.enabled_processors()?;
        let default_processor = match &config.default_processor {
            Some(name) => name
                .parse()
                .map_err(|_| ConfigError::UnsupportedProcessor(name.clone()))?,
            None => enabled[0],
        };
        if !enabled.contains(&default_processor) {
            return Err(ConfigError::DefaultNotEnabled(default_processor));
        }

        let mut registry = Self::new(default_processor);
        for processor in enabled {
            let gateway: Arc<dyn PaymentGateway> = match processor {
                Processor::Stripe => {
                    let api_key =
                        required(processor, "STRIPE_API_KEY", config.stripe_api_key.as_deref())?;
                    let secret = required(
                        processor,
                        "STRIPE_WEBHOOK_SECRET",
                        config.stripe_webhook_secret.as_deref(),
                    )?;
                    let mut gateway = StripeGateway::new(api_key, secret)
                        .map_err(|e| ConfigError::Client(e.to_string()))?;
                    if let Some(base) = &config.stripe_api_base {
                        gateway = gateway.with_base_url(base);
                    }
                    Arc::new(gateway)
                }
                Processor::Paddle => {
                    let api_key =
                        required(processor, "PADDLE_API_KEY", config.paddle_api_key.as_deref())?;
                    let secret = required(
                        processor,
                        "PADDLE_WEBHOOK_SECRET",
                        config.paddle_webhook_secret.as_deref(),
                    )?;
                    let mut gateway = PaddleGateway::new(api_key, secret)
                        .map_err(|e| ConfigError::Client(e.to_string()))?;
                    if let Some(base) = &config.paddle_api_base {
                        gateway = gateway.with_base_url(base);
                    }
                    Arc::new(gateway)
                }
            };
            tracing::info!(%processor, "Payment processor enabled");
            registry = registry.with_gateway(gateway);
        }
        Ok(registry)
    }

    /// Register (or replace) the gateway of its processor.
    #[must_use]
    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateways.insert(gateway.processor(), gateway);
        self
    }

    /// The gateway of `processor`, if configured.
    #[must_use]
    pub fn get(&self, processor: Processor) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways.get(&processor).cloned()
    }

    /// The gateway new subscriptions are created through.
    #[must_use]
    pub fn default_gateway(&self) -> Option<Arc<dyn PaymentGateway>> {
        self.get(self.default_processor)
    }

    /// The processor new subscriptions are created through.
    #[must_use]
    pub const fn default_processor(&self) -> Processor {
        self.default_processor
    }

    /// Configured processors in canonical order.
    #[must_use]
    pub fn processors(&self) -> Vec<Processor> {
        Processor::ALL
            .into_iter()
            .filter(|p| self.gateways.contains_key(p))
            .collect()
    }
}

fn required<'a>(
    processor: Processor,
    setting: &'static str,
    value: Option<&'a str>,
) -> Result<&'a str, ConfigError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingSecret { processor, setting })
}
