//! Service configuration.

use std::path::Path;

use serde::Deserialize;

use plangate_core::{Processor, DEFAULT_CURRENCY};

use crate::catalog::CatalogDefaults;
use crate::reconciler::WebhookOrdering;

/// Configuration errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A configured processor name is not supported.
    #[error("unsupported payment processor: {0}")]
    UnsupportedProcessor(String),

    /// A processor is enabled without one of its secrets.
    #[error("{processor} is enabled but {setting} is not set")]
    MissingSecret {
        /// The processor.
        processor: Processor,
        /// The missing environment variable.
        setting: &'static str,
    },

    /// The default processor is not among the enabled ones.
    #[error("default processor {0} is not enabled")]
    DefaultNotEnabled(Processor),

    /// No processor is enabled.
    #[error("no payment processor enabled")]
    NoProcessors,

    /// An HTTP client could not be built.
    #[error("http client: {0}")]
    Client(String),
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Path to `RocksDB` data directory (default: "/data/plangate").
    pub data_dir: String,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// Enabled payment processors by name (default: "stripe").
    pub payment_processors: Vec<String>,

    /// Processor used for new subscriptions (default: first enabled).
    pub default_processor: Option<String>,

    /// Stripe API key.
    pub stripe_api_key: Option<String>,

    /// Stripe webhook signing secret.
    pub stripe_webhook_secret: Option<String>,

    /// Stripe API base URL override.
    pub stripe_api_base: Option<String>,

    /// Paddle API key.
    pub paddle_api_key: Option<String>,

    /// Paddle webhook secret.
    pub paddle_webhook_secret: Option<String>,

    /// Paddle API base URL override (e.g. the sandbox).
    pub paddle_api_base: Option<String>,

    /// How out-of-order subscription updates are treated.
    pub webhook_ordering: WebhookOrdering,

    /// Currency of catalog plans that do not name one.
    pub default_currency: String,

    /// Trial length of catalog plans that do not set one.
    pub trial_period_days: u32,

    /// JSON catalog file imported at startup.
    pub catalog_path: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,
}

/// Processor secrets file structure (`.secrets/<processor>.json`).
#[derive(Debug, Deserialize)]
struct ProcessorSecrets {
    api_key: String,
    #[serde(default)]
    webhook_secret: Option<String>,
}

impl ServiceConfig {
    /// Load configuration from environment variables and secrets files.
    #[must_use]
    pub fn from_env() -> Self {
        let (stripe_api_key, stripe_webhook_secret) =
            load_processor_secrets(Processor::Stripe, "STRIPE_API_KEY", "STRIPE_WEBHOOK_SECRET");
        let (paddle_api_key, paddle_webhook_secret) =
            load_processor_secrets(Processor::Paddle, "PADDLE_API_KEY", "PADDLE_WEBHOOK_SECRET");

        let webhook_ordering = match std::env::var("WEBHOOK_ORDERING") {
            Ok(value) => value.parse().unwrap_or_else(|_| {
                tracing::warn!(value = %value, "Unknown WEBHOOK_ORDERING, using processing_order");
                WebhookOrdering::default()
            }),
            Err(_) => WebhookOrdering::default(),
        };

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            data_dir: std::env::var("DATA_DIR").unwrap_or_else(|_| "/data/plangate".into()),
            service_api_key: std::env::var("SERVICE_API_KEY").ok(),
            payment_processors: split_list(
                &std::env::var("PAYMENT_PROCESSORS").unwrap_or_else(|_| "stripe".into()),
            ),
            default_processor: std::env::var("DEFAULT_PROCESSOR").ok(),
            stripe_api_key,
            stripe_webhook_secret,
            stripe_api_base: std::env::var("STRIPE_API_BASE").ok(),
            paddle_api_key,
            paddle_webhook_secret,
            paddle_api_base: std::env::var("PADDLE_API_BASE").ok(),
            webhook_ordering,
            default_currency: std::env::var("DEFAULT_CURRENCY")
                .unwrap_or_else(|_| DEFAULT_CURRENCY.into()),
            trial_period_days: std::env::var("TRIAL_PERIOD_DAYS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(14),
            catalog_path: std::env::var("CATALOG_PATH").ok(),
            cors_origins: split_list(
                &std::env::var("CORS_ORIGINS").unwrap_or_else(|_| "*".into()),
            ),
            max_body_bytes: std::env::var("MAX_BODY_BYTES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(1024 * 1024), // 1MB
            request_timeout_seconds: std::env::var("REQUEST_TIMEOUT_SECONDS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(30),
        }
    }

    /// Defaults applied to imported plans.
    #[must_use]
    pub fn catalog_defaults(&self) -> CatalogDefaults {
        CatalogDefaults {
            currency: self.default_currency.clone(),
            trial_period_days: self.trial_period_days,
        }
    }

    /// Enabled processors, in configuration order without duplicates.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnsupportedProcessor` for an unknown name and
    /// `ConfigError::NoProcessors` for an empty list.
    pub fn enabled_processors(&self) -> Result<Vec<Processor>, ConfigError> {
        let mut enabled = Vec::new();
        for name in &self.payment_processors {
            let processor: Processor = name
                .parse()
                .map_err(|_| ConfigError::UnsupportedProcessor(name.clone()))?;
            if !enabled.contains(&processor) {
                enabled.push(processor);
            }
        }
        if enabled.is_empty() {
            return Err(ConfigError::NoProcessors);
        }
        Ok(enabled)
    }
}

/// Load processor secrets from file or environment.
fn load_processor_secrets(
    processor: Processor,
    api_key_var: &str,
    webhook_secret_var: &str,
) -> (Option<String>, Option<String>) {
    let secret_paths = [
        format!(".secrets/{processor}.json"),
        format!("plangate/.secrets/{processor}.json"),
        format!("../.secrets/{processor}.json"),
    ];

    for path in &secret_paths {
        if let Ok(secrets) = load_secrets_file::<ProcessorSecrets>(path) {
            tracing::info!(path = %path, %processor, "Loaded processor secrets from file");
            return (Some(secrets.api_key), secrets.webhook_secret);
        }
    }

    // Fall back to environment variables
    tracing::debug!(%processor, "Secrets file not found, using environment variables");
    (
        std::env::var(api_key_var).ok(),
        std::env::var(webhook_secret_var).ok(),
    )
}

/// Load secrets from a JSON file.
fn load_secrets_file<T: serde::de::DeserializeOwned>(path: &str) -> Result<T, std::io::Error> {
    let path = Path::new(path);
    if !path.exists() {
        return Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "Secrets file not found",
        ));
    }
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            data_dir: "/data/plangate".into(),
            service_api_key: None,
            payment_processors: vec!["stripe".into()],
            default_processor: None,
            stripe_api_key: None,
            stripe_webhook_secret: None,
            stripe_api_base: None,
            paddle_api_key: None,
            paddle_webhook_secret: None,
            paddle_api_base: None,
            webhook_ordering: WebhookOrdering::default(),
            default_currency: DEFAULT_CURRENCY.into(),
            trial_period_days: 14,
            catalog_path: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
        }
    }
}
