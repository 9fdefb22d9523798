//! Client error types.

/// Errors that can occur when using the plangate client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server returned an error response.
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code.
        code: String,
        /// Error message.
        message: String,
        /// HTTP status code.
        status: u16,
    },

    /// The subscriber may not use the feature.
    #[error("not entitled to {feature}: {reason}")]
    NotEntitled {
        /// Feature slug.
        feature: String,
        /// Deny reason, e.g. `no_active_subscription`.
        reason: String,
    },

    /// The resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Configuration(String),
}
