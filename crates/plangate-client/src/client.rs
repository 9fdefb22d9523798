//! Plangate HTTP client implementation.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;

use plangate_core::{Customer, Processor, SubscriberContext, Subscription};

use crate::error::ClientError;
use crate::types::{
    ApiErrorResponse, CustomerDetails, FeatureCheck, PlanChange, PlanView, SubscriptionSummary,
    UsageRequest, UsageResponse,
};

/// Plangate API client.
///
/// Authenticates every call with the service API key.
#[derive(Debug, Clone)]
pub struct PlangateClient {
    client: Client,
    base_url: String,
    api_key: String,
    service_name: String,
}

impl PlangateClient {
    /// Create a new plangate client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the plangate service (e.g., `"http://plangate:8080"`)
    /// * `api_key` - Service API key for authentication
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Self::with_options(base_url, api_key, ClientOptions::default())
    }

    /// Create a new plangate client with custom options.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::Configuration` if the HTTP client cannot be built.
    pub fn with_options(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()
            .map_err(|e| ClientError::Configuration(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            service_name: options.service_name,
        })
    }

    // ========================================================================
    // Entitlements
    // ========================================================================

    /// Check a feature, e.g. `sso` or `api/api-access`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn check_feature(
        &self,
        subscriber: &SubscriberContext,
        feature: &str,
    ) -> Result<FeatureCheck, ClientError> {
        let path = format!("/v1/subscribers/{subscriber}/features/{feature}");
        self.send(self.request(Method::GET, &path)).await
    }

    /// Whether the subscriber may use a feature now.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn has_feature(
        &self,
        subscriber: &SubscriberContext,
        feature: &str,
    ) -> Result<bool, ClientError> {
        Ok(self.check_feature(subscriber, feature).await?.entitled)
    }

    /// Record `delta` units of a quota feature.
    ///
    /// # Errors
    ///
    /// Returns `ClientError::NotEntitled` if the subscriber may not use the feature.
    pub async fn record_usage(
        &self,
        subscriber: &SubscriberContext,
        feature: &str,
        delta: u64,
    ) -> Result<UsageResponse, ClientError> {
        let path = format!("/v1/subscribers/{subscriber}/usage");
        let request = UsageRequest {
            feature: feature.to_string(),
            delta,
        };
        self.send(self.request(Method::POST, &path).json(&request))
            .await
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// The subscriber's current subscription, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn subscription(
        &self,
        subscriber: &SubscriberContext,
    ) -> Result<Option<SubscriptionSummary>, ClientError> {
        let path = format!("/v1/subscribers/{subscriber}/subscription");
        match self.send(self.request(Method::GET, &path)).await {
            Ok(summary) => Ok(Some(summary)),
            Err(ClientError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Subscribe to a plan through `processor`, or the service default.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn subscribe(
        &self,
        subscriber: &SubscriberContext,
        plan: &str,
        processor: Option<Processor>,
    ) -> Result<Subscription, ClientError> {
        let path = format!("/v1/subscribers/{subscriber}/subscription");
        let body = json!({ "plan": plan, "processor": processor });
        self.send(self.request(Method::POST, &path).json(&body))
            .await
    }

    /// Cancel the current subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn cancel(
        &self,
        subscriber: &SubscriberContext,
        at_period_end: bool,
    ) -> Result<Subscription, ClientError> {
        let path = format!("/v1/subscribers/{subscriber}/subscription/cancel");
        let body = json!({ "at_period_end": at_period_end });
        self.send(self.request(Method::POST, &path).json(&body))
            .await
    }

    /// Move the active subscription to another plan.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn change_plan(
        &self,
        subscriber: &SubscriberContext,
        plan: &str,
    ) -> Result<PlanChange, ClientError> {
        let path = format!("/v1/subscribers/{subscriber}/subscription/change");
        self.send(self.request(Method::POST, &path).json(&json!({ "plan": plan })))
            .await
    }

    // ========================================================================
    // Catalog and customers
    // ========================================================================

    /// Active plans in display order.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn list_plans(&self) -> Result<Vec<PlanView>, ClientError> {
        self.send(self.request(Method::GET, "/v1/plans")).await
    }

    /// Make sure the subscriber has a billing profile.
    ///
    /// Call when a user or tenant is created; existing profiles are returned unchanged.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn ensure_customer(
        &self,
        subscriber: &SubscriberContext,
        details: &CustomerDetails,
    ) -> Result<Customer, ClientError> {
        let mut body = serde_json::to_value(details)?;
        body["subscriber"] = json!(subscriber.key());
        self.send(self.request(Method::POST, "/v1/customers").json(&body))
            .await
    }

    // ========================================================================
    // Transport
    // ========================================================================

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("x-service-name", &self.service_name)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => {
                let body = api_error.error;
                tracing::debug!(code = %body.code, status = status.as_u16(), "plangate API error");

                let code = body.code.as_str();

                // Map specific error codes to typed errors
                match code {
                    "not_entitled" => {
                        let detail = |key: &str| {
                            body.details
                                .as_ref()
                                .and_then(|d| d.get(key))
                                .and_then(serde_json::Value::as_str)
                                .unwrap_or_default()
                                .to_string()
                        };
                        Err(ClientError::NotEntitled {
                            feature: detail("feature"),
                            reason: detail("reason"),
                        })
                    }
                    "not_found" => Err(ClientError::NotFound(body.message)),
                    _ => Err(ClientError::Api {
                        code: code.to_string(),
                        message: body.message,
                        status: status.as_u16(),
                    }),
                }
            }
            Err(_) if status == StatusCode::NOT_FOUND => {
                Err(ClientError::NotFound(format!("HTTP {status}")))
            }
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 30).
    pub timeout_seconds: u64,
    /// Service name to include in requests.
    pub service_name: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            service_name: "unknown".to_string(),
        }
    }
}

impl ClientOptions {
    /// Create options with a service name.
    #[must_use]
    pub fn with_service_name(name: impl Into<String>) -> Self {
        Self {
            service_name: name.into(),
            ..Self::default()
        }
    }
}
