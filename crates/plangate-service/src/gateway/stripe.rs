//! Stripe adapter.
//!
//! REST calls use form encoding with basic auth. Webhooks carry a
//! `Stripe-Signature: t=<unix>,v1=<hex>` header computed as
//! HMAC-SHA256(secret, "<t>.<body>").

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;

use plangate_core::{
    EventPayload, InvoiceNotice, InvoiceStatus, NormalizedEvent, PaymentNotice, PaymentStatus,
    Processor, SubscriptionDeletion, SubscriptionSnapshot, SubscriptionStatus,
};

use super::signature::{constant_time_eq, header_pairs, hmac_sha256_hex, within_tolerance};
use super::{
    ChargeRequest, CustomerRequest, GatewayError, PaymentGateway, PaymentMethodRequest,
    ProcessorCharge, ProcessorCustomer, ProcessorPaymentMethod, SubscriptionRequest,
};

/// Stripe API base URL.
const DEFAULT_BASE_URL: &str = "https://api.stripe.com/v1";

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Stripe gateway.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: Client,
    api_key: String,
    webhook_secret: String,
    base_url: String,
}

impl StripeGateway {
    /// Create a new Stripe gateway.
    ///
    /// # Arguments
    ///
    /// * `api_key` - Stripe secret API key (`sk_test_...` or `sk_live_...`)
    /// * `webhook_secret` - Webhook signing secret (`whsec_...`)
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        api_key: impl Into<String>,
        webhook_secret: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let client = Client::builder().timeout(Duration::from_secs(30)).build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            webhook_secret: webhook_secret.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        })
    }

    /// Point the gateway at another API base URL.
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Check a `Stripe-Signature` header against the payload at `now`.
    fn verify_signature(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let header = header.ok_or(GatewayError::InvalidSignature)?;

        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();
        for (key, value) in header_pairs(header, ',') {
            match key {
                "t" => timestamp = Some(value),
                "v1" => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(GatewayError::InvalidSignature)?;
        let signed_at: i64 = timestamp
            .parse()
            .map_err(|_| GatewayError::InvalidSignature)?;
        if !within_tolerance(now.timestamp(), signed_at, SIGNATURE_TOLERANCE_SECS) {
            tracing::warn!(signed_at, "Stripe webhook signature outside tolerance");
            return Err(GatewayError::InvalidSignature);
        }

        let expected =
            hmac_sha256_hex(&self.webhook_secret, &[timestamp.as_bytes(), b".", payload]);
        if signatures.iter().any(|sig| constant_time_eq(&expected, sig)) {
            Ok(())
        } else {
            Err(GatewayError::InvalidSignature)
        }
    }

    /// Translate a verified Stripe event body.
    fn parse_event(payload: &[u8]) -> Result<NormalizedEvent, GatewayError> {
        let event: StripeEvent = serde_json::from_slice(payload)
            .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;
        let occurred_at = timestamp(event.created)?;

        let payload = match event.event_type.as_str() {
            "customer.subscription.created"
            | "customer.subscription.updated"
            | "customer.subscription.paused"
            | "customer.subscription.resumed" => {
                let subscription: StripeSubscription = object(event.data.object)?;
                EventPayload::SubscriptionUpdated(subscription.into_snapshot()?)
            }
            "customer.subscription.deleted" => {
                let subscription: StripeSubscription = object(event.data.object)?;
                EventPayload::SubscriptionDeleted(SubscriptionDeletion {
                    canceled_at: optional_timestamp(
                        subscription.canceled_at.or(subscription.ended_at),
                    )?,
                    external_id: subscription.id,
                })
            }
            "invoice.payment_succeeded" => {
                let invoice: StripeInvoice = object(event.data.object)?;
                EventPayload::PaymentSucceeded(invoice.into_notice(true))
            }
            "invoice.payment_failed" => {
                let invoice: StripeInvoice = object(event.data.object)?;
                EventPayload::PaymentFailed(invoice.into_notice(false))
            }
            _ => EventPayload::Unhandled,
        };

        Ok(NormalizedEvent {
            event_id: event.id,
            event_type: event.event_type,
            occurred_at,
            payload,
        })
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
    ) -> Result<T, GatewayError> {
        let mut request = self
            .client
            .request(method.clone(), format!("{}{path}", self.base_url))
            .basic_auth(&self.api_key, Option::<&str>::None);
        if method != Method::GET && !params.is_empty() {
            request = request.form(params);
        }
        let response = request.send().await?;
        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();

        if status.is_success() {
            return Ok(response.json().await?);
        }

        let error_body: Result<StripeErrorResponse, _> = response.json().await;
        let (code, message) = match error_body {
            Ok(body) => (
                body.error.code,
                body.error
                    .message
                    .or(body.error.error_type)
                    .unwrap_or_else(|| format!("HTTP {status}")),
            ),
            Err(_) => (None, format!("HTTP {status}")),
        };
        Err(GatewayError::Api {
            processor: Processor::Stripe,
            status: status.as_u16(),
            code,
            message,
        })
    }

    async fn fetch_subscription(
        &self,
        external_id: &str,
    ) -> Result<Option<StripeSubscription>, GatewayError> {
        match self
            .request(Method::GET, &format!("/subscriptions/{external_id}"), &[])
            .await
        {
            Ok(subscription) => Ok(Some(subscription)),
            Err(GatewayError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn processor(&self) -> Processor {
        Processor::Stripe
    }

    fn signature_header(&self) -> &'static str {
        "stripe-signature"
    }

    async fn create_customer(
        &self,
        request: &CustomerRequest,
    ) -> Result<ProcessorCustomer, GatewayError> {
        let mut params = vec![("metadata[subscriber]", request.subscriber.key())];
        if let Some(email) = &request.email {
            params.push(("email", email.clone()));
        }
        if let Some(name) = &request.name {
            params.push(("name", name.clone()));
        }

        let customer: StripeCustomer = self.request(Method::POST, "/customers", &params).await?;
        tracing::debug!(customer_id = %customer.id, "Created Stripe customer");
        Ok(ProcessorCustomer {
            id: customer.id,
            email: customer.email,
        })
    }

    async fn create_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        let mut params = vec![
            ("customer", request.customer_id.clone()),
            ("items[0][price]", request.plan_slug.clone()),
        ];
        if request.trial_period_days > 0 {
            params.push(("trial_period_days", request.trial_period_days.to_string()));
        }

        let subscription: StripeSubscription =
            self.request(Method::POST, "/subscriptions", &params).await?;
        subscription.into_snapshot()
    }

    async fn cancel_subscription(
        &self,
        external_id: &str,
        at_period_end: bool,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        let path = format!("/subscriptions/{external_id}");
        let subscription: StripeSubscription = if at_period_end {
            self.request(
                Method::POST,
                &path,
                &[("cancel_at_period_end", "true".to_string())],
            )
            .await?
        } else {
            self.request(Method::DELETE, &path, &[]).await?
        };
        subscription.into_snapshot()
    }

    async fn update_subscription(
        &self,
        external_id: &str,
        plan_slug: &str,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        let current = self.fetch_subscription(external_id).await?.ok_or_else(|| {
            GatewayError::InvalidRequest(format!("unknown Stripe subscription {external_id}"))
        })?;
        let item = current.items.data.first().ok_or_else(|| {
            GatewayError::InvalidRequest(format!("subscription {external_id} has no items"))
        })?;

        let params = [
            ("items[0][id]", item.id.clone()),
            ("items[0][price]", plan_slug.to_string()),
            ("proration_behavior", "create_prorations".to_string()),
        ];
        let subscription: StripeSubscription = self
            .request(Method::POST, &format!("/subscriptions/{external_id}"), &params)
            .await?;
        subscription.into_snapshot()
    }

    async fn get_subscription(
        &self,
        external_id: &str,
    ) -> Result<Option<SubscriptionSnapshot>, GatewayError> {
        self.fetch_subscription(external_id)
            .await?
            .map(StripeSubscription::into_snapshot)
            .transpose()
    }

    async fn create_payment_method(
        &self,
        request: &PaymentMethodRequest,
    ) -> Result<ProcessorPaymentMethod, GatewayError> {
        let method: StripePaymentMethod = self
            .request(
                Method::POST,
                &format!("/payment_methods/{}/attach", request.token),
                &[("customer", request.customer_id.clone())],
            )
            .await?;
        Ok(ProcessorPaymentMethod {
            id: method.id,
            kind: method.kind,
        })
    }

    async fn charge_customer(
        &self,
        request: &ChargeRequest,
    ) -> Result<ProcessorCharge, GatewayError> {
        let mut params = vec![
            ("amount", request.amount_minor.to_string()),
            ("currency", request.currency.to_ascii_lowercase()),
            ("customer", request.customer_id.clone()),
            ("confirm", "true".to_string()),
            ("off_session", "true".to_string()),
        ];
        if let Some(method) = &request.payment_method_id {
            params.push(("payment_method", method.clone()));
        }
        if let Some(description) = &request.description {
            params.push(("description", description.clone()));
        }

        let intent: StripePaymentIntent =
            self.request(Method::POST, "/payment_intents", &params).await?;
        Ok(ProcessorCharge {
            status: match intent.status.as_str() {
                "succeeded" => PaymentStatus::Succeeded,
                "canceled" => PaymentStatus::Canceled,
                "requires_payment_method" => PaymentStatus::Failed,
                _ => PaymentStatus::Pending,
            },
            external_id: intent.id,
            amount_minor: intent.amount,
            currency: intent.currency.to_ascii_uppercase(),
        })
    }

    fn verify_and_parse_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<NormalizedEvent, GatewayError> {
        self.verify_signature(payload, signature, Utc::now())?;
        Self::parse_event(payload)
    }
}

/// Build a `Stripe-Signature` header value for `payload` signed at `timestamp`.
#[must_use]
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let t = timestamp.to_string();
    let signature = hmac_sha256_hex(secret, &[t.as_bytes(), b".", payload]);
    format!("t={t},v1={signature}")
}

// ============================================================================
// Stripe API types
// ============================================================================

#[derive(Debug, Deserialize)]
struct StripeEvent {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    created: i64,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
struct StripeList<T> {
    #[serde(default)]
    data: Vec<T>,
}

impl<T> Default for StripeList<T> {
    fn default() -> Self {
        Self { data: Vec::new() }
    }
}

#[derive(Debug, Deserialize)]
struct StripeSubscription {
    id: String,
    status: String,
    #[serde(default)]
    current_period_start: Option<i64>,
    #[serde(default)]
    current_period_end: Option<i64>,
    #[serde(default)]
    trial_end: Option<i64>,
    #[serde(default)]
    canceled_at: Option<i64>,
    #[serde(default)]
    ended_at: Option<i64>,
    #[serde(default)]
    items: StripeList<StripeSubscriptionItem>,
}

#[derive(Debug, Deserialize)]
struct StripeSubscriptionItem {
    id: String,
    #[serde(default)]
    current_period_start: Option<i64>,
    #[serde(default)]
    current_period_end: Option<i64>,
}

impl StripeSubscription {
    fn into_snapshot(self) -> Result<SubscriptionSnapshot, GatewayError> {
        // Newer API versions report periods on the items only.
        let first_item = self.items.data.first();
        let start = self
            .current_period_start
            .or_else(|| first_item.and_then(|i| i.current_period_start))
            .ok_or_else(|| missing("current_period_start"))?;
        let end = self
            .current_period_end
            .or_else(|| first_item.and_then(|i| i.current_period_end))
            .ok_or_else(|| missing("current_period_end"))?;

        Ok(SubscriptionSnapshot {
            status: map_status(&self.status)?,
            current_period_start: timestamp(start)?,
            current_period_end: timestamp(end)?,
            trial_end: optional_timestamp(self.trial_end)?,
            canceled_at: optional_timestamp(self.canceled_at)?,
            external_id: self.id,
        })
    }
}

#[derive(Debug, Deserialize)]
struct StripeInvoice {
    id: String,
    #[serde(default)]
    number: Option<String>,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    total: i64,
    #[serde(default)]
    amount_paid: i64,
    #[serde(default)]
    amount_due: i64,
    currency: String,
    #[serde(default)]
    subscription: Option<String>,
    #[serde(default)]
    payment_intent: Option<String>,
    #[serde(default)]
    charge: Option<String>,
    #[serde(default)]
    last_finalization_error: Option<StripeErrorBody>,
}

impl StripeInvoice {
    fn into_notice(self, succeeded: bool) -> PaymentNotice {
        let status = match self.status.as_deref() {
            Some("draft") => InvoiceStatus::Draft,
            Some("paid") => InvoiceStatus::Paid,
            Some("void") => InvoiceStatus::Void,
            Some("uncollectible") => InvoiceStatus::Uncollectible,
            Some("open") => InvoiceStatus::Open,
            _ if succeeded => InvoiceStatus::Paid,
            _ => InvoiceStatus::Open,
        };
        let currency = self.currency.to_ascii_uppercase();
        let (failure_code, failure_message) = self
            .last_finalization_error
            .map_or((None, None), |e| (e.code, e.message));

        PaymentNotice {
            external_id: self
                .payment_intent
                .clone()
                .or_else(|| self.charge.clone())
                .unwrap_or_else(|| self.id.clone()),
            subscription_external_id: self.subscription,
            amount_minor: if succeeded {
                self.amount_paid
            } else {
                self.amount_due
            },
            currency: currency.clone(),
            failure_code,
            failure_message,
            invoice: Some(InvoiceNotice {
                external_id: self.id,
                number: self.number,
                status,
                total_minor: self.total,
                amount_paid_minor: self.amount_paid,
                amount_due_minor: self.amount_due,
                currency,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StripeCustomer {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripePaymentMethod {
    id: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    status: String,
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct StripeErrorResponse {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    #[serde(rename = "type", default)]
    error_type: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    code: Option<String>,
}

fn object<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, GatewayError> {
    serde_json::from_value(value).map_err(|e| GatewayError::MalformedPayload(e.to_string()))
}

fn missing(field: &str) -> GatewayError {
    GatewayError::MalformedPayload(format!("missing field `{field}`"))
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, GatewayError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| GatewayError::MalformedPayload(format!("timestamp out of range: {secs}")))
}

fn optional_timestamp(secs: Option<i64>) -> Result<Option<DateTime<Utc>>, GatewayError> {
    secs.map(timestamp).transpose()
}

/// Map a Stripe subscription status onto the local status machine.
fn map_status(status: &str) -> Result<SubscriptionStatus, GatewayError> {
    match status {
        "incomplete" | "paused" => Ok(SubscriptionStatus::PastDue),
        "incomplete_expired" => Ok(SubscriptionStatus::Canceled),
        other => other.parse().map_err(|e: plangate_core::BillingError| {
            GatewayError::MalformedPayload(e.to_string())
        }),
    }
}
