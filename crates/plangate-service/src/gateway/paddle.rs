//! Paddle Billing adapter.
//!
//! Subscriptions are created by Paddle checkout on the client side, so this adapter
//! only manages existing ones. Webhooks carry a `Paddle-Signature: ts=<unix>;h1=<hex>`
//! header computed as HMAC-SHA256(secret, "<ts>:<body>").

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::json;

use plangate_core::{
    EventPayload, InvoiceNotice, InvoiceStatus, NormalizedEvent, PaymentNotice, Processor,
    SubscriptionDeletion, SubscriptionSnapshot, SubscriptionStatus,
};

use super::signature::{constant_time_eq, header_pairs, hmac_sha256_hex, within_tolerance};
use super::{
    ChargeRequest, CustomerRequest, GatewayError, PaymentGateway, PaymentMethodRequest,
    ProcessorCharge, ProcessorCustomer, ProcessorPaymentMethod, SubscriptionRequest,
};

/// Paddle API base URL.
const DEFAULT_BASE_URL: &str = "https://api.paddle.com";

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Paddle gateway.
#[derive(Debug, Clone)]
pub struct PaddleGateway {
    client: Client,
    api_key: String,
    webhook_secret: String,
    base_url: String,
}

impl PaddleGateway {
    /// Create a new Paddle gateway.
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

    /// Point the gateway at another API base URL (e.g. the sandbox).
    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn verify_signature(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), GatewayError> {
        let header = header.ok_or(GatewayError::InvalidSignature)?;

        let mut timestamp: Option<&str> = None;
        let mut signatures: Vec<&str> = Vec::new();
        for (key, value) in header_pairs(header, ';') {
            match key {
                "ts" => timestamp = Some(value),
                "h1" => signatures.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(GatewayError::InvalidSignature)?;
        let signed_at: i64 = timestamp
            .parse()
            .map_err(|_| GatewayError::InvalidSignature)?;
        if !within_tolerance(now.timestamp(), signed_at, SIGNATURE_TOLERANCE_SECS) {
            tracing::warn!(signed_at, "Paddle webhook signature outside tolerance");
            return Err(GatewayError::InvalidSignature);
        }

        let expected =
            hmac_sha256_hex(&self.webhook_secret, &[timestamp.as_bytes(), b":", payload]);
        if signatures.iter().any(|sig| constant_time_eq(&expected, sig)) {
            Ok(())
        } else {
            Err(GatewayError::InvalidSignature)
        }
    }

    fn parse_event(payload: &[u8]) -> Result<NormalizedEvent, GatewayError> {
        let event: PaddleEvent = serde_json::from_slice(payload)
            .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;

        let payload = match event.event_type.as_str() {
            "subscription.created"
            | "subscription.updated"
            | "subscription.activated"
            | "subscription.trialing"
            | "subscription.past_due"
            | "subscription.paused"
            | "subscription.resumed" => {
                let subscription: PaddleSubscription = object(event.data)?;
                EventPayload::SubscriptionUpdated(subscription.into_snapshot(event.occurred_at)?)
            }
            "subscription.canceled" => {
                let subscription: PaddleSubscription = object(event.data)?;
                EventPayload::SubscriptionDeleted(SubscriptionDeletion {
                    external_id: subscription.id,
                    canceled_at: subscription.canceled_at,
                })
            }
            "transaction.completed" => {
                let transaction: PaddleTransaction = object(event.data)?;
                EventPayload::PaymentSucceeded(transaction.into_notice(true)?)
            }
            "transaction.payment_failed" => {
                let transaction: PaddleTransaction = object(event.data)?;
                EventPayload::PaymentFailed(transaction.into_notice(false)?)
            }
            _ => EventPayload::Unhandled,
        };

        Ok(NormalizedEvent {
            event_id: event.event_id,
            event_type: event.event_type,
            occurred_at: event.occurred_at,
            payload,
        })
    }

    async fn request<T: serde::de::DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> Result<T, GatewayError> {
        let mut request = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .bearer_auth(&self.api_key);
        if let Some(body) = body {
            request = request.json(&body);
        }
        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            let envelope: PaddleEnvelope<T> = response.json().await?;
            return Ok(envelope.data);
        }

        let error_body: Result<PaddleErrorResponse, _> = response.json().await;
        let (code, message) = match error_body {
            Ok(body) => (body.error.code, body.error.detail),
            Err(_) => (None, format!("HTTP {status}")),
        };
        Err(GatewayError::Api {
            processor: Processor::Paddle,
            status: status.as_u16(),
            code,
            message,
        })
    }

    fn unsupported(operation: &'static str) -> GatewayError {
        GatewayError::Unsupported {
            processor: Processor::Paddle,
            operation,
        }
    }
}

#[async_trait]
impl PaymentGateway for PaddleGateway {
    fn processor(&self) -> Processor {
        Processor::Paddle
    }

    fn signature_header(&self) -> &'static str {
        "paddle-signature"
    }

    async fn create_customer(
        &self,
        request: &CustomerRequest,
    ) -> Result<ProcessorCustomer, GatewayError> {
        let email = request.email.as_deref().ok_or_else(|| {
            GatewayError::InvalidRequest("Paddle customers require an email".into())
        })?;
        let body = json!({
            "email": email,
            "name": request.name,
            "custom_data": { "subscriber": request.subscriber.key() },
        });

        let customer: PaddleCustomer = self.request(Method::POST, "/customers", Some(body)).await?;
        tracing::debug!(customer_id = %customer.id, "Created Paddle customer");
        Ok(ProcessorCustomer {
            id: customer.id,
            email: customer.email,
        })
    }

    async fn create_subscription(
        &self,
        _request: &SubscriptionRequest,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        Err(Self::unsupported("create_subscription"))
    }

    async fn cancel_subscription(
        &self,
        external_id: &str,
        at_period_end: bool,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        let effective_from = if at_period_end {
            "next_billing_period"
        } else {
            "immediately"
        };
        let subscription: PaddleSubscription = self
            .request(
                Method::POST,
                &format!("/subscriptions/{external_id}/cancel"),
                Some(json!({ "effective_from": effective_from })),
            )
            .await?;
        subscription.into_snapshot(Utc::now())
    }

    async fn update_subscription(
        &self,
        external_id: &str,
        plan_slug: &str,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        let body = json!({
            "items": [{ "price_id": plan_slug, "quantity": 1 }],
            "proration_billing_mode": "prorated_immediately",
        });
        let subscription: PaddleSubscription = self
            .request(
                Method::PATCH,
                &format!("/subscriptions/{external_id}"),
                Some(body),
            )
            .await?;
        subscription.into_snapshot(Utc::now())
    }

    async fn get_subscription(
        &self,
        external_id: &str,
    ) -> Result<Option<SubscriptionSnapshot>, GatewayError> {
        match self
            .request::<PaddleSubscription>(
                Method::GET,
                &format!("/subscriptions/{external_id}"),
                None,
            )
            .await
        {
            Ok(subscription) => subscription.into_snapshot(Utc::now()).map(Some),
            Err(GatewayError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn create_payment_method(
        &self,
        _request: &PaymentMethodRequest,
    ) -> Result<ProcessorPaymentMethod, GatewayError> {
        Err(Self::unsupported("create_payment_method"))
    }

    async fn charge_customer(
        &self,
        _request: &ChargeRequest,
    ) -> Result<ProcessorCharge, GatewayError> {
        Err(Self::unsupported("charge_customer"))
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

/// Build a `Paddle-Signature` header value for `payload` signed at `timestamp`.
#[must_use]
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let ts = timestamp.to_string();
    let signature = hmac_sha256_hex(secret, &[ts.as_bytes(), b":", payload]);
    format!("ts={ts};h1={signature}")
}

// ============================================================================
// Paddle API types
// ============================================================================

#[derive(Debug, Deserialize)]
struct PaddleEnvelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct PaddleEvent {
    event_id: String,
    event_type: String,
    occurred_at: DateTime<Utc>,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct PaddlePeriod {
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct PaddleSubscriptionItem {
    #[serde(default)]
    trial_dates: Option<PaddlePeriod>,
}

#[derive(Debug, Deserialize)]
struct PaddleSubscription {
    id: String,
    status: String,
    #[serde(default)]
    current_billing_period: Option<PaddlePeriod>,
    #[serde(default)]
    canceled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    items: Vec<PaddleSubscriptionItem>,
}

impl PaddleSubscription {
    /// Paused and canceled subscriptions have no billing period; they collapse to
    /// the empty period at `fallback`.
    fn into_snapshot(self, fallback: DateTime<Utc>) -> Result<SubscriptionSnapshot, GatewayError> {
        let status = match self.status.as_str() {
            "paused" => SubscriptionStatus::PastDue,
            other => other.parse().map_err(|e: plangate_core::BillingError| {
                GatewayError::MalformedPayload(e.to_string())
            })?,
        };
        let (start, end) = self
            .current_billing_period
            .map_or((fallback, fallback), |p| (p.starts_at, p.ends_at));
        let trial_end = self
            .items
            .iter()
            .find_map(|item| item.trial_dates.as_ref().map(|t| t.ends_at));

        Ok(SubscriptionSnapshot {
            external_id: self.id,
            status,
            current_period_start: start,
            current_period_end: end,
            trial_end,
            canceled_at: self.canceled_at,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PaddleTotals {
    grand_total: String,
}

#[derive(Debug, Deserialize)]
struct PaddleTransactionDetails {
    totals: PaddleTotals,
}

#[derive(Debug, Deserialize)]
struct PaddlePaymentAttempt {
    #[serde(default)]
    error_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaddleTransaction {
    id: String,
    #[serde(default)]
    subscription_id: Option<String>,
    currency_code: String,
    #[serde(default)]
    invoice_id: Option<String>,
    #[serde(default)]
    invoice_number: Option<String>,
    details: PaddleTransactionDetails,
    #[serde(default)]
    payments: Vec<PaddlePaymentAttempt>,
}

impl PaddleTransaction {
    fn into_notice(self, succeeded: bool) -> Result<PaymentNotice, GatewayError> {
        let total: i64 = self.details.totals.grand_total.parse().map_err(|_| {
            GatewayError::MalformedPayload(format!(
                "invalid grand_total '{}'",
                self.details.totals.grand_total
            ))
        })?;
        let currency = self.currency_code.to_ascii_uppercase();
        let paid = if succeeded { total } else { 0 };
        let failure_code = self.payments.into_iter().find_map(|p| p.error_code);

        let invoice = self.invoice_id.map(|external_id| InvoiceNotice {
            external_id,
            number: self.invoice_number,
            status: if succeeded {
                InvoiceStatus::Paid
            } else {
                InvoiceStatus::Open
            },
            total_minor: total,
            amount_paid_minor: paid,
            amount_due_minor: total - paid,
            currency: currency.clone(),
        });

        Ok(PaymentNotice {
            external_id: self.id,
            subscription_external_id: self.subscription_id,
            amount_minor: total,
            currency,
            failure_message: failure_code.clone(),
            failure_code,
            invoice,
        })
    }
}

#[derive(Debug, Deserialize)]
struct PaddleCustomer {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PaddleErrorResponse {
    error: PaddleErrorBody,
}

#[derive(Debug, Deserialize)]
struct PaddleErrorBody {
    #[serde(default)]
    code: Option<String>,
    detail: String,
}

fn object<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> Result<T, GatewayError> {
    serde_json::from_value(value).map_err(|e| GatewayError::MalformedPayload(e.to_string()))
}
