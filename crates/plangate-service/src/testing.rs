//! Shared fixtures for unit tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use plangate_core::{
    BillingPeriod, EventPayload, Feature, Module, NormalizedEvent, Plan, PlanFeature, Processor,
    SubscriberContext, Subscription, SubscriptionSnapshot, SubscriptionStatus,
};
use plangate_store::Store;

use crate::gateway::{
    ChargeRequest, CustomerRequest, GatewayError, PaymentGateway, PaymentMethodRequest,
    ProcessorCharge, ProcessorCustomer, ProcessorPaymentMethod, SubscriptionRequest,
};

pub struct Plans {
    pub basic: Plan,
    pub pro: Plan,
}

/// Seed `basic` (1000 requests) and `pro` (5000 requests plus SSO). Both share the
/// `api/api-access` quota feature; `white-label` belongs to neither.
pub async fn seed_catalog(store: &dyn Store) -> Plans {
    let module = Module::new("api", "API");
    let api_access = Feature::quota(module.id, "api-access", "API access", 1000, "requests");
    let sso = Feature::binary(module.id, "sso", "Single sign-on");
    let white_label = Feature::binary(module.id, "white-label", "White label");
    let basic = Plan::new("basic", "Basic", 900, BillingPeriod::Monthly).with_sort_order(1);
    let pro = Plan::new("pro", "Pro", 3000, BillingPeriod::Monthly).with_sort_order(2);

    store.put_module(&module).await.unwrap();
    for feature in [&api_access, &sso, &white_label] {
        store.put_feature(feature).await.unwrap();
    }
    store.put_plan(&basic).await.unwrap();
    store.put_plan(&pro).await.unwrap();
    for pf in [
        PlanFeature::included(basic.id, api_access.id),
        PlanFeature::included(pro.id, api_access.id).with_quota(5000),
        PlanFeature::included(pro.id, sso.id),
    ] {
        store.put_plan_feature(&pf).await.unwrap();
    }

    Plans { basic, pro }
}

pub async fn pro_catalog(store: &dyn Store) -> Plan {
    seed_catalog(store).await.pro
}

/// Persist an active Stripe subscription of `user` to `plan`, external id `sub_<user>`.
pub async fn subscribe(store: &dyn Store, plan: &Plan, user: &str) -> Subscription {
    let mut subscription = Subscription::start(
        SubscriberContext::from_user(user),
        plan,
        Processor::Stripe,
        Utc::now(),
    )
    .unwrap();
    subscription.external_id = format!("sub_{user}");
    store.put_subscriptions(&[subscription.clone()]).await.unwrap();
    subscription
}

/// In-process gateway: webhook bodies are `NormalizedEvent` JSON signed with the
/// literal `valid`, and processor calls answer with deterministic snapshots.
#[derive(Default)]
pub struct FakeGateway {
    next_id: AtomicU32,
    calls: Mutex<Vec<String>>,
}

impl FakeGateway {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn snapshot(external_id: &str, status: SubscriptionStatus) -> SubscriptionSnapshot {
    let start = Utc::now();
    SubscriptionSnapshot {
        external_id: external_id.to_string(),
        status,
        current_period_start: start,
        current_period_end: start + Duration::days(30),
        trial_end: None,
        canceled_at: None,
    }
}

pub fn event(event_id: &str, occurred_at: DateTime<Utc>, payload: EventPayload) -> Vec<u8> {
    serde_json::to_vec(&NormalizedEvent {
        event_id: event_id.to_string(),
        event_type: "test.event".to_string(),
        occurred_at,
        payload,
    })
    .unwrap()
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn processor(&self) -> Processor {
        Processor::Stripe
    }

    fn signature_header(&self) -> &'static str {
        "x-test-signature"
    }

    async fn create_customer(
        &self,
        request: &CustomerRequest,
    ) -> Result<ProcessorCustomer, GatewayError> {
        self.record(format!("create_customer {}", request.subscriber));
        Ok(ProcessorCustomer {
            id: format!("cus_{}", request.subscriber.id()),
            email: request.email.clone(),
        })
    }

    async fn create_subscription(
        &self,
        request: &SubscriptionRequest,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        self.record(format!("create_subscription {} {}", request.customer_id, request.plan_slug));
        let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut created = snapshot(&format!("sub_fake_{n}"), SubscriptionStatus::Active);
        if request.trial_period_days > 0 {
            created.status = SubscriptionStatus::Trialing;
            created.trial_end = Some(
                created.current_period_start + Duration::days(i64::from(request.trial_period_days)),
            );
        }
        Ok(created)
    }

    async fn cancel_subscription(
        &self,
        external_id: &str,
        at_period_end: bool,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        self.record(format!("cancel_subscription {external_id} {at_period_end}"));
        if at_period_end {
            return Ok(snapshot(external_id, SubscriptionStatus::Active));
        }
        let mut canceled = snapshot(external_id, SubscriptionStatus::Canceled);
        canceled.canceled_at = Some(Utc::now());
        Ok(canceled)
    }

    async fn update_subscription(
        &self,
        external_id: &str,
        plan_slug: &str,
    ) -> Result<SubscriptionSnapshot, GatewayError> {
        self.record(format!("update_subscription {external_id} {plan_slug}"));
        Ok(snapshot(external_id, SubscriptionStatus::Active))
    }

    async fn get_subscription(
        &self,
        _external_id: &str,
    ) -> Result<Option<SubscriptionSnapshot>, GatewayError> {
        Ok(None)
    }

    async fn create_payment_method(
        &self,
        _request: &PaymentMethodRequest,
    ) -> Result<ProcessorPaymentMethod, GatewayError> {
        Err(GatewayError::Unsupported {
            processor: Processor::Stripe,
            operation: "create_payment_method",
        })
    }

    async fn charge_customer(
        &self,
        _request: &ChargeRequest,
    ) -> Result<ProcessorCharge, GatewayError> {
        Err(GatewayError::Unsupported {
            processor: Processor::Stripe,
            operation: "charge_customer",
        })
    }

    fn verify_and_parse_webhook(
        &self,
        payload: &[u8],
        signature: Option<&str>,
    ) -> Result<NormalizedEvent, GatewayError> {
        if signature != Some("valid") {
            return Err(GatewayError::InvalidSignature);
        }
        serde_json::from_slice(payload).map_err(|e| GatewayError::MalformedPayload(e.to_string()))
    }
}
