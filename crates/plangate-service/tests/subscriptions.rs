//! Subscription lifecycle integration tests against a mocked Stripe API.

mod common;

use axum::http::StatusCode;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{config, stripe_subscription, TestHarness};
use plangate_core::{SubscriberContext, SubscriptionStatus};
use plangate_service::ServiceConfig;

/// Stripe mock answering customer creation and subscription reads.
async fn stripe_mock() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/customers"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cus_test_1",
            "object": "customer",
            "email": null
        })))
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/subscriptions/sub_test_1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(stripe_subscription("sub_test_1", "active")),
        )
        .mount(&server)
        .await;

    server
}

async fn harness(stripe: &MockServer) -> TestHarness {
    TestHarness::with_config(ServiceConfig {
        stripe_api_base: Some(stripe.uri()),
        ..config()
    })
    .await
}

async fn subscribe(harness: &TestHarness, stripe: &MockServer, plan: &str) -> Value {
    Mock::given(method("POST"))
        .and(path("/subscriptions"))
        .and(body_string_contains("customer=cus_test_1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(stripe_subscription("sub_test_1", "active")),
        )
        .up_to_n_times(1)
        .mount(stripe)
        .await;

    let response = harness
        .post("/v1/subscribers/user:alice/subscription")
        .json(&json!({ "plan": plan }))
        .await;
    response.assert_status(StatusCode::CREATED);
    response.json()
}

// ============================================================================
// Subscribe
// ============================================================================

#[tokio::test]
async fn subscribe_creates_customer_and_subscription() {
    let stripe = stripe_mock().await;
    let harness = harness(&stripe).await;

    let subscription = subscribe(&harness, &stripe, "pro").await;
    assert_eq!(subscription["status"], "active");
    assert_eq!(subscription["external_id"], "sub_test_1");
    assert_eq!(subscription["processor"], "stripe");

    let customer = harness
        .store
        .get_customer(&SubscriberContext::from_user("alice"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        customer.processor_customer_ids.values().next().map(String::as_str),
        Some("cus_test_1")
    );

    let summary: Value = harness
        .get("/v1/subscribers/user:alice/subscription")
        .await
        .json();
    assert_eq!(summary["plan_slug"], "pro");
    assert_eq!(summary["is_active"], true);
    assert_eq!(summary["is_trial"], false);
    assert!(summary["features"]
        .as_array()
        .unwrap()
        .iter()
        .any(|f| f == "sso"));
}

#[tokio::test]
async fn second_subscribe_conflicts() {
    let stripe = stripe_mock().await;
    let harness = harness(&stripe).await;
    subscribe(&harness, &stripe, "basic").await;

    harness
        .post("/v1/subscribers/user:alice/subscription")
        .json(&json!({ "plan": "pro" }))
        .await
        .assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn unknown_plan_and_processor_are_rejected() {
    let stripe = stripe_mock().await;
    let harness = harness(&stripe).await;

    harness
        .post("/v1/subscribers/user:alice/subscription")
        .json(&json!({ "plan": "enterprise" }))
        .await
        .assert_status(StatusCode::NOT_FOUND);

    harness
        .post("/v1/subscribers/user:alice/subscription")
        .json(&json!({ "plan": "pro", "processor": "paypal" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);

    harness
        .post("/v1/subscribers/user:alice/subscription")
        .json(&json!({ "plan": "pro", "processor": "paddle" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn processor_errors_surface_as_bad_gateway() {
    let stripe = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/customers"))
        .respond_with(ResponseTemplate::new(402).set_body_json(json!({
            "error": { "type": "card_error", "message": "Your card was declined." }
        })))
        .mount(&stripe)
        .await;
    let harness = harness(&stripe).await;

    let response = harness
        .post("/v1/subscribers/user:alice/subscription")
        .json(&json!({ "plan": "pro" }))
        .await;

    response.assert_status(StatusCode::BAD_GATEWAY);
    assert!(harness
        .store
        .list_subscriptions(&SubscriberContext::from_user("alice"))
        .await
        .unwrap()
        .is_empty());
}

// ============================================================================
// Cancel
// ============================================================================

#[tokio::test]
async fn cancel_at_period_end_keeps_access() {
    let stripe = stripe_mock().await;
    let harness = harness(&stripe).await;
    subscribe(&harness, &stripe, "pro").await;

    Mock::given(method("POST"))
        .and(path("/subscriptions/sub_test_1"))
        .and(body_string_contains("cancel_at_period_end=true"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(stripe_subscription("sub_test_1", "active")),
        )
        .expect(1)
        .mount(&stripe)
        .await;

    let subscription: Value = harness
        .post("/v1/subscribers/user:alice/subscription/cancel")
        .json(&json!({}))
        .await
        .json();
    assert_eq!(subscription["status"], "active");

    let check: Value = harness
        .get("/v1/subscribers/user:alice/features/sso")
        .await
        .json();
    assert_eq!(check["entitled"], true);
}

#[tokio::test]
async fn immediate_cancel_revokes_access() {
    let stripe = stripe_mock().await;
    let harness = harness(&stripe).await;
    subscribe(&harness, &stripe, "pro").await;

    let mut canceled = stripe_subscription("sub_test_1", "canceled");
    canceled["canceled_at"] = json!(Utc::now().timestamp());
    Mock::given(method("DELETE"))
        .and(path("/subscriptions/sub_test_1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(canceled))
        .expect(1)
        .mount(&stripe)
        .await;

    let subscription: Value = harness
        .post("/v1/subscribers/user:alice/subscription/cancel")
        .json(&json!({ "at_period_end": false }))
        .await
        .json();
    assert_eq!(subscription["status"], "canceled");
    assert!(subscription["canceled_at"].is_string());

    let check: Value = harness
        .get("/v1/subscribers/user:alice/features/sso")
        .await
        .json();
    assert_eq!(check["entitled"], false);

    harness
        .post("/v1/subscribers/user:alice/subscription/cancel")
        .json(&json!({ "at_period_end": false }))
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

// ============================================================================
// Plan changes
// ============================================================================

#[tokio::test]
async fn upgrade_supersedes_the_old_row() {
    let stripe = stripe_mock().await;
    let harness = harness(&stripe).await;
    subscribe(&harness, &stripe, "basic").await;

    Mock::given(method("POST"))
        .and(path("/subscriptions/sub_test_1"))
        .and(body_string_contains("proration_behavior=create_prorations"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(stripe_subscription("sub_test_1", "active")),
        )
        .expect(1)
        .mount(&stripe)
        .await;

    let response = harness
        .post("/v1/subscribers/user:alice/subscription/change")
        .json(&json!({ "plan": "pro" }))
        .await;
    response.assert_status_ok();
    let change: Value = response.json();

    assert_eq!(change["previous"]["status"], "canceled");
    assert_eq!(change["previous"]["superseded_by"], change["subscription"]["id"]);
    assert_eq!(change["subscription"]["status"], "active");
    assert_eq!(change["subscription"]["external_id"], "sub_test_1");
    // (3000 - 900) over a 30-day month, 29 or 30 days left.
    let proration = change["proration_minor"].as_i64().unwrap();
    assert!((1800..=2100).contains(&proration), "proration {proration}");

    let summary: Value = harness
        .get("/v1/subscribers/user:alice/subscription")
        .await
        .json();
    assert_eq!(summary["plan_slug"], "pro");

    // Webhooks for the processor subscription now land on the new row.
    let found = harness
        .store
        .find_subscription_by_external_id(plangate_core::Processor::Stripe, "sub_test_1")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id.to_string(), change["subscription"]["id"].as_str().unwrap());
}

#[tokio::test]
async fn changing_to_the_same_plan_conflicts() {
    let stripe = stripe_mock().await;
    let harness = harness(&stripe).await;
    subscribe(&harness, &stripe, "pro").await;

    harness
        .post("/v1/subscribers/user:alice/subscription/change")
        .json(&json!({ "plan": "pro" }))
        .await
        .assert_status(StatusCode::CONFLICT);
}

// ============================================================================
// Customers and expiry
// ============================================================================

#[tokio::test]
async fn ensure_customer_keeps_the_first_profile() {
    let harness = TestHarness::new().await;

    let first: Value = harness
        .post("/v1/customers")
        .json(&json!({ "subscriber": "tenant:acme", "billing_email": "billing@acme.test" }))
        .await
        .json();
    let second: Value = harness
        .post("/v1/customers")
        .json(&json!({ "subscriber": "tenant:acme", "billing_email": "other@acme.test" }))
        .await
        .json();

    assert_eq!(first["billing_email"], "billing@acme.test");
    assert_eq!(second["billing_email"], "billing@acme.test");
}

#[tokio::test]
async fn expire_sweep_moves_lapsed_periods_to_past_due() {
    let harness = TestHarness::new().await;
    let mut lapsed = harness.seed_subscription("user:alice", "pro", "sub_1").await;
    lapsed.current_period_start = Utc::now() - Duration::days(40);
    lapsed.current_period_end = Utc::now() - Duration::days(10);
    harness
        .store
        .put_subscriptions(std::slice::from_ref(&lapsed))
        .await
        .unwrap();
    let current = harness.seed_subscription("user:bob", "pro", "sub_2").await;

    let response = harness.post("/v1/admin/expire").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["expired"], json!([lapsed.id.to_string()]));

    assert_eq!(
        harness.subscription(&lapsed.id).await.status,
        SubscriptionStatus::PastDue
    );
    assert_eq!(
        harness.subscription(&current.id).await.status,
        SubscriptionStatus::Active
    );
}

#[tokio::test]
async fn analytics_report_revenue_churn_and_usage() {
    let harness = TestHarness::new().await;
    let mut alice = harness.seed_subscription("user:alice", "pro", "sub_1").await;
    let mut bob = harness.seed_subscription("user:bob", "basic", "sub_2").await;
    harness.seed_subscription("user:carol", "pro", "sub_3").await;

    alice.created_at = Utc::now() - Duration::days(60);
    bob.created_at = Utc::now() - Duration::days(60);
    bob.status = SubscriptionStatus::Canceled;
    bob.canceled_at = Some(Utc::now() - Duration::days(5));
    harness
        .store
        .put_subscriptions(&[alice, bob])
        .await
        .unwrap();
    harness
        .post("/v1/subscribers/user:alice/usage")
        .json(&json!({ "feature": "api-access", "delta": 40 }))
        .await
        .assert_status_ok();

    let response = harness.get("/v1/admin/analytics?days=30").await;
    response.assert_status_ok();
    let report: Value = response.json();
    assert_eq!(report["window_days"], 30);
    assert_eq!(report["mrr"], json!({ "USD": 6000 }));
    assert_eq!(report["churn"]["count"], 1);
    assert_eq!(report["churn"]["total"], 2);
    assert_eq!(report["churn"]["percent"], 50.0);
    assert_eq!(report["trial_conversion"]["total"], 0);
    assert_eq!(
        report["feature_usage"],
        json!([{
            "feature": "api/api-access",
            "total_usage": 40,
            "records": 1,
            "average_usage": 40,
            "unique_subscribers": 1
        }])
    );
}

#[tokio::test]
async fn analytics_window_must_be_positive() {
    let harness = TestHarness::new().await;
    let response = harness.get("/v1/admin/analytics?days=0").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = harness.server.get("/v1/admin/analytics").await;
    response.assert_status(StatusCode::UNAUTHORIZED);
}
