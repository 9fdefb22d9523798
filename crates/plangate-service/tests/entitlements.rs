//! Entitlement, usage and catalog integration tests.

mod common;

use std::sync::Arc;

use axum::http::StatusCode;
use serde_json::{json, Value};

use common::{FlakyStore, TestHarness};

// ============================================================================
// Feature checks
// ============================================================================

#[tokio::test]
async fn pro_quota_runs_down_to_zero() {
    let harness = TestHarness::new().await;
    harness.seed_subscription("user:alice", "pro", "sub_1").await;

    let check: Value = harness
        .get("/v1/subscribers/user:alice/features/api-access")
        .await
        .json();
    assert_eq!(check["entitled"], true);
    assert_eq!(check["remaining"], json!({ "kind": "limited", "remaining": 5000 }));

    let response = harness
        .post("/v1/subscribers/user:alice/usage")
        .json(&json!({ "feature": "api-access", "delta": 4990 }))
        .await;
    response.assert_status_ok();
    let usage: Value = response.json();
    assert_eq!(usage["usage_count"], 4990);
    assert_eq!(usage["remaining"], json!({ "kind": "limited", "remaining": 10 }));

    let usage: Value = harness
        .post("/v1/subscribers/user:alice/usage")
        .json(&json!({ "feature": "api-access", "delta": 10 }))
        .await
        .json();
    assert_eq!(usage["remaining"], json!({ "kind": "limited", "remaining": 0 }));

    // Quota exhaustion is reported, not enforced: the feature stays entitled.
    let check: Value = harness
        .get("/v1/subscribers/user:alice/features/api/api-access")
        .await
        .json();
    assert_eq!(check["entitled"], true);
    assert_eq!(check["remaining"], json!({ "kind": "limited", "remaining": 0 }));
}

#[tokio::test]
async fn feature_check_reads_the_catalog_once() {
    let store = Arc::new(FlakyStore::default());
    let harness = TestHarness::with_store(store.clone()).await;
    harness.seed_subscription("user:alice", "pro", "sub_1").await;

    let before = store.catalog_loads();
    let check: Value = harness
        .get("/v1/subscribers/user:alice/features/api-access")
        .await
        .json();
    assert_eq!(check["entitled"], true);
    assert_eq!(store.catalog_loads() - before, 1);
}

#[tokio::test]
async fn basic_plan_lacks_sso() {
    let harness = TestHarness::new().await;
    harness.seed_subscription("tenant:acme", "basic", "sub_1").await;

    let check: Value = harness
        .get("/v1/subscribers/tenant:acme/features/sso")
        .await
        .json();
    assert_eq!(check["entitled"], false);
    assert_eq!(check["remaining"], json!({ "kind": "limited", "remaining": 0 }));

    let check: Value = harness
        .get("/v1/subscribers/tenant:acme/features/api-access")
        .await
        .json();
    assert_eq!(check["remaining"], json!({ "kind": "limited", "remaining": 1000 }));
}

#[tokio::test]
async fn subscribers_without_subscription_have_no_access() {
    let harness = TestHarness::new().await;

    let check: Value = harness
        .get("/v1/subscribers/user:nobody/features/api-access")
        .await
        .json();
    assert_eq!(check["entitled"], false);

    harness
        .get("/v1/subscribers/user:nobody/subscription")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn malformed_subscriber_is_a_bad_request() {
    let harness = TestHarness::new().await;

    harness
        .get("/v1/subscribers/alice/features/sso")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn service_routes_require_the_api_key() {
    let harness = TestHarness::new().await;

    let response = harness
        .server
        .get("/v1/subscribers/user:alice/features/sso")
        .await;

    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "unauthorized");
}

// ============================================================================
// Usage
// ============================================================================

#[tokio::test]
async fn usage_outside_the_plan_is_forbidden() {
    let harness = TestHarness::new().await;
    harness.seed_subscription("user:alice", "basic", "sub_1").await;

    let response = harness
        .post("/v1/subscribers/user:alice/usage")
        .json(&json!({ "feature": "white-label" }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["error"]["code"], "not_entitled");
    assert_eq!(body["error"]["details"]["reason"], "feature_not_included");
}

#[tokio::test]
async fn usage_without_subscription_is_forbidden() {
    let harness = TestHarness::new().await;

    let response = harness
        .post("/v1/subscribers/user:alice/usage")
        .json(&json!({ "feature": "api-access" }))
        .await;

    response.assert_status(StatusCode::FORBIDDEN);
    let body: Value = response.json();
    assert_eq!(body["error"]["details"]["reason"], "no_active_subscription");
}

#[tokio::test]
async fn zero_delta_is_rejected() {
    let harness = TestHarness::new().await;
    harness.seed_subscription("user:alice", "pro", "sub_1").await;

    harness
        .post("/v1/subscribers/user:alice/usage")
        .json(&json!({ "feature": "api-access", "delta": 0 }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

// ============================================================================
// Catalog
// ============================================================================

#[tokio::test]
async fn plans_are_listed_in_display_order() {
    let harness = TestHarness::new().await;

    let response = harness.get("/v1/plans").await;

    response.assert_status_ok();
    let plans: Value = response.json();
    assert_eq!(plans[0]["slug"], "basic");
    assert_eq!(plans[1]["slug"], "pro");
    assert_eq!(plans[1]["price_minor"], 3000);
    assert_eq!(plans[1]["currency"], "USD");

    let features = plans[1]["features"].as_array().unwrap();
    let api = features.iter().find(|f| f["slug"] == "api-access").unwrap();
    assert_eq!(api["module"], "api");
    assert_eq!(api["quota"], json!({ "kind": "limited", "limit": 5000 }));
    assert!(features.iter().any(|f| f["slug"] == "sso"));
    assert!(!features.iter().any(|f| f["slug"] == "white-label"));
}
