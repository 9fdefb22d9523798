//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    admin, customers, features, health, plans, subscriptions, usage, webhooks,
};
use crate::state::AppState;

// ============================================================================
// Concurrency Limiting Constants
// ============================================================================

/// Maximum concurrent requests for usage endpoints.
const USAGE_MAX_CONCURRENT_REQUESTS: usize = 100;

/// Maximum concurrent requests for general API endpoints.
const API_MAX_CONCURRENT_REQUESTS: usize = 50;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Subscriptions (Service API Key auth)
/// - `GET /v1/subscribers/:subscriber/subscription` - Current subscription summary
/// - `POST /v1/subscribers/:subscriber/subscription` - Subscribe to a plan
/// - `POST /v1/subscribers/:subscriber/subscription/cancel` - Cancel
/// - `POST /v1/subscribers/:subscriber/subscription/change` - Change plan
///
/// ## Entitlements (Service API Key auth)
/// - `GET /v1/subscribers/:subscriber/features/*feature` - Feature check
///   (`sso` or `api/api-access`)
/// - `POST /v1/subscribers/:subscriber/usage` - Record usage (rate-limited)
///
/// ## Catalog and customers (Service API Key auth)
/// - `GET /v1/plans` - Active plans with features
/// - `POST /v1/customers` - Ensure a billing profile exists
/// - `POST /v1/admin/expire` - Move lapsed subscriptions to past_due
/// - `GET /v1/admin/analytics?days=30` - Revenue, churn, conversion and usage
///
/// ## Webhooks (Signature verification)
/// - `POST /webhooks/:processor` - Processor webhooks (`stripe`, `paddle`)
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    // Usage is reported on every metered call, so it gets its own higher limit.
    let usage_routes = Router::new()
        .route("/", post(usage::record_usage))
        .layer(ConcurrencyLimitLayer::new(USAGE_MAX_CONCURRENT_REQUESTS));

    let subscriber_routes = Router::new()
        .route(
            "/subscription",
            get(subscriptions::get_subscription).post(subscriptions::subscribe),
        )
        .route("/subscription/cancel", post(subscriptions::cancel))
        .route("/subscription/change", post(subscriptions::change_plan))
        .route("/features/*feature", get(features::check_feature))
        .nest("/usage", usage_routes);

    let api_routes = Router::new()
        .nest("/subscribers/:subscriber", subscriber_routes)
        .route("/plans", get(plans::list_plans))
        .route("/customers", post(customers::ensure_customer))
        .route("/admin/expire", post(admin::expire_overdue))
        .route("/admin/analytics", get(admin::analytics))
        .layer(ConcurrencyLimitLayer::new(API_MAX_CONCURRENT_REQUESTS));

    Router::new()
        // Health (public, no rate limit)
        .route("/health", get(health::health))
        // API v1 routes (rate limited)
        .nest("/v1", api_routes)
        // Webhooks (no rate limit - controlled by the processors)
        .route("/webhooks/:processor", post(webhooks::receive_webhook))
        .route("/webhooks/:processor/", post(webhooks::receive_webhook))
        // Global middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
