//! Plangate HTTP API service.
//!
//! This crate exposes the plangate billing core over HTTP:
//!
//! - Plan catalog import and listing
//! - Subscription lifecycle (subscribe, cancel, plan changes, expiry)
//! - Feature entitlement checks and usage metering
//! - Processor webhook reconciliation (Stripe, Paddle)
//! - Revenue, churn and usage analytics for operators
//!
//! # Authentication
//!
//! Service endpoints require the `x-api-key` header to match `SERVICE_API_KEY`.
//! Webhooks are authenticated by the processor's signature header instead.
//!
//! Routes inside the embedding application can be gated on a feature with
//! [`gate::require_feature`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers stay async for the router

pub mod analytics;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod entitlement;
pub mod error;
pub mod gate;
pub mod gateway;
pub mod handlers;
pub mod lifecycle;
pub mod reconciler;
pub mod routes;
pub mod state;
pub mod usage;

#[cfg(test)]
mod testing;

pub use config::ServiceConfig;
pub use entitlement::EntitlementService;
pub use error::ApiError;
pub use gateway::{GatewayRegistry, PaymentGateway};
pub use reconciler::WebhookReconciler;
pub use routes::create_router;
pub use state::AppState;
pub use usage::UsageTracker;
