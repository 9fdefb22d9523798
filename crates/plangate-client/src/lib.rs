//! Plangate Client SDK.
//!
//! This crate provides a client library for applications to query entitlements,
//! record usage and manage subscriptions through the plangate API.
//!
//! # Example
//!
//! ```no_run
//! use plangate_client::PlangateClient;
//! use plangate_core::SubscriberContext;
//!
//! # async fn example() -> Result<(), plangate_client::ClientError> {
//! let client = PlangateClient::new("http://plangate:8080", "your-service-api-key")?;
//! let tenant = SubscriberContext::from_tenant("acme");
//!
//! if client.has_feature(&tenant, "analytics/reports").await? {
//!     let usage = client.record_usage(&tenant, "api/api-access", 1).await?;
//!     println!("{} calls this period", usage.usage_count);
//! }
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

mod client;
mod error;
mod types;

pub use client::{ClientOptions, PlangateClient};
pub use error::ClientError;
pub use types::*;
