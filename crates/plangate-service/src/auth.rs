//! Service-to-service authentication.
//!
//! Every `/v1` route is called by the application that embeds plangate, never by
//! subscribers directly. Callers present the shared key in `x-api-key` and may name
//! themselves in `x-service-name` for the logs.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::HeaderMap;

use crate::error::ApiError;
use crate::gateway::signature::constant_time_eq;
use crate::state::AppState;

/// Header carrying the service API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header naming the calling service.
pub const SERVICE_NAME_HEADER: &str = "x-service-name";

/// An authenticated calling service.
#[derive(Debug, Clone)]
pub struct ServiceAuth {
    /// The caller's self-reported name, `unknown` when absent.
    pub service_name: String,
}

impl ServiceAuth {
    /// Check `headers` against the configured key.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Unauthorized` if no key is configured, none was sent, or
    /// the keys differ.
    pub fn from_headers(headers: &HeaderMap, expected: Option<&str>) -> Result<Self, ApiError> {
        let expected = expected.ok_or(ApiError::Unauthorized)?;
        let presented = headers
            .get(API_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        if !constant_time_eq(presented, expected) {
            return Err(ApiError::Unauthorized);
        }

        let service_name = headers
            .get(SERVICE_NAME_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("unknown")
            .to_string();

        Ok(Self { service_name })
    }
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for ServiceAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        Self::from_headers(&parts.headers, state.config.service_api_key.as_deref())
    }
}
