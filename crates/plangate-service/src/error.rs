//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use plangate_store::StoreError;

use crate::gate::DenyReason;
use crate::gateway::GatewayError;
use crate::lifecycle::LifecycleError;
use crate::reconciler::ReconcileError;
use crate::usage::UsageError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists or invalid state transition.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The subscriber may not use the feature.
    #[error("not entitled to {feature}: {reason}")]
    NotEntitled {
        /// Requested feature slug.
        feature: String,
        /// Why access was denied.
        reason: DenyReason,
    },

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),

    /// External service error.
    #[error("external service error: {0}")]
    ExternalService(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::NotEntitled { feature, reason } => (
                StatusCode::FORBIDDEN,
                "not_entitled",
                self.to_string(),
                Some(serde_json::json!({
                    "feature": feature,
                    "reason": reason,
                })),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
            Self::ExternalService(msg) => (
                StatusCode::BAD_GATEWAY,
                "external_service_error",
                msg.clone(),
                None,
            ),
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => {
                Self::NotFound(format!("{entity} not found: {id}"))
            }
            StoreError::Conflict(msg) => Self::Conflict(msg),
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
            StoreError::Catalog(e) => Self::Internal(e.to_string()),
        }
    }
}

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        match err {
            GatewayError::InvalidSignature
            | GatewayError::MalformedPayload(_)
            | GatewayError::InvalidRequest(_) => Self::BadRequest(err.to_string()),
            GatewayError::Unsupported { .. } => Self::Conflict(err.to_string()),
            GatewayError::Configuration(msg) => Self::Internal(msg),
            GatewayError::Http(_) | GatewayError::Api { .. } => {
                Self::ExternalService(err.to_string())
            }
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::UnknownProcessor(name) => {
                Self::NotFound(format!("payment processor not configured: {name}"))
            }
            ReconcileError::Rejected(e) => Self::BadRequest(e.to_string()),
            ReconcileError::Storage(e) => Self::Internal(e.to_string()),
            ReconcileError::Effect { .. } => Self::Internal(err.to_string()),
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::UnknownPlan(_) | LifecycleError::NoSubscription => {
                Self::NotFound(err.to_string())
            }
            LifecycleError::InactivePlan(_)
            | LifecycleError::AlreadySubscribed
            | LifecycleError::SamePlan(_)
            | LifecycleError::Billing(_) => Self::Conflict(err.to_string()),
            LifecycleError::ProcessorUnavailable(_) => Self::BadRequest(err.to_string()),
            LifecycleError::Gateway(e) => e.into(),
            LifecycleError::Storage(e) => e.into(),
        }
    }
}

impl From<UsageError> for ApiError {
    fn from(err: UsageError) -> Self {
        match err {
            UsageError::NotEntitled { feature } => Self::NotEntitled {
                feature,
                reason: DenyReason::FeatureNotIncluded,
            },
            UsageError::Storage(e) => e.into(),
        }
    }
}
