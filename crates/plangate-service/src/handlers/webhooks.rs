//! Processor webhook endpoint.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Serialize;

use crate::error::ApiError;
use crate::reconciler::ReconcileOutcome;
use crate::state::AppState;

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the delivery was accepted.
    pub received: bool,
    /// What the delivery did.
    pub outcome: ReconcileOutcome,
}

/// Handle a webhook from `processor`.
///
/// 200 once the event is applied or was already applied, 400 when the signature or
/// body is rejected, 404 for a processor that is not configured and 500 when the
/// effects could not be written (the processor retries).
pub async fn receive_webhook(
    State(state): State<Arc<AppState>>,
    Path(processor): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    let gateway = state.reconciler.gateway(&processor)?;
    let signature = headers
        .get(gateway.signature_header())
        .and_then(|v| v.to_str().ok());

    let outcome = state
        .reconciler
        .reconcile(gateway.as_ref(), &body, signature)
        .await?;

    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}
