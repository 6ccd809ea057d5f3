use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::stripe::webhook::construct_event;
use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use tracing::{error, info, instrument};

/// Stripe webhook receiver
///
/// Verifies the `Stripe-Signature` header over the raw body before any
/// parsing. Processing failures after verification are logged and still
/// acknowledged; the poll and sweep triggers act as backstops, so a retry
/// storm buys nothing.
#[utoipa::path(
    post,
    path = "/api/v1/payments/webhook",
    request_body(content = Vec<u8>, content_type = "application/octet-stream"),
    responses(
        (status = 200, description = "Event acknowledged"),
        (status = 401, description = "Signature verification failed", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
#[instrument(skip(state, headers, body))]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ServiceError> {
    let secret = state
        .config
        .stripe_webhook_secret
        .as_deref()
        .ok_or_else(|| {
            error!("Webhook received but no webhook secret is configured");
            ServiceError::InternalError("webhook secret not configured".to_string())
        })?;

    let signature = headers
        .get("Stripe-Signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ServiceError::Unauthorized("missing Stripe-Signature header".to_string())
        })?;

    let event = construct_event(
        &body,
        signature,
        secret,
        state.config.stripe_webhook_tolerance_secs as i64,
    )?;

    info!(event_id = %event.id, event_type = %event.event_type, "Webhook verified");

    if let Err(e) = state.services.reconciliation.confirm_from_webhook(event).await {
        error!(error = %e, "Webhook processing failed; acknowledging anyway");
    }

    Ok(Json(json!({ "received": true })))
}

pub fn webhook_routes() -> Router<AppState> {
    Router::new().route("/webhook", post(stripe_webhook))
}
