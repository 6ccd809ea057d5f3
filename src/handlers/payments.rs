use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::reconciliation::{SweepSummary, VerifyResult};
use crate::ApiResponse;
use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use uuid::Uuid;

/// Poll the processor for an order's payment outcome
///
/// Driven by the storefront's payment-success redirect. Safe to call any
/// number of times; an order already settled is returned as-is.
#[utoipa::path(
    post,
    path = "/api/v1/payments/verify/{order_id}",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Current payment state", body = ApiResponse<VerifyResult>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment processor unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Payments"
)]
pub async fn verify_payment(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<VerifyResult>>, ServiceError> {
    let result = state
        .services
        .reconciliation
        .verify_payment(order_id)
        .await?;
    Ok(Json(ApiResponse::success(result)))
}

/// Run a reconciliation sweep over recent pending orders
#[utoipa::path(
    post,
    path = "/api/v1/payments/reconcile",
    responses(
        (status = 200, description = "Sweep summary", body = ApiResponse<SweepSummary>)
    ),
    tag = "Payments"
)]
pub async fn reconcile_pending(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<SweepSummary>>, ServiceError> {
    let summary = state.services.reconciliation.sweep_pending().await?;
    Ok(Json(ApiResponse::success(summary)))
}

pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/verify/:order_id", post(verify_payment))
        .route("/reconcile", post(reconcile_pending))
}
