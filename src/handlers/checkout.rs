use crate::auth::MaybeCustomer;
use crate::entities::order::PaymentMethod;
use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::checkout::{CheckoutRequest, CheckoutSession};
use crate::validation::{validate_amount, validate_order_number};
use crate::ApiResponse;
use axum::{
    extract::{Json, Path, State},
    routing::post,
    Router,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[schema(example = json!({
    "order_id": "550e8400-e29b-41d4-a716-446655440000",
    "order_number": "GJ00042",
    "amount": "1888.00",
    "payment_method": "card",
    "success_url": "https://shop.example.com/checkout/success",
    "cancel_url": "https://shop.example.com/checkout/cancel"
}))]
pub struct InitiateCheckoutRequest {
    pub order_id: Uuid,

    /// Must match the stored order exactly
    #[validate(custom = "validate_order_number")]
    pub order_number: String,

    /// Must match the stored order total within one cent
    #[validate(custom = "validate_amount")]
    pub amount: Decimal,

    pub payment_method: PaymentMethod,

    #[validate(url)]
    pub success_url: String,

    #[validate(url)]
    pub cancel_url: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct ResumeSessionRequest {
    #[validate(url)]
    pub success_url: String,

    #[validate(url)]
    pub cancel_url: String,
}

/// Open a hosted checkout session for an order
#[utoipa::path(
    post,
    path = "/api/v1/checkout/session",
    request_body = InitiateCheckoutRequest,
    responses(
        (status = 200, description = "Checkout session ready", body = ApiResponse<CheckoutSession>),
        (status = 400, description = "Request does not match the order", body = crate::errors::ErrorResponse),
        (status = 403, description = "Order belongs to another customer", body = crate::errors::ErrorResponse),
        (status = 502, description = "Payment processor unavailable", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn initiate_checkout(
    State(state): State<AppState>,
    customer: MaybeCustomer,
    Json(request): Json<InitiateCheckoutRequest>,
) -> Result<Json<ApiResponse<CheckoutSession>>, ServiceError> {
    request.validate()?;

    let session = state
        .services
        .checkout
        .initiate_checkout(
            request.order_id,
            customer.customer_id(),
            CheckoutRequest {
                order_number: request.order_number,
                amount: request.amount,
                payment_method: request.payment_method,
                success_url: request.success_url,
                cancel_url: request.cancel_url,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(session)))
}

/// Re-issue a payment page for a pending order
#[utoipa::path(
    post,
    path = "/api/v1/orders/{id}/payment-session",
    params(("id" = Uuid, Path, description = "Order ID")),
    request_body = ResumeSessionRequest,
    responses(
        (status = 200, description = "Checkout session ready", body = ApiResponse<CheckoutSession>),
        (status = 400, description = "Order is not payable", body = crate::errors::ErrorResponse),
        (status = 403, description = "Order belongs to another customer", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Checkout"
)]
pub async fn resume_session(
    State(state): State<AppState>,
    customer: MaybeCustomer,
    Path(id): Path<Uuid>,
    Json(request): Json<ResumeSessionRequest>,
) -> Result<Json<ApiResponse<CheckoutSession>>, ServiceError> {
    request.validate()?;

    let session = state
        .services
        .checkout
        .resume_session(
            id,
            customer.customer_id(),
            &request.success_url,
            &request.cancel_url,
        )
        .await?;

    Ok(Json(ApiResponse::success(session)))
}

pub fn checkout_routes() -> Router<AppState> {
    Router::new().route("/session", post(initiate_checkout))
}

pub fn order_session_routes() -> Router<AppState> {
    Router::new().route("/:id/payment-session", post(resume_session))
}
