use crate::errors::ServiceError;
use crate::handlers::AppState;
use crate::services::stock::StockCheckResult;
use crate::ApiResponse;
use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use uuid::Uuid;

/// Check current stock for every item of an order
///
/// Read-only: reports shortfalls without reserving or mutating anything.
#[utoipa::path(
    get,
    path = "/api/v1/orders/{id}/stock",
    params(("id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Stock check result", body = ApiResponse<StockCheckResult>),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse)
    ),
    tag = "Stock"
)]
pub async fn check_order_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ApiResponse<StockCheckResult>>, ServiceError> {
    let result = state.services.stock.check_order(id).await?;
    Ok(Json(ApiResponse::success(result)))
}

pub fn stock_routes() -> Router<AppState> {
    Router::new().route("/:id/stock", get(check_order_stock))
}
