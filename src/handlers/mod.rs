pub mod checkout;
pub mod orders;
pub mod payment_webhooks;
pub mod payments;
pub mod stock;

pub use crate::AppState;

use axum::Router;

/// Composes the versioned API surface.
pub fn api_v1_routes() -> Router<AppState> {
    Router::new()
        .nest(
            "/orders",
            orders::order_routes()
                .merge(checkout::order_session_routes())
                .merge(stock::stock_routes()),
        )
        .nest("/checkout", checkout::checkout_routes())
        .nest(
            "/payments",
            payments::payment_routes().merge(payment_webhooks::webhook_routes()),
        )
}
