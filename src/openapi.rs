use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Aurum API",
        version = "0.3.0",
        description = r#"
Backend for a gold-jewelry storefront.

Orders are created first and paid afterwards through Stripe-hosted checkout
sessions. Payment confirmation is reconciled from three independent triggers:
webhooks, storefront polling after redirect, and a periodic sweep over recent
pending orders. All three funnel into the same idempotent state transition,
so duplicate or racing confirmations are harmless.

Guest checkout is supported: orders without a customer are payable by anyone
holding the order id. Orders belonging to a customer require their bearer
token.
        "#,
        contact(name = "Aurum Commerce", url = "https://github.com/aurum-commerce/aurum-api"),
        license(name = "MIT", url = "https://opensource.org/licenses/MIT")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Orders", description = "Order creation and lookup"),
        (name = "Checkout", description = "Hosted payment session management"),
        (name = "Payments", description = "Payment verification and reconciliation"),
        (name = "Stock", description = "Stock availability checks")
    ),
    paths(
        crate::handlers::orders::create_order,
        crate::handlers::orders::get_order,
        crate::handlers::checkout::initiate_checkout,
        crate::handlers::checkout::resume_session,
        crate::handlers::payments::verify_payment,
        crate::handlers::payments::reconcile_pending,
        crate::handlers::payment_webhooks::stripe_webhook,
        crate::handlers::stock::check_order_stock,
    ),
    components(schemas(
        crate::errors::ErrorResponse,
        crate::entities::order::OrderStatus,
        crate::entities::order::PaymentStatus,
        crate::entities::order::PaymentMethod,
        crate::handlers::orders::CreateOrderRequest,
        crate::handlers::orders::OrderResponse,
        crate::handlers::orders::OrderItemResponse,
        crate::handlers::checkout::InitiateCheckoutRequest,
        crate::handlers::checkout::ResumeSessionRequest,
        crate::services::checkout::CheckoutSession,
        crate::services::reconciliation::VerifyResult,
        crate::services::reconciliation::SweepSummary,
        crate::services::stock::StockCheckResult,
        crate::services::stock::StockShortfall,
    ))
)]
pub struct ApiDoc;

/// Swagger UI mounted at /docs, serving the generated document at
/// /api-docs/openapi.json.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}
