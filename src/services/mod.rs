pub mod checkout;
pub mod notifications;
pub mod orders;
pub mod reconciliation;
pub mod stock;

pub use checkout::CheckoutService;
pub use notifications::NotificationService;
pub use orders::OrderService;
pub use reconciliation::ReconciliationService;
pub use stock::StockService;
