pub mod admin_notification;
pub mod order;
pub mod order_item;
pub mod product;
pub mod variant_stock;
