use crate::entities::{admin_notification, order};
use chrono::Utc;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, Set};
use std::sync::Arc;
use tracing::{error, instrument};
use uuid::Uuid;

/// Writes admin-facing notifications. Strictly best-effort: a failure here is
/// logged and swallowed, never surfaced to the payment path.
#[derive(Clone)]
pub struct NotificationService {
    db: Arc<DatabaseConnection>,
}

impl NotificationService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Records a "payment received" notification for an order.
    #[instrument(skip(self))]
    pub async fn notify_payment_completed(&self, order_id: Uuid) {
        if let Err(e) = self.insert_payment_notification(order_id).await {
            error!(%order_id, error = %e, "Failed to record payment notification");
        }
    }

    async fn insert_payment_notification(&self, order_id: Uuid) -> Result<(), sea_orm::DbErr> {
        let order_number = order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .map(|o| o.order_number)
            .unwrap_or_else(|| order_id.to_string());

        admin_notification::ActiveModel {
            id: Set(Uuid::new_v4()),
            order_id: Set(order_id),
            title: Set("Payment received".to_string()),
            message: Set(format!("Order {} has been paid and is ready for fulfillment.", order_number)),
            read: Set(false),
            created_at: Set(Utc::now()),
        }
        .insert(&*self.db)
        .await?;

        Ok(())
    }
}
