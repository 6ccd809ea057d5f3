use crate::entities::order::{self, OrderStatus, PaymentMethod, PaymentStatus};
use crate::entities::order_item;
use crate::errors::ServiceError;
use chrono::Utc;
use rand::Rng;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

const ORDER_NUMBER_ATTEMPTS: usize = 10;

/// One line of a new order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewOrderItem {
    pub product_id: Uuid,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    /// Selected variant options as a name -> value map, when the product has
    /// variants.
    #[serde(default)]
    pub variant_options: Option<Value>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub customer_id: Option<Uuid>,
    pub currency: String,
    pub payment_method: PaymentMethod,
    pub items: Vec<NewOrderItem>,
}

/// An order together with its line items.
#[derive(Debug, Clone)]
pub struct OrderWithItems {
    pub order: order::Model,
    pub items: Vec<order_item::Model>,
}

#[derive(Clone)]
pub struct OrderService {
    db: Arc<DatabaseConnection>,
}

impl OrderService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Creates an order and its items in one transaction. The order starts in
    /// payment_status pending, status pending; reconciliation moves it onward.
    #[instrument(skip(self, input), fields(items = input.items.len()))]
    pub async fn create_order(&self, input: NewOrder) -> Result<OrderWithItems, ServiceError> {
        if input.items.is_empty() {
            return Err(ServiceError::ValidationError(
                "order must contain at least one item".to_string(),
            ));
        }
        for item in &input.items {
            if item.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "quantity for '{}' must be positive",
                    item.name
                )));
            }
            if item.unit_price <= Decimal::ZERO {
                return Err(ServiceError::ValidationError(format!(
                    "unit price for '{}' must be positive",
                    item.name
                )));
            }
        }

        let total: Decimal = input
            .items
            .iter()
            .map(|i| i.unit_price * Decimal::from(i.quantity))
            .sum();

        let order_number = self.generate_order_number().await?;
        let order_id = Uuid::new_v4();
        let now = Utc::now();

        let txn = self.db.begin().await?;

        let order_model = order::ActiveModel {
            id: Set(order_id),
            order_number: Set(order_number.clone()),
            customer_id: Set(input.customer_id),
            status: Set(OrderStatus::Pending),
            total_amount: Set(total),
            currency: Set(input.currency.to_uppercase()),
            payment_status: Set(PaymentStatus::Pending),
            payment_method: Set(input.payment_method),
            stripe_session_id: Set(None),
            stripe_session_url: Set(None),
            session_expires_at: Set(None),
            payment_intent_id: Set(None),
            created_at: Set(now),
            updated_at: Set(Some(now)),
        };
        let order = order_model.insert(&txn).await?;

        let mut items = Vec::with_capacity(input.items.len());
        for item in input.items {
            let model = order_item::ActiveModel {
                id: Set(Uuid::new_v4()),
                order_id: Set(order_id),
                product_id: Set(item.product_id),
                name: Set(item.name),
                quantity: Set(item.quantity),
                unit_price: Set(item.unit_price),
                variant_options: Set(item.variant_options),
                variant_label: Set(None),
                created_at: Set(now),
            };
            items.push(model.insert(&txn).await?);
        }

        txn.commit().await?;

        info!(order_id = %order.id, order_number = %order.order_number, total = %order.total_amount, "Order created");
        Ok(OrderWithItems { order, items })
    }

    /// Fetches an order with its items.
    #[instrument(skip(self))]
    pub async fn get_order(&self, order_id: Uuid) -> Result<OrderWithItems, ServiceError> {
        let order = self.get_order_model(order_id).await?;
        let items = order_item::Entity::find()
            .filter(order_item::Column::OrderId.eq(order_id))
            .all(&*self.db)
            .await?;

        Ok(OrderWithItems { order, items })
    }

    pub async fn get_order_model(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Generates a GJ-prefixed five-digit order number, retrying on collision.
    async fn generate_order_number(&self) -> Result<String, ServiceError> {
        for _ in 0..ORDER_NUMBER_ATTEMPTS {
            let candidate = {
                let mut rng = rand::thread_rng();
                format!("GJ{:05}", rng.gen_range(0..100_000))
            };
            let taken = order::Entity::find()
                .filter(order::Column::OrderNumber.eq(candidate.clone()))
                .count(&*self.db)
                .await?;
            if taken == 0 {
                return Ok(candidate);
            }
        }
        Err(ServiceError::InternalError(
            "could not allocate a unique order number".to_string(),
        ))
    }
}
