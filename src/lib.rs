pub mod auth;
pub mod config;
pub mod db;
pub mod entities;
pub mod errors;
pub mod handlers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod stripe;
pub mod validation;

use crate::config::AppConfig;
use crate::services::{
    CheckoutService, NotificationService, OrderService, ReconciliationService, StockService,
};
use crate::stripe::PaymentGateway;
use chrono::Utc;
use sea_orm::DatabaseConnection;
use serde::Serialize;
use std::sync::Arc;
use utoipa::ToSchema;

/// Standard success envelope returned by every handler.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    pub fn success_with_message(data: T, message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: Some(message.into()),
            timestamp: Utc::now().to_rfc3339(),
        }
    }
}

/// Services container shared by all handlers.
#[derive(Clone)]
pub struct AppServices {
    pub orders: OrderService,
    pub checkout: CheckoutService,
    pub reconciliation: ReconciliationService,
    pub stock: StockService,
    pub notifications: NotificationService,
}

impl AppServices {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        config: &AppConfig,
    ) -> Self {
        let notifications = NotificationService::new(db.clone());
        Self {
            orders: OrderService::new(db.clone()),
            checkout: CheckoutService::new(
                db.clone(),
                gateway.clone(),
                config.session_expiry_hours,
            ),
            reconciliation: ReconciliationService::new(
                db.clone(),
                gateway,
                notifications.clone(),
                config.sweep_window_hours,
                config.sweep_batch_size,
            ),
            stock: StockService::new(db),
            notifications,
        }
    }
}

/// Shared application state injected into every handler.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: Arc<AppConfig>,
    pub services: AppServices,
}

impl AppState {
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: Arc<AppConfig>,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let services = AppServices::new(db.clone(), gateway, &config);
        Self {
            db,
            config,
            services,
        }
    }
}
