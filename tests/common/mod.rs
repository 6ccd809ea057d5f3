#![allow(dead_code)]

use async_trait::async_trait;
use aurum_api::entities::order::{self, OrderStatus, PaymentMethod, PaymentStatus};
use aurum_api::entities::{admin_notification, order_item, product, variant_stock};
use aurum_api::errors::ServiceError;
use aurum_api::migrator::Migrator;
use aurum_api::services::{
    CheckoutService, NotificationService, OrderService, ReconciliationService, StockService,
};
use aurum_api::stripe::{
    CreateSessionRequest, GatewaySession, PaymentGateway, SessionPaymentStatus, SessionStatus,
};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Database, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, Set,
};
use sea_orm_migration::MigratorTrait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

pub const SESSION_EXPIRY_HOURS: i64 = 24;
pub const SWEEP_WINDOW_HOURS: i64 = 48;
pub const SWEEP_BATCH_SIZE: u64 = 100;

/// Fresh in-memory database with all migrations applied.
pub async fn setup_db() -> Arc<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:")
        .await
        .expect("connect to in-memory sqlite");
    Migrator::up(&db, None).await.expect("run migrations");
    Arc::new(db)
}

/// Scripted stand-in for the payment processor. Sessions created through it
/// start open/unpaid; tests settle them with `settle_session`.
pub struct MockGateway {
    sessions: Mutex<HashMap<String, GatewaySession>>,
    fail_create: AtomicBool,
    fail_fetch: Mutex<Vec<String>>,
    pub create_calls: AtomicUsize,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sessions: Mutex::new(HashMap::new()),
            fail_create: AtomicBool::new(false),
            fail_fetch: Mutex::new(Vec::new()),
            create_calls: AtomicUsize::new(0),
        })
    }

    pub fn fail_next_create(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn fail_fetch_for(&self, session_id: &str) {
        self.fail_fetch.lock().unwrap().push(session_id.to_string());
    }

    /// Registers a session directly, as if it had been created earlier.
    pub fn put_session(
        &self,
        session_id: &str,
        order_id: Uuid,
        status: SessionStatus,
        payment_status: SessionPaymentStatus,
        payment_intent: Option<&str>,
    ) {
        let mut metadata = HashMap::new();
        metadata.insert("order_id".to_string(), order_id.to_string());
        self.sessions.lock().unwrap().insert(
            session_id.to_string(),
            GatewaySession {
                id: session_id.to_string(),
                url: Some(format!("https://checkout.mock/{session_id}")),
                status,
                payment_status,
                payment_intent: payment_intent.map(String::from),
                amount_total: None,
                currency: Some("myr".to_string()),
                metadata,
            },
        );
    }

    /// Marks an existing session paid (or expired).
    pub fn settle_session(
        &self,
        session_id: &str,
        status: SessionStatus,
        payment_status: SessionPaymentStatus,
        payment_intent: Option<&str>,
    ) {
        let mut sessions = self.sessions.lock().unwrap();
        if let Some(session) = sessions.get_mut(session_id) {
            session.status = status;
            session.payment_status = payment_status;
            session.payment_intent = payment_intent.map(String::from);
        }
    }

    pub fn session(&self, session_id: &str) -> Option<GatewaySession> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_checkout_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        if self.fail_create.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::PaymentProcessor(
                "simulated processor outage".to_string(),
            ));
        }

        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let session_id = format!("cs_mock_{n}");
        self.put_session(
            &session_id,
            request.order_id,
            SessionStatus::Open,
            SessionPaymentStatus::Unpaid,
            None,
        );
        Ok(self.session(&session_id).unwrap())
    }

    async fn fetch_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<GatewaySession, ServiceError> {
        if self
            .fail_fetch
            .lock()
            .unwrap()
            .iter()
            .any(|s| s == session_id)
        {
            return Err(ServiceError::PaymentProcessor(
                "simulated processor outage".to_string(),
            ));
        }
        self.session(session_id).ok_or_else(|| {
            ServiceError::PaymentProcessor(format!("no such session: {session_id}"))
        })
    }

    async fn find_sessions_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<GatewaySession>, ServiceError> {
        let wanted = order_id.to_string();
        Ok(self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.metadata.get("order_id") == Some(&wanted))
            .cloned()
            .collect())
    }
}

/// Everything a service-level test needs, wired against the mock gateway.
pub struct TestApp {
    pub db: Arc<DatabaseConnection>,
    pub gateway: Arc<MockGateway>,
    pub orders: OrderService,
    pub checkout: CheckoutService,
    pub reconciliation: ReconciliationService,
    pub stock: StockService,
}

impl TestApp {
    pub async fn new() -> Self {
        let db = setup_db().await;
        let gateway = MockGateway::new();
        let notifications = NotificationService::new(db.clone());

        Self {
            orders: OrderService::new(db.clone()),
            checkout: CheckoutService::new(db.clone(), gateway.clone(), SESSION_EXPIRY_HOURS),
            reconciliation: ReconciliationService::new(
                db.clone(),
                gateway.clone(),
                notifications,
                SWEEP_WINDOW_HOURS,
                SWEEP_BATCH_SIZE,
            ),
            stock: StockService::new(db.clone()),
            db,
            gateway,
        }
    }

    pub async fn order(&self, order_id: Uuid) -> order::Model {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await
            .expect("query order")
            .expect("order exists")
    }

    pub async fn notification_count(&self, order_id: Uuid) -> u64 {
        admin_notification::Entity::find()
            .filter(admin_notification::Column::OrderId.eq(order_id))
            .count(&*self.db)
            .await
            .expect("count notifications")
    }
}

pub struct OrderFixture {
    pub customer_id: Option<Uuid>,
    pub total_amount: Decimal,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub status: OrderStatus,
    pub stripe_session_id: Option<String>,
    pub stripe_session_url: Option<String>,
    pub session_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Default for OrderFixture {
    fn default() -> Self {
        Self {
            customer_id: None,
            total_amount: Decimal::new(14999, 2),
            payment_method: PaymentMethod::Card,
            payment_status: PaymentStatus::Pending,
            status: OrderStatus::Pending,
            stripe_session_id: None,
            stripe_session_url: None,
            session_expires_at: None,
            created_at: Utc::now(),
        }
    }
}

impl OrderFixture {
    pub fn aged(hours: i64) -> Self {
        Self {
            created_at: Utc::now() - Duration::hours(hours),
            ..Default::default()
        }
    }

    pub fn with_session(mut self, session_id: &str) -> Self {
        self.stripe_session_id = Some(session_id.to_string());
        self.stripe_session_url = Some(format!("https://checkout.mock/{session_id}"));
        self.session_expires_at = Some(Utc::now() + Duration::hours(SESSION_EXPIRY_HOURS));
        self
    }
}

static ORDER_SEQ: AtomicUsize = AtomicUsize::new(10000);

/// Inserts an order row directly, bypassing the service layer.
pub async fn insert_order(db: &DatabaseConnection, fixture: OrderFixture) -> order::Model {
    let seq = ORDER_SEQ.fetch_add(1, Ordering::SeqCst) % 100_000;
    order::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_number: Set(format!("GJ{seq:05}")),
        customer_id: Set(fixture.customer_id),
        status: Set(fixture.status),
        total_amount: Set(fixture.total_amount),
        currency: Set("MYR".to_string()),
        payment_status: Set(fixture.payment_status),
        payment_method: Set(fixture.payment_method),
        stripe_session_id: Set(fixture.stripe_session_id),
        stripe_session_url: Set(fixture.stripe_session_url),
        session_expires_at: Set(fixture.session_expires_at),
        payment_intent_id: Set(None),
        created_at: Set(fixture.created_at),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("insert order")
}

pub async fn insert_order_item(
    db: &DatabaseConnection,
    order_id: Uuid,
    product_id: Uuid,
    name: &str,
    quantity: i32,
    variant_options: Option<Value>,
    variant_label: Option<&str>,
) -> order_item::Model {
    order_item::ActiveModel {
        id: Set(Uuid::new_v4()),
        order_id: Set(order_id),
        product_id: Set(product_id),
        name: Set(name.to_string()),
        quantity: Set(quantity),
        unit_price: Set(Decimal::new(9999, 2)),
        variant_options: Set(variant_options),
        variant_label: Set(variant_label.map(String::from)),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .expect("insert order item")
}

pub async fn insert_product(
    db: &DatabaseConnection,
    name: &str,
    stock: i32,
    has_variants: bool,
) -> product::Model {
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        price: Set(Decimal::new(9999, 2)),
        stock: Set(stock),
        has_variants: Set(has_variants),
        is_active: Set(true),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("insert product")
}

pub async fn insert_variant_stock(
    db: &DatabaseConnection,
    product_id: Uuid,
    options: Value,
    stock: i32,
) -> variant_stock::Model {
    variant_stock::ActiveModel {
        id: Set(Uuid::new_v4()),
        product_id: Set(product_id),
        options: Set(options),
        stock: Set(stock),
        created_at: Set(Utc::now()),
        updated_at: Set(None),
    }
    .insert(db)
    .await
    .expect("insert variant stock")
}
