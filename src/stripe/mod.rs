pub mod client;
pub mod webhook;

pub use client::{session_from_value, StripeClient};
pub use webhook::{construct_event, WebhookEvent};

use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle of a processor-hosted checkout session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Open,
    Complete,
    Expired,
}

/// Whether the processor considers the session paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPaymentStatus {
    Paid,
    Unpaid,
    NoPaymentRequired,
}

/// Processor-side view of a checkout session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewaySession {
    pub id: String,
    pub url: Option<String>,
    pub status: SessionStatus,
    pub payment_status: SessionPaymentStatus,
    pub payment_intent: Option<String>,
    /// Amount in currency minor units.
    pub amount_total: Option<i64>,
    pub currency: Option<String>,
    pub metadata: HashMap<String, String>,
}

impl GatewaySession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == SessionPaymentStatus::Paid
    }

    /// Order id carried through session metadata for reconciliation.
    pub fn order_id(&self) -> Option<Uuid> {
        self.metadata
            .get("order_id")
            .and_then(|raw| Uuid::parse_str(raw).ok())
    }
}

/// Payment-method types the hosted page may offer. Manual bank transfers never
/// reach the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayPaymentMethod {
    Card,
    Fpx,
}

impl GatewayPaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Card => "card",
            Self::Fpx => "fpx",
        }
    }
}

/// Request to create a hosted checkout session for exactly one order.
#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub order_id: Uuid,
    pub order_number: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_method: GatewayPaymentMethod,
    pub success_url: String,
    pub cancel_url: String,
}

/// Seam between the reconciliation core and the payment processor. The
/// processor is only ever read (status queries) or appended to (new sessions).
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a hosted checkout session tagged with the order's id and number
    /// as metadata for later reconciliation.
    async fn create_checkout_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError>;

    /// Fetch one session by its processor-side id.
    async fn fetch_checkout_session(&self, session_id: &str) -> Result<GatewaySession, ServiceError>;

    /// Find sessions belonging to an order via metadata. Used by the poll
    /// trigger, which cannot rely on a session id being known client-side.
    async fn find_sessions_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<GatewaySession>, ServiceError>;
}
