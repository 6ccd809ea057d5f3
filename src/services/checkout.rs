use crate::entities::order::{self, OrderStatus, PaymentMethod, PaymentStatus};
use crate::errors::ServiceError;
use crate::stripe::{CreateSessionRequest, GatewayPaymentMethod, PaymentGateway};
use crate::validation::amounts_match;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, DatabaseConnection, EntityTrait, IntoActiveModel, Set};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

/// Client-facing request to open (or resume) a hosted payment page. Every
/// order-identifying field is re-verified against the stored order; nothing
/// the client sends is trusted to price the session.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub order_number: String,
    pub amount: Decimal,
    pub payment_method: PaymentMethod,
    pub success_url: String,
    pub cancel_url: String,
}

/// Result of a checkout initiation: either a freshly created hosted session
/// or a still-valid existing one.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CheckoutSession {
    pub order_id: Uuid,
    pub session_id: String,
    pub checkout_url: String,
    /// True when an existing non-expired session URL was returned instead of
    /// creating a new processor session.
    pub reused: bool,
    pub expires_at: DateTime<Utc>,
}

/// Returns the still-valid session URL, if the order already carries one.
fn reusable_session(
    session_id: Option<&str>,
    url: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Option<(String, String, DateTime<Utc>)> {
    match (session_id, url, expires_at) {
        (Some(id), Some(url), Some(exp)) if exp > now => {
            Some((id.to_string(), url.to_string(), exp))
        }
        _ => None,
    }
}

fn gateway_method(method: PaymentMethod) -> Result<GatewayPaymentMethod, ServiceError> {
    match method {
        PaymentMethod::Card => Ok(GatewayPaymentMethod::Card),
        PaymentMethod::Fpx => Ok(GatewayPaymentMethod::Fpx),
        PaymentMethod::BankTransfer => Err(ServiceError::InvalidOperation(
            "bank transfer orders are settled manually and have no hosted payment page".to_string(),
        )),
    }
}

#[derive(Clone)]
pub struct CheckoutService {
    db: Arc<DatabaseConnection>,
    gateway: Arc<dyn PaymentGateway>,
    session_expiry_hours: i64,
}

impl CheckoutService {
    pub fn new(
        db: Arc<DatabaseConnection>,
        gateway: Arc<dyn PaymentGateway>,
        session_expiry_hours: i64,
    ) -> Self {
        Self {
            db,
            gateway,
            session_expiry_hours,
        }
    }

    /// Opens a hosted checkout session for an order, verifying every
    /// client-supplied field against the stored order first. A still-valid
    /// existing session is reused rather than regenerated.
    #[instrument(skip(self, request), fields(order_number = %request.order_number))]
    pub async fn initiate_checkout(
        &self,
        order_id: Uuid,
        caller: Option<Uuid>,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, ServiceError> {
        let order = self.load_order(order_id).await?;

        self.check_ownership(&order, caller)?;
        Self::check_payable(&order)?;

        if request.order_number != order.order_number {
            return Err(ServiceError::ValidationError(
                "order number does not match this order".to_string(),
            ));
        }
        if !amounts_match(request.amount, order.total_amount) {
            warn!(
                order_id = %order.id,
                supplied = %request.amount,
                stored = %order.total_amount,
                "Checkout amount mismatch"
            );
            return Err(ServiceError::ValidationError(
                "amount does not match the order total".to_string(),
            ));
        }

        let method = gateway_method(request.payment_method)?;

        self.reuse_or_create(
            order,
            method,
            request.payment_method,
            &request.success_url,
            &request.cancel_url,
        )
        .await
    }

    /// Re-issues a payment page for an existing order using its stored
    /// amount and method. Used by the storefront's "complete payment" action
    /// on a pending order.
    #[instrument(skip(self))]
    pub async fn resume_session(
        &self,
        order_id: Uuid,
        caller: Option<Uuid>,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, ServiceError> {
        let order = self.load_order(order_id).await?;

        self.check_ownership(&order, caller)?;
        Self::check_payable(&order)?;

        let stored_method = order.payment_method;
        let method = gateway_method(stored_method)?;

        self.reuse_or_create(order, method, stored_method, success_url, cancel_url)
            .await
    }

    async fn load_order(&self, order_id: Uuid) -> Result<order::Model, ServiceError> {
        order::Entity::find_by_id(order_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {} not found", order_id)))
    }

    /// Guest orders (no customer) are payable by anyone holding the order id;
    /// customer orders only by their owner.
    fn check_ownership(
        &self,
        order: &order::Model,
        caller: Option<Uuid>,
    ) -> Result<(), ServiceError> {
        if let Some(owner) = order.customer_id {
            if caller != Some(owner) {
                return Err(ServiceError::Forbidden(
                    "order belongs to a different customer".to_string(),
                ));
            }
        }
        Ok(())
    }

    fn check_payable(order: &order::Model) -> Result<(), ServiceError> {
        match order.payment_status {
            PaymentStatus::Completed => Err(ServiceError::InvalidOperation(
                "order is already paid".to_string(),
            )),
            PaymentStatus::Failed => Err(ServiceError::InvalidOperation(
                "payment for this order has failed; place a new order".to_string(),
            )),
            PaymentStatus::Pending => {
                if order.status == OrderStatus::Cancelled {
                    Err(ServiceError::InvalidOperation(
                        "order is cancelled".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    async fn reuse_or_create(
        &self,
        order: order::Model,
        method: GatewayPaymentMethod,
        stored_method: PaymentMethod,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<CheckoutSession, ServiceError> {
        let now = Utc::now();

        if let Some((session_id, url, expires_at)) = reusable_session(
            order.stripe_session_id.as_deref(),
            order.stripe_session_url.as_deref(),
            order.session_expires_at,
            now,
        ) {
            info!(order_id = %order.id, session_id = %session_id, "Reusing existing checkout session");
            return Ok(CheckoutSession {
                order_id: order.id,
                session_id,
                checkout_url: url,
                reused: true,
                expires_at,
            });
        }

        // Gateway failure propagates without touching the order; the customer
        // can simply retry.
        let session = self
            .gateway
            .create_checkout_session(&CreateSessionRequest {
                order_id: order.id,
                order_number: order.order_number.clone(),
                amount: order.total_amount,
                currency: order.currency.clone(),
                payment_method: method,
                success_url: success_url.to_string(),
                cancel_url: cancel_url.to_string(),
            })
            .await?;

        let url = session.url.clone().ok_or_else(|| {
            ServiceError::PaymentProcessor("processor returned a session without a URL".to_string())
        })?;
        let expires_at = now + Duration::hours(self.session_expiry_hours);

        let order_id = order.id;
        let mut active = order.into_active_model();
        active.stripe_session_id = Set(Some(session.id.clone()));
        active.stripe_session_url = Set(Some(url.clone()));
        active.session_expires_at = Set(Some(expires_at));
        active.payment_method = Set(stored_method);
        active.updated_at = Set(Some(now));
        active.update(&*self.db).await?;

        info!(order_id = %order_id, session_id = %session.id, "Checkout session created");
        Ok(CheckoutSession {
            order_id,
            session_id: session.id,
            checkout_url: url,
            reused: false,
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_reused_only_before_expiry() {
        let now = Utc::now();
        let live = reusable_session(
            Some("cs_1"),
            Some("https://pay.example/cs_1"),
            Some(now + Duration::hours(1)),
            now,
        );
        assert!(live.is_some());

        let expired = reusable_session(
            Some("cs_1"),
            Some("https://pay.example/cs_1"),
            Some(now - Duration::minutes(1)),
            now,
        );
        assert!(expired.is_none());

        let missing_url = reusable_session(Some("cs_1"), None, Some(now + Duration::hours(1)), now);
        assert!(missing_url.is_none());

        let never_created = reusable_session(None, None, None, now);
        assert!(never_created.is_none());
    }

    #[test]
    fn bank_transfer_never_reaches_the_gateway() {
        assert!(gateway_method(PaymentMethod::BankTransfer).is_err());
        assert_eq!(
            gateway_method(PaymentMethod::Card).unwrap(),
            GatewayPaymentMethod::Card
        );
        assert_eq!(
            gateway_method(PaymentMethod::Fpx).unwrap(),
            GatewayPaymentMethod::Fpx
        );
    }
}
