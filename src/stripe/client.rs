use super::{
    CreateSessionRequest, GatewaySession, PaymentGateway, SessionPaymentStatus, SessionStatus,
};
use crate::errors::ServiceError;
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error};
use uuid::Uuid;

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";
const SESSION_LIST_LIMIT: u32 = 100;

/// Thin client for the Stripe Checkout Sessions API. Form-encoded requests,
/// bearer authentication with the secret key.
#[derive(Clone)]
pub struct StripeClient {
    http: reqwest::Client,
    secret_key: String,
    base_url: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default(),
            secret_key,
            base_url: STRIPE_API_BASE.to_string(),
        }
    }

    /// Point the client at a different endpoint, for local Stripe emulators.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn get_json(&self, path: &str) -> Result<Value, ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, path, "Stripe request failed");
                ServiceError::PaymentProcessor(format!("request failed: {e}"))
            })?;

        Self::read_body(response).await
    }

    async fn post_form(&self, path: &str, params: &[(String, String)]) -> Result<Value, ServiceError> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.secret_key)
            .form(params)
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, path, "Stripe request failed");
                ServiceError::PaymentProcessor(format!("request failed: {e}"))
            })?;

        Self::read_body(response).await
    }

    async fn read_body(response: reqwest::Response) -> Result<Value, ServiceError> {
        let status = response.status();
        let body: Value = response.json().await.map_err(|e| {
            ServiceError::PaymentProcessor(format!("invalid response body: {e}"))
        })?;

        if !status.is_success() {
            let message = body
                .pointer("/error/message")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            error!(%status, message, "Stripe returned an error");
            return Err(ServiceError::PaymentProcessor(format!(
                "stripe error ({status}): {message}"
            )));
        }

        Ok(body)
    }
}

/// Parses a checkout-session JSON object (as delivered in webhook payloads)
/// into the gateway-neutral session view.
pub fn session_from_value(value: Value) -> Result<GatewaySession, ServiceError> {
    let raw: RawSession = serde_json::from_value(value)
        .map_err(|e| ServiceError::ValidationError(format!("unexpected session shape: {e}")))?;
    Ok(raw.into_gateway_session())
}

/// Converts a decimal amount to currency minor units (cents).
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    (amount * Decimal::from(100))
        .round()
        .to_i64()
        .ok_or_else(|| ServiceError::ValidationError("amount out of range".to_string()))
}

#[derive(Debug, Deserialize)]
struct RawSession {
    id: String,
    url: Option<String>,
    status: Option<String>,
    payment_status: Option<String>,
    payment_intent: Option<Value>,
    amount_total: Option<i64>,
    currency: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
    client_reference_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSessionList {
    #[serde(default)]
    data: Vec<RawSession>,
}

impl RawSession {
    fn into_gateway_session(self) -> GatewaySession {
        let status = match self.status.as_deref() {
            Some("complete") => SessionStatus::Complete,
            Some("expired") => SessionStatus::Expired,
            _ => SessionStatus::Open,
        };
        let payment_status = match self.payment_status.as_deref() {
            Some("paid") => SessionPaymentStatus::Paid,
            Some("no_payment_required") => SessionPaymentStatus::NoPaymentRequired,
            _ => SessionPaymentStatus::Unpaid,
        };
        // payment_intent may arrive expanded as an object
        let payment_intent = match &self.payment_intent {
            Some(Value::String(id)) => Some(id.clone()),
            Some(Value::Object(obj)) => obj.get("id").and_then(Value::as_str).map(String::from),
            _ => None,
        };

        GatewaySession {
            id: self.id,
            url: self.url,
            status,
            payment_status,
            payment_intent,
            amount_total: self.amount_total,
            currency: self.currency,
            metadata: self.metadata,
        }
    }
}

#[async_trait]
impl PaymentGateway for StripeClient {
    async fn create_checkout_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<GatewaySession, ServiceError> {
        let unit_amount = to_minor_units(request.amount)?;

        let params = vec![
            ("mode".to_string(), "payment".to_string()),
            (
                "client_reference_id".to_string(),
                request.order_id.to_string(),
            ),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            (
                "payment_method_types[0]".to_string(),
                request.payment_method.as_str().to_string(),
            ),
            (
                "line_items[0][price_data][currency]".to_string(),
                request.currency.to_lowercase(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                format!("Order {}", request.order_number),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                unit_amount.to_string(),
            ),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "metadata[order_id]".to_string(),
                request.order_id.to_string(),
            ),
            (
                "metadata[order_number]".to_string(),
                request.order_number.clone(),
            ),
        ];

        debug!(order_id = %request.order_id, "Creating Stripe checkout session");
        let body = self.post_form("/checkout/sessions", &params).await?;
        let raw: RawSession = serde_json::from_value(body)
            .map_err(|e| ServiceError::PaymentProcessor(format!("unexpected session shape: {e}")))?;

        Ok(raw.into_gateway_session())
    }

    async fn fetch_checkout_session(&self, session_id: &str) -> Result<GatewaySession, ServiceError> {
        let body = self
            .get_json(&format!("/checkout/sessions/{session_id}"))
            .await?;
        let raw: RawSession = serde_json::from_value(body)
            .map_err(|e| ServiceError::PaymentProcessor(format!("unexpected session shape: {e}")))?;

        Ok(raw.into_gateway_session())
    }

    async fn find_sessions_for_order(
        &self,
        order_id: Uuid,
    ) -> Result<Vec<GatewaySession>, ServiceError> {
        // The sessions list endpoint cannot filter by metadata server-side, so
        // fetch a recent page and match locally on metadata/client_reference_id.
        let body = self
            .get_json(&format!("/checkout/sessions?limit={SESSION_LIST_LIMIT}"))
            .await?;
        let raw: RawSessionList = serde_json::from_value(body)
            .map_err(|e| ServiceError::PaymentProcessor(format!("unexpected list shape: {e}")))?;

        let wanted = order_id.to_string();
        Ok(raw
            .data
            .into_iter()
            .filter(|s| {
                s.metadata.get("order_id") == Some(&wanted)
                    || s.client_reference_id.as_deref() == Some(wanted.as_str())
            })
            .map(RawSession::into_gateway_session)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn amounts_convert_to_minor_units() {
        assert_eq!(to_minor_units(dec!(149.99)).unwrap(), 14999);
        assert_eq!(to_minor_units(dec!(0.01)).unwrap(), 1);
        assert_eq!(to_minor_units(dec!(1888)).unwrap(), 188800);
    }

    #[test]
    fn session_deserializes_with_string_payment_intent() {
        let raw: RawSession = serde_json::from_value(json!({
            "id": "cs_test_123",
            "url": "https://checkout.stripe.com/pay/cs_test_123",
            "status": "complete",
            "payment_status": "paid",
            "payment_intent": "pi_456",
            "amount_total": 14999,
            "currency": "myr",
            "metadata": {"order_id": "550e8400-e29b-41d4-a716-446655440000"}
        }))
        .unwrap();

        let session = raw.into_gateway_session();
        assert_eq!(session.status, SessionStatus::Complete);
        assert!(session.is_paid());
        assert_eq!(session.payment_intent.as_deref(), Some("pi_456"));
        assert_eq!(
            session.order_id(),
            Some(Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap())
        );
    }

    #[test]
    fn session_deserializes_with_expanded_payment_intent() {
        let raw: RawSession = serde_json::from_value(json!({
            "id": "cs_test_123",
            "status": "open",
            "payment_status": "unpaid",
            "payment_intent": {"id": "pi_789", "status": "requires_payment_method"}
        }))
        .unwrap();

        let session = raw.into_gateway_session();
        assert_eq!(session.status, SessionStatus::Open);
        assert!(!session.is_paid());
        assert_eq!(session.payment_intent.as_deref(), Some("pi_789"));
        assert_eq!(session.order_id(), None);
    }
}
