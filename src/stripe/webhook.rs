use crate::errors::ServiceError;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::Value;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Deserialized webhook event after signature verification.
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookEventData,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEventData {
    pub object: Value,
}

/// Verifies the `Stripe-Signature` header against the raw payload and parses
/// the event. The header carries a timestamp and one or more v1 signatures:
/// `t=1698768000,v1=abc...`. The signed message is `{t}.{payload}`.
pub fn construct_event(
    payload: &[u8],
    signature_header: &str,
    secret: &str,
    tolerance_secs: i64,
) -> Result<WebhookEvent, ServiceError> {
    let (timestamp, signatures) = parse_signature_header(signature_header)?;

    let age = chrono::Utc::now().timestamp() - timestamp;
    if age.abs() > tolerance_secs {
        return Err(ServiceError::Unauthorized(
            "webhook timestamp outside tolerance".to_string(),
        ));
    }

    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| ServiceError::InternalError("invalid webhook secret".to_string()))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    if !signatures
        .iter()
        .any(|sig| constant_time_eq(sig.as_bytes(), expected.as_bytes()))
    {
        return Err(ServiceError::Unauthorized(
            "webhook signature mismatch".to_string(),
        ));
    }

    serde_json::from_slice(payload)
        .map_err(|e| ServiceError::ValidationError(format!("malformed webhook payload: {e}")))
}

fn parse_signature_header(header: &str) -> Result<(i64, Vec<String>), ServiceError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => {
                timestamp = value.parse::<i64>().ok();
            }
            Some(("v1", value)) => signatures.push(value.to_string()),
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or_else(|| {
        ServiceError::Unauthorized("missing timestamp in signature header".to_string())
    })?;
    if signatures.is_empty() {
        return Err(ServiceError::Unauthorized(
            "missing v1 signature in header".to_string(),
        ));
    }

    Ok((timestamp, signatures))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(payload: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(SECRET.as_bytes()).unwrap();
        mac.update(format!("{timestamp}.{payload}").as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("t={timestamp},v1={sig}")
    }

    fn sample_payload() -> String {
        serde_json::json!({
            "id": "evt_123",
            "type": "checkout.session.completed",
            "data": {"object": {"id": "cs_test_1", "payment_status": "paid"}}
        })
        .to_string()
    }

    #[test]
    fn accepts_valid_signature() {
        let payload = sample_payload();
        let header = sign(&payload, chrono::Utc::now().timestamp());

        let event = construct_event(payload.as_bytes(), &header, SECRET, 300).unwrap();
        assert_eq!(event.event_type, "checkout.session.completed");
        assert_eq!(event.data.object["id"], "cs_test_1");
    }

    #[test]
    fn rejects_tampered_payload() {
        let payload = sample_payload();
        let header = sign(&payload, chrono::Utc::now().timestamp());
        let tampered = payload.replace("paid", "unpaid");

        let err = construct_event(tampered.as_bytes(), &header, SECRET, 300).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let payload = sample_payload();
        let header = sign(&payload, chrono::Utc::now().timestamp() - 3600);

        let err = construct_event(payload.as_bytes(), &header, SECRET, 300).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn rejects_wrong_secret() {
        let payload = sample_payload();
        let header = sign(&payload, chrono::Utc::now().timestamp());

        let err = construct_event(payload.as_bytes(), &header, "whsec_other", 300).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[test]
    fn rejects_missing_header_parts() {
        let payload = sample_payload();
        let err = construct_event(payload.as_bytes(), "v1=deadbeef", SECRET, 300).unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }
}
