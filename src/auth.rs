use crate::errors::ServiceError;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

/// JWT claims carried by storefront bearer tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Customer id.
    pub sub: String,
    pub exp: usize,
}

/// Authenticated customer, when the request carried a valid bearer token.
/// Guest checkout means most endpoints must also work without one, so
/// handlers take `MaybeCustomer` rather than requiring identity.
#[derive(Debug, Clone, Copy)]
pub struct CustomerIdentity {
    pub customer_id: Uuid,
}

/// Extractor yielding `Some(identity)` for a valid bearer token, `None` when
/// the header is absent. A present-but-invalid token is rejected rather than
/// silently downgraded to guest.
#[derive(Debug, Clone, Copy)]
pub struct MaybeCustomer(pub Option<CustomerIdentity>);

impl MaybeCustomer {
    pub fn customer_id(&self) -> Option<Uuid> {
        self.0.map(|c| c.customer_id)
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for MaybeCustomer
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Some(header) = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
        else {
            return Ok(MaybeCustomer(None));
        };

        let Some(token) = header.strip_prefix("Bearer ") else {
            return Err(ServiceError::Unauthorized(
                "malformed authorization header".to_string(),
            ));
        };

        let secret = parts
            .extensions
            .get::<JwtSecret>()
            .ok_or_else(|| ServiceError::InternalError("jwt secret not configured".to_string()))?;

        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret.0.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| {
            debug!(error = %e, "Bearer token rejected");
            ServiceError::Unauthorized("invalid bearer token".to_string())
        })?;

        let customer_id = Uuid::parse_str(&token_data.claims.sub).map_err(|_| {
            ServiceError::Unauthorized("token subject is not a customer id".to_string())
        })?;

        Ok(MaybeCustomer(Some(CustomerIdentity { customer_id })))
    }
}

/// JWT secret installed as a request extension at router construction.
#[derive(Clone)]
pub struct JwtSecret(pub String);
