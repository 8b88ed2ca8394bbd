use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::ServiceError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Customer id
    pub sub: String,
    pub exp: usize,
    pub iat: usize,
}

/// Validates bearer tokens. Shared through request extensions so extractors
/// can reach it without threading state types.
#[derive(Clone)]
pub struct AuthService {
    decoding_key: DecodingKey,
}

impl AuthService {
    pub fn new(jwt_secret: &str) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
        }
    }

    pub fn validate_token(&self, token: &str) -> Result<Claims, ServiceError> {
        let data = decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map_err(|e| ServiceError::AuthError(format!("Invalid token: {}", e)))?;
        Ok(data.claims)
    }
}

/// Authenticated caller, extracted from the `Authorization: Bearer` header.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub customer_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_service = parts
            .extensions
            .get::<Arc<AuthService>>()
            .cloned()
            .ok_or_else(|| ServiceError::InternalError("Auth service not configured".to_string()))?;

        let header = parts
            .headers
            .get(axum::http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServiceError::AuthError("Missing authorization header".to_string()))?;

        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServiceError::AuthError("Invalid authorization header".to_string()))?;

        let claims = auth_service.validate_token(token)?;
        let customer_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| ServiceError::AuthError("Invalid subject claim".to_string()))?;

        Ok(AuthUser { customer_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn make_token(secret: &str, sub: &str, exp_offset: i64) -> String {
        let now = chrono::Utc::now().timestamp();
        let claims = Claims {
            sub: sub.to_string(),
            exp: (now + exp_offset) as usize,
            iat: now as usize,
        };
        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_round_trips_subject() {
        let secret = "0123456789abcdef0123456789abcdef";
        let customer = Uuid::new_v4();
        let token = make_token(secret, &customer.to_string(), 3600);

        let service = AuthService::new(secret);
        let claims = service.validate_token(&token).unwrap();
        assert_eq!(claims.sub, customer.to_string());
    }

    #[test]
    fn expired_token_is_rejected() {
        let secret = "0123456789abcdef0123456789abcdef";
        let token = make_token(secret, &Uuid::new_v4().to_string(), -3600);

        let service = AuthService::new(secret);
        assert!(service.validate_token(&token).is_err());
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = make_token("0123456789abcdef0123456789abcdef", "x", 3600);
        let service = AuthService::new("another-secret-another-secret-00");
        assert!(service.validate_token(&token).is_err());
    }
}
