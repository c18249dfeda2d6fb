//! Token issuer: signed short-lived access tokens and opaque refresh tokens.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::services::ServiceError;

/// Issues and verifies both token types for an account identity.
#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
}

/// Claims for access tokens (short-lived, stateless).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Subject (user ID)
    pub sub: Uuid,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// JWT ID
    pub jti: Uuid,
}

/// Token pair returned to the client.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
        }
    }

    /// Mint an access token for a user. No side effects.
    pub fn issue_access_token(&self, user_id: Uuid) -> Result<String, ServiceError> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            sub: user_id,
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| anyhow::anyhow!("Failed to encode access token: {}", e))?;

        Ok(token)
    }

    /// Mint an opaque refresh token: 32 random bytes, hex-encoded. The value
    /// carries no account data; persistence is the caller's responsibility.
    pub fn issue_refresh_token(&self) -> String {
        let mut rng = rand::thread_rng();
        let token_bytes: [u8; 32] = rng.gen();
        hex::encode(token_bytes)
    }

    /// Verify an access token. Expiry and malformation are distinct failures.
    pub fn verify_access_token(&self, token: &str) -> Result<AccessTokenClaims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        let token_data = decode::<AccessTokenClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    ServiceError::ExpiredAccessToken
                }
                _ => ServiceError::MalformedAccessToken,
            })?;

        Ok(token_data.claims)
    }

    /// Access token TTL in seconds (for client info).
    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config(minutes: i64) -> JwtConfig {
        JwtConfig {
            secret: "test-secret-test-secret-test-secret!".to_string(),
            access_token_expiry_minutes: minutes,
            refresh_token_expiry_days: 7,
        }
    }

    #[test]
    fn test_access_token_roundtrip() {
        let service = TokenService::new(&test_config(15));
        let user_id = Uuid::new_v4();

        let token = service.issue_access_token(user_id).unwrap();
        assert!(!token.is_empty());

        let claims = service.verify_access_token(&token).unwrap();
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.exp - claims.iat, 15 * 60);
    }

    #[test]
    fn test_expired_access_token() {
        let service = TokenService::new(&test_config(-5));
        let token = service.issue_access_token(Uuid::new_v4()).unwrap();

        let err = service.verify_access_token(&token).unwrap_err();
        assert!(matches!(err, ServiceError::ExpiredAccessToken));
    }

    #[test]
    fn test_malformed_access_token() {
        let service = TokenService::new(&test_config(15));

        let err = service.verify_access_token("not-a-jwt").unwrap_err();
        assert!(matches!(err, ServiceError::MalformedAccessToken));
    }

    #[test]
    fn test_wrong_secret_is_malformed() {
        let service = TokenService::new(&test_config(15));
        let other = TokenService::new(&JwtConfig {
            secret: "another-secret-another-secret-another".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        });

        let token = other.issue_access_token(Uuid::new_v4()).unwrap();
        let err = service.verify_access_token(&token).unwrap_err();
        assert!(matches!(err, ServiceError::MalformedAccessToken));
    }

    #[test]
    fn test_refresh_tokens_are_opaque_and_unique() {
        let service = TokenService::new(&test_config(15));

        let t1 = service.issue_refresh_token();
        let t2 = service.issue_refresh_token();

        assert_eq!(t1.len(), 64);
        assert!(t1.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(t1, t2);
    }
}
