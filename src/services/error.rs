use thiserror::Error;

use crate::error::AppError;

/// Auth-core error taxonomy. Every branch of the rotation protocol and the
/// session boundary surfaces one of these, so callers can tell a reuse
/// detection apart from an ordinary expiry.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account is blocked")]
    AccountBlocked,

    #[error("Account not found")]
    AccountNotFound,

    #[error("Invalid refresh token")]
    InvalidRefreshToken,

    #[error("Refresh token expired")]
    RefreshTokenExpired,

    #[error("Refresh token revoked")]
    RefreshTokenRevoked,

    #[error("Refresh token reuse detected")]
    TokenReuseDetected,

    #[error("Access token expired")]
    ExpiredAccessToken,

    #[error("Malformed access token")]
    MalformedAccessToken,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Identity provider error: {0}")]
    ProviderError(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::AccountBlocked => {
                AppError::Forbidden(anyhow::anyhow!("Account is blocked"))
            }
            ServiceError::AccountNotFound => {
                AppError::AuthError(anyhow::anyhow!("Account not found"))
            }
            ServiceError::InvalidRefreshToken => {
                AppError::Unauthorized(anyhow::anyhow!("Invalid refresh token"))
            }
            ServiceError::RefreshTokenExpired => {
                AppError::Unauthorized(anyhow::anyhow!("Refresh token expired"))
            }
            ServiceError::RefreshTokenRevoked => {
                AppError::Unauthorized(anyhow::anyhow!("Refresh token revoked"))
            }
            ServiceError::TokenReuseDetected => {
                AppError::Forbidden(anyhow::anyhow!("Refresh token reuse detected"))
            }
            ServiceError::ExpiredAccessToken => {
                AppError::Unauthorized(anyhow::anyhow!("Access token expired"))
            }
            ServiceError::MalformedAccessToken => {
                AppError::Unauthorized(anyhow::anyhow!("Malformed access token"))
            }
            ServiceError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::ProviderError(msg) => {
                AppError::AuthError(anyhow::anyhow!("Identity provider error: {}", msg))
            }
        }
    }
}
