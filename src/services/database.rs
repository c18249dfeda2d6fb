//! PostgreSQL implementation of the token and account stores.

use async_trait::async_trait;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::error::AppError;
use crate::models::{RefreshTokenRecord, User};
use crate::services::{AccountStore, ServiceError, TokenStore};

/// PostgreSQL database wrapper.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Health check - ping the database.
    pub async fn health_check(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("Database health check failed: {}", e);
                AppError::DatabaseError(anyhow::anyhow!("Database health check failed: {}", e))
            })?;
        Ok(())
    }
}

#[async_trait]
impl TokenStore for Database {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO refresh_tokens
                (token_id, user_id, family_id, token_hash, expiry_utc, used_utc,
                 replaced_by_hash, revoked_utc, user_agent, ip_address, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(record.token_id)
        .bind(record.user_id)
        .bind(record.family_id)
        .bind(&record.token_hash)
        .bind(record.expiry_utc)
        .bind(record.used_utc)
        .bind(&record.replaced_by_hash)
        .bind(record.revoked_utc)
        .bind(&record.user_agent)
        .bind(&record.ip_address)
        .bind(record.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, ServiceError> {
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            "SELECT * FROM refresh_tokens WHERE token_hash = $1",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn consume(
        &self,
        token_hash: &str,
        replaced_by_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, ServiceError> {
        // Single conditional update keyed on the record still being active;
        // concurrent rotations of the same token can only win this once.
        let record = sqlx::query_as::<_, RefreshTokenRecord>(
            r#"
            UPDATE refresh_tokens
            SET used_utc = NOW(), replaced_by_hash = $2
            WHERE token_hash = $1 AND used_utc IS NULL AND revoked_utc IS NULL
            RETURNING *
            "#,
        )
        .bind(token_hash)
        .bind(replaced_by_hash)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }

    async fn revoke(&self, token_hash: &str) -> Result<(), ServiceError> {
        sqlx::query(
            "UPDATE refresh_tokens SET revoked_utc = NOW() WHERE token_hash = $1 AND revoked_utc IS NULL",
        )
        .bind(token_hash)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn revoke_family(&self, family_id: Uuid) -> Result<u64, ServiceError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_utc = NOW() WHERE family_id = $1 AND revoked_utc IS NULL",
        )
        .bind(family_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let result = sqlx::query(
            "UPDATE refresh_tokens SET revoked_utc = NOW() WHERE user_id = $1 AND revoked_utc IS NULL",
        )
        .bind(user_id)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, token_hash: &str) -> Result<(), ServiceError> {
        sqlx::query("DELETE FROM refresh_tokens WHERE token_hash = $1")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, ServiceError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expiry_utc < NOW()")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AccountStore for Database {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(user)
    }

    async fn insert(&self, user: &User) -> Result<(), ServiceError> {
        sqlx::query(
            r#"
            INSERT INTO users
                (user_id, email, password_hash, display_name, account_kind_code,
                 account_state_code, google_id, github_id, created_utc)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(user.user_id)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(&user.display_name)
        .bind(&user.account_kind_code)
        .bind(&user.account_state_code)
        .bind(&user.google_id)
        .bind(&user.github_id)
        .bind(user.created_utc)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_provider_subject(
        &self,
        user_id: Uuid,
        provider: &str,
        subject: &str,
    ) -> Result<(), ServiceError> {
        let query = match provider {
            "google" => "UPDATE users SET google_id = $1 WHERE user_id = $2",
            "github" => "UPDATE users SET github_id = $1 WHERE user_id = $2",
            _ => {
                return Err(ServiceError::ProviderError(format!(
                    "Unknown provider: {}",
                    provider
                )))
            }
        };

        sqlx::query(query)
            .bind(subject)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
