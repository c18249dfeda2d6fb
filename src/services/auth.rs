//! Session lifecycle: login, refresh-token rotation, logout.
//!
//! The refresh path is the security-critical state machine. A refresh token
//! is single-use; re-presenting a consumed token can only mean the token was
//! captured after the legitimate client rotated past it, so the response is
//! to revoke the whole family rather than guess which side is the attacker.

use std::sync::Arc;
use uuid::Uuid;

use crate::models::{RefreshTokenRecord, SessionMeta, User};
use crate::services::{
    AccountStore, ProviderIdentity, ServiceError, TokenResponse, TokenService, TokenStore,
};
use crate::utils::{verify_password, Password};

#[derive(Clone)]
pub struct AuthService {
    accounts: Arc<dyn AccountStore>,
    tokens: Arc<dyn TokenStore>,
    issuer: TokenService,
    refresh_token_expiry_days: i64,
}

impl AuthService {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        tokens: Arc<dyn TokenStore>,
        issuer: TokenService,
        refresh_token_expiry_days: i64,
    ) -> Self {
        Self {
            accounts,
            tokens,
            issuer,
            refresh_token_expiry_days,
        }
    }

    pub async fn login(
        &self,
        email: &str,
        password: &str,
        meta: &SessionMeta,
    ) -> Result<TokenResponse, ServiceError> {
        let user = self
            .accounts
            .find_by_email(email)
            .await?
            .ok_or(ServiceError::InvalidCredentials)?;

        let stored_hash = user
            .password_hash
            .as_deref()
            .ok_or(ServiceError::InvalidCredentials)?;

        verify_password(&Password::new(password.to_string()), stored_hash)
            .map_err(|_| ServiceError::InvalidCredentials)?;

        if user.is_blocked() {
            return Err(ServiceError::AccountBlocked);
        }

        tracing::info!(user_id = %user.user_id, "User logged in");

        self.open_session(user.user_id, None, meta).await
    }

    /// Social login: find or create the account for a normalized provider
    /// identity, then the same issuance path as password login.
    pub async fn oauth_login(
        &self,
        identity: &ProviderIdentity,
        provider: &str,
        meta: &SessionMeta,
    ) -> Result<TokenResponse, ServiceError> {
        let user = match self.accounts.find_by_email(&identity.email).await? {
            Some(user) => {
                self.accounts
                    .set_provider_subject(user.user_id, provider, &identity.subject)
                    .await?;
                user
            }
            None => {
                let user = User::new_social(identity.email.clone(), identity.name.clone());
                self.accounts.insert(&user).await?;
                self.accounts
                    .set_provider_subject(user.user_id, provider, &identity.subject)
                    .await?;
                user
            }
        };

        if user.is_blocked() {
            return Err(ServiceError::AccountBlocked);
        }

        tracing::info!(user_id = %user.user_id, provider = %provider, "User logged in via provider");

        self.open_session(user.user_id, None, meta).await
    }

    /// Exchange a refresh token for a new pair. Checks run in a fixed order;
    /// the containment branches revoke before surfacing their error.
    pub async fn refresh(
        &self,
        presented_token: &str,
        meta: &SessionMeta,
    ) -> Result<TokenResponse, ServiceError> {
        let hash = RefreshTokenRecord::hash_token(presented_token);

        let record = self
            .tokens
            .find_by_hash(&hash)
            .await?
            .ok_or(ServiceError::InvalidRefreshToken)?;

        if record.is_used() {
            let revoked = self.tokens.revoke_family(record.family_id).await?;
            tracing::warn!(
                user_id = %record.user_id,
                family_id = %record.family_id,
                revoked,
                "Refresh token reuse detected, family revoked"
            );
            return Err(ServiceError::TokenReuseDetected);
        }

        if record.is_revoked() {
            return Err(ServiceError::RefreshTokenRevoked);
        }

        if record.is_expired() {
            self.tokens.delete(&hash).await?;
            return Err(ServiceError::RefreshTokenExpired);
        }

        let user = match self.accounts.find_by_id(record.user_id).await? {
            Some(user) => user,
            None => {
                // Account deleted mid-session.
                self.tokens.revoke_family(record.family_id).await?;
                tracing::warn!(
                    user_id = %record.user_id,
                    family_id = %record.family_id,
                    "Refresh for missing account, family revoked"
                );
                return Err(ServiceError::AccountNotFound);
            }
        };

        if user.is_blocked() {
            let revoked = self.tokens.revoke_all_for_user(user.user_id).await?;
            tracing::warn!(
                user_id = %user.user_id,
                revoked,
                "Refresh for blocked account, all sessions revoked"
            );
            return Err(ServiceError::AccountBlocked);
        }

        let next_token = self.issuer.issue_refresh_token();
        let next_hash = RefreshTokenRecord::hash_token(&next_token);

        // The one atomic mutation of the protocol. Losing this race means a
        // concurrent rotation already consumed the record, which is the same
        // theft signal as branch two above.
        let consumed = match self.tokens.consume(&hash, &next_hash).await? {
            Some(record) => record,
            None => {
                let revoked = self.tokens.revoke_family(record.family_id).await?;
                tracing::warn!(
                    user_id = %record.user_id,
                    family_id = %record.family_id,
                    revoked,
                    "Lost rotation race, family revoked"
                );
                return Err(ServiceError::TokenReuseDetected);
            }
        };

        tracing::info!(user_id = %user.user_id, family_id = %consumed.family_id, "Token rotated");

        self.open_session_with_token(user.user_id, Some(consumed.family_id), next_token, meta)
            .await
    }

    /// Revoke a single session. Idempotent: revoking an already-revoked or
    /// unknown token is not an error.
    pub async fn logout(&self, presented_token: &str) -> Result<(), ServiceError> {
        let hash = RefreshTokenRecord::hash_token(presented_token);
        self.tokens.revoke(&hash).await?;
        Ok(())
    }

    /// Revoke every session owned by an account.
    pub async fn logout_all(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let revoked = self.tokens.revoke_all_for_user(user_id).await?;
        tracing::info!(user_id = %user_id, revoked, "All sessions revoked");
        Ok(revoked)
    }

    async fn open_session(
        &self,
        user_id: Uuid,
        family_id: Option<Uuid>,
        meta: &SessionMeta,
    ) -> Result<TokenResponse, ServiceError> {
        let refresh_token = self.issuer.issue_refresh_token();
        self.open_session_with_token(user_id, family_id, refresh_token, meta)
            .await
    }

    async fn open_session_with_token(
        &self,
        user_id: Uuid,
        family_id: Option<Uuid>,
        refresh_token: String,
        meta: &SessionMeta,
    ) -> Result<TokenResponse, ServiceError> {
        let record = match family_id {
            Some(family_id) => RefreshTokenRecord::rotated(
                user_id,
                family_id,
                &refresh_token,
                self.refresh_token_expiry_days,
                meta,
            ),
            None => RefreshTokenRecord::new_family(
                user_id,
                &refresh_token,
                self.refresh_token_expiry_days,
                meta,
            ),
        };
        self.tokens.insert(&record).await?;

        let access_token = self.issuer.issue_access_token(user_id)?;

        Ok(TokenResponse {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.issuer.access_token_expiry_seconds(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwtConfig;
    use crate::models::AccountState;
    use crate::services::{MemoryAccountStore, MemoryTokenStore};
    use crate::utils::hash_password;
    use chrono::{Duration, Utc};

    struct Harness {
        auth: AuthService,
        accounts: Arc<MemoryAccountStore>,
        tokens: Arc<MemoryTokenStore>,
        issuer: TokenService,
        user_id: Uuid,
    }

    async fn harness() -> Harness {
        let accounts = Arc::new(MemoryAccountStore::new());
        let tokens = Arc::new(MemoryTokenStore::new());
        let issuer = TokenService::new(&JwtConfig {
            secret: "test-secret-test-secret-test-secret!".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        });
        let auth = AuthService::new(accounts.clone(), tokens.clone(), issuer.clone(), 7);

        let hash = hash_password(&Password::new("hunter2hunter2".to_string())).unwrap();
        let user = User::new_password("student@example.com".to_string(), hash, None);
        let user_id = user.user_id;
        accounts.insert(&user).await.unwrap();

        Harness {
            auth,
            accounts,
            tokens,
            issuer,
            user_id,
        }
    }

    fn meta() -> SessionMeta {
        SessionMeta::default()
    }

    async fn login(h: &Harness) -> TokenResponse {
        h.auth
            .login("student@example.com", "hunter2hunter2", &meta())
            .await
            .unwrap()
    }

    fn block_user(h: &Harness) {
        let mut users = h.accounts.users.lock().unwrap();
        users.get_mut(&h.user_id).unwrap().account_state_code =
            AccountState::Blocked.as_str().to_string();
    }

    #[tokio::test]
    async fn test_login_issues_valid_pair() {
        let h = harness().await;
        let pair = login(&h).await;

        let claims = h.issuer.verify_access_token(&pair.access_token).unwrap();
        assert_eq!(claims.sub, h.user_id);

        let hash = RefreshTokenRecord::hash_token(&pair.refresh_token);
        let record = h.tokens.find_by_hash(&hash).await.unwrap().unwrap();
        assert!(record.is_active());
        assert_eq!(record.user_id, h.user_id);
    }

    #[tokio::test]
    async fn test_login_wrong_password() {
        let h = harness().await;
        let err = h
            .auth
            .login("student@example.com", "wrong", &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_unknown_email() {
        let h = harness().await;
        let err = h
            .auth
            .login("nobody@example.com", "hunter2hunter2", &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidCredentials));
    }

    #[tokio::test]
    async fn test_login_blocked_account() {
        let h = harness().await;
        block_user(&h);

        let err = h
            .auth
            .login("student@example.com", "hunter2hunter2", &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AccountBlocked));
    }

    #[tokio::test]
    async fn test_rotation_chain_integrity() {
        let h = harness().await;
        let pair = login(&h).await;

        let original_family = h
            .tokens
            .find_by_hash(&RefreshTokenRecord::hash_token(&pair.refresh_token))
            .await
            .unwrap()
            .unwrap()
            .family_id;

        let mut seen = vec![pair.refresh_token.clone()];
        let mut current = pair.refresh_token;
        for _ in 0..5 {
            let next = h.auth.refresh(&current, &meta()).await.unwrap();
            assert!(!seen.contains(&next.refresh_token));
            seen.push(next.refresh_token.clone());
            current = next.refresh_token;
        }

        let records = h.tokens.records.lock().unwrap();
        assert_eq!(records.len(), 6);
        assert!(records.values().all(|r| r.family_id == original_family));
    }

    #[tokio::test]
    async fn test_rotation_marks_old_record_used() {
        let h = harness().await;
        let r0 = login(&h).await.refresh_token;
        let r1 = h.auth.refresh(&r0, &meta()).await.unwrap().refresh_token;

        let old = h
            .tokens
            .find_by_hash(&RefreshTokenRecord::hash_token(&r0))
            .await
            .unwrap()
            .unwrap();
        assert!(old.is_used());
        assert_eq!(
            old.replaced_by_hash.as_deref(),
            Some(RefreshTokenRecord::hash_token(&r1).as_str())
        );
    }

    #[tokio::test]
    async fn test_reuse_detection_revokes_family() {
        let h = harness().await;
        let r0 = login(&h).await.refresh_token;
        let r1 = h.auth.refresh(&r0, &meta()).await.unwrap().refresh_token;
        let r2 = h.auth.refresh(&r1, &meta()).await.unwrap().refresh_token;

        // Re-presenting the consumed r1 is the theft signal.
        let err = h.auth.refresh(&r1, &meta()).await.unwrap_err();
        assert!(matches!(err, ServiceError::TokenReuseDetected));

        // The previously valid r2 went down with the family.
        let err = h.auth.refresh(&r2, &meta()).await.unwrap_err();
        assert!(matches!(err, ServiceError::RefreshTokenRevoked));
    }

    #[tokio::test]
    async fn test_unknown_refresh_token() {
        let h = harness().await;
        let err = h.auth.refresh("bogus-token", &meta()).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidRefreshToken));
    }

    #[tokio::test]
    async fn test_expired_refresh_token_is_removed() {
        let h = harness().await;
        let r0 = login(&h).await.refresh_token;
        let hash = RefreshTokenRecord::hash_token(&r0);

        {
            let mut records = h.tokens.records.lock().unwrap();
            records.get_mut(&hash).unwrap().expiry_utc = Utc::now() - Duration::hours(1);
        }

        let err = h.auth.refresh(&r0, &meta()).await.unwrap_err();
        assert!(matches!(err, ServiceError::RefreshTokenExpired));
        assert!(h.tokens.find_by_hash(&hash).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_blocked_account_cuts_off_refresh() {
        let h = harness().await;
        let r0 = login(&h).await.refresh_token;
        let other = login(&h).await.refresh_token;
        block_user(&h);

        let err = h.auth.refresh(&r0, &meta()).await.unwrap_err();
        assert!(matches!(err, ServiceError::AccountBlocked));

        // Every record owned by the account is revoked, not just this one.
        let records = h.tokens.records.lock().unwrap();
        assert!(records.values().all(|r| r.is_revoked()));
        drop(records);
        let _ = other;
    }

    #[tokio::test]
    async fn test_missing_account_revokes_family() {
        let h = harness().await;
        let r0 = login(&h).await.refresh_token;
        h.accounts.users.lock().unwrap().remove(&h.user_id);

        let err = h.auth.refresh(&r0, &meta()).await.unwrap_err();
        assert!(matches!(err, ServiceError::AccountNotFound));

        let hash = RefreshTokenRecord::hash_token(&r0);
        let record = h.tokens.find_by_hash(&hash).await.unwrap().unwrap();
        assert!(record.is_revoked());
    }

    #[tokio::test]
    async fn test_logout_is_idempotent() {
        let h = harness().await;
        let r0 = login(&h).await.refresh_token;

        h.auth.logout(&r0).await.unwrap();
        h.auth.logout(&r0).await.unwrap();

        let hash = RefreshTokenRecord::hash_token(&r0);
        let record = h.tokens.find_by_hash(&hash).await.unwrap().unwrap();
        assert!(record.is_revoked());

        // Unknown token logout is also fine.
        h.auth.logout("never-issued").await.unwrap();
    }

    #[tokio::test]
    async fn test_revoked_token_cannot_rotate() {
        let h = harness().await;
        let r0 = login(&h).await.refresh_token;
        h.auth.logout(&r0).await.unwrap();

        let err = h.auth.refresh(&r0, &meta()).await.unwrap_err();
        assert!(matches!(err, ServiceError::RefreshTokenRevoked));
    }

    #[tokio::test]
    async fn test_access_tokens_survive_refresh_revocation() {
        let h = harness().await;
        let pair = login(&h).await;

        let revoked = h.auth.logout_all(h.user_id).await.unwrap();
        assert_eq!(revoked, 1);

        // The access token is stateless; it stays valid for its own TTL.
        let claims = h.issuer.verify_access_token(&pair.access_token).unwrap();
        assert_eq!(claims.sub, h.user_id);
        assert_eq!(pair.expires_in, h.issuer.access_token_expiry_seconds());

        // But the refresh token is dead.
        let err = h
            .auth
            .refresh(&pair.refresh_token, &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RefreshTokenRevoked));
    }

    #[tokio::test]
    async fn test_full_reuse_scenario() {
        // login -> (A0, R0); refresh(R0) -> (A1, R1); refresh(R0) again is
        // reuse; refresh(R1) then proves whole-family containment.
        let h = harness().await;
        let first = login(&h).await;
        let second = h.auth.refresh(&first.refresh_token, &meta()).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
        assert_ne!(first.access_token, second.access_token);

        let err = h
            .auth
            .refresh(&first.refresh_token, &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::TokenReuseDetected));

        let err = h
            .auth
            .refresh(&second.refresh_token, &meta())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RefreshTokenRevoked));
    }

    #[tokio::test]
    async fn test_oauth_login_creates_and_links_account() {
        let h = harness().await;
        let identity = ProviderIdentity {
            subject: "goog-123".to_string(),
            email: "new@example.com".to_string(),
            name: Some("New Student".to_string()),
            avatar_url: None,
        };

        let pair = h.auth.oauth_login(&identity, "google", &meta()).await.unwrap();
        assert!(!pair.refresh_token.is_empty());

        let user = h
            .accounts
            .find_by_email("new@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.google_id.as_deref(), Some("goog-123"));
        assert!(user.password_hash.is_none());

        // Second login with the same identity reuses the account.
        h.auth.oauth_login(&identity, "google", &meta()).await.unwrap();
        let users = h.accounts.users.lock().unwrap();
        assert_eq!(users.len(), 2);
    }

    #[tokio::test]
    async fn test_separate_logins_get_separate_families() {
        let h = harness().await;
        let first = login(&h).await.refresh_token;
        let second = login(&h).await.refresh_token;

        let records = h.tokens.records.lock().unwrap();
        let f1 = records[&RefreshTokenRecord::hash_token(&first)].family_id;
        let f2 = records[&RefreshTokenRecord::hash_token(&second)].family_id;
        assert_ne!(f1, f2);
    }
}
