//! Refresh token records - the persisted half of a session.
//!
//! Only the SHA-256 hash of the opaque token is stored. Every record carries
//! a family id shared by all tokens descended from one login; rotation links
//! records through `replaced_by_hash` so the chain stays reconstructable
//! until the expiry sweep removes it.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::FromRow;
use uuid::Uuid;

/// Provenance captured at issuance. No behavioral effect.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionMeta {
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
}

/// A stored refresh token.
#[derive(Debug, Clone, FromRow)]
pub struct RefreshTokenRecord {
    pub token_id: Uuid,
    pub user_id: Uuid,
    pub family_id: Uuid,
    pub token_hash: String,
    pub expiry_utc: DateTime<Utc>,
    pub used_utc: Option<DateTime<Utc>>,
    pub replaced_by_hash: Option<String>,
    pub revoked_utc: Option<DateTime<Utc>>,
    pub user_agent: Option<String>,
    pub ip_address: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl RefreshTokenRecord {
    /// Create the first record of a new family (fresh login).
    pub fn new_family(user_id: Uuid, token: &str, expiry_days: i64, meta: &SessionMeta) -> Self {
        Self::with_family(user_id, Uuid::new_v4(), token, expiry_days, meta)
    }

    /// Create a rotation successor. Inherits the family of the token it
    /// replaces.
    pub fn rotated(
        user_id: Uuid,
        family_id: Uuid,
        token: &str,
        expiry_days: i64,
        meta: &SessionMeta,
    ) -> Self {
        Self::with_family(user_id, family_id, token, expiry_days, meta)
    }

    fn with_family(
        user_id: Uuid,
        family_id: Uuid,
        token: &str,
        expiry_days: i64,
        meta: &SessionMeta,
    ) -> Self {
        let now = Utc::now();
        Self {
            token_id: Uuid::new_v4(),
            user_id,
            family_id,
            token_hash: Self::hash_token(token),
            expiry_utc: now + Duration::days(expiry_days),
            used_utc: None,
            replaced_by_hash: None,
            revoked_utc: None,
            user_agent: meta.user_agent.clone(),
            ip_address: meta.ip_address.clone(),
            created_utc: now,
        }
    }

    /// Hash a token using SHA-256. Raw token values never reach storage.
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_used(&self) -> bool {
        self.used_utc.is_some()
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_utc.is_some()
    }

    pub fn is_expired(&self) -> bool {
        Utc::now() > self.expiry_utc
    }

    /// Eligible for rotation: not used, not revoked, not expired.
    pub fn is_active(&self) -> bool {
        !self.is_used() && !self.is_revoked() && !self.is_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_family_record() {
        let user_id = Uuid::new_v4();
        let record =
            RefreshTokenRecord::new_family(user_id, "token_abc", 7, &SessionMeta::default());

        assert_eq!(record.user_id, user_id);
        assert_ne!(record.token_hash, "token_abc");
        assert!(record.is_active());
        assert!(!record.family_id.is_nil());
    }

    #[test]
    fn test_rotation_preserves_family() {
        let user_id = Uuid::new_v4();
        let first = RefreshTokenRecord::new_family(user_id, "t0", 7, &SessionMeta::default());
        let second =
            RefreshTokenRecord::rotated(user_id, first.family_id, "t1", 7, &SessionMeta::default());

        assert_eq!(second.family_id, first.family_id);
        assert_ne!(second.token_hash, first.token_hash);
    }

    #[test]
    fn test_expiry() {
        let mut record = RefreshTokenRecord::new_family(
            Uuid::new_v4(),
            "token_abc",
            7,
            &SessionMeta::default(),
        );

        assert!(!record.is_expired());

        record.expiry_utc = Utc::now() - Duration::seconds(1);
        assert!(record.is_expired());
        assert!(!record.is_active());
    }

    #[test]
    fn test_used_and_revoked_are_inactive() {
        let mut record = RefreshTokenRecord::new_family(
            Uuid::new_v4(),
            "token_abc",
            7,
            &SessionMeta::default(),
        );

        record.used_utc = Some(Utc::now());
        assert!(!record.is_active());

        record.used_utc = None;
        record.revoked_utc = Some(Utc::now());
        assert!(!record.is_active());
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(
            RefreshTokenRecord::hash_token("abc"),
            RefreshTokenRecord::hash_token("abc")
        );
        assert_ne!(
            RefreshTokenRecord::hash_token("abc"),
            RefreshTokenRecord::hash_token("abd")
        );
    }
}
