//! Store seams for the auth core, plus in-memory implementations for tests.
//!
//! The token store is the only shared mutable state in the protocol.
//! `consume` is its one read-modify-write operation and must be atomic:
//! two concurrent refreshes presenting the same token must not both succeed.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use crate::models::{RefreshTokenRecord, User};
use crate::services::ServiceError;

/// Durable bookkeeping of refresh-token records.
#[async_trait]
pub trait TokenStore: Send + Sync {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), ServiceError>;

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, ServiceError>;

    /// Atomically mark a record used and link its replacement. Returns `None`
    /// when the record is missing or already used/revoked; a caller that
    /// observed an active record and then gets `None` lost a rotation race.
    async fn consume(
        &self,
        token_hash: &str,
        replaced_by_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, ServiceError>;

    /// Revoke a single record. Idempotent; unknown hashes are a no-op.
    async fn revoke(&self, token_hash: &str) -> Result<(), ServiceError>;

    /// Revoke every record in a family. Returns how many were newly revoked.
    async fn revoke_family(&self, family_id: Uuid) -> Result<u64, ServiceError>;

    /// Revoke every record owned by an account.
    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, ServiceError>;

    async fn delete(&self, token_hash: &str) -> Result<(), ServiceError>;

    /// Remove records past their expiry. Returns how many were deleted.
    async fn delete_expired(&self) -> Result<u64, ServiceError>;
}

/// The account collaborator. The auth core reads id and state, and writes
/// only through the two explicit creation/link operations.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError>;

    async fn insert(&self, user: &User) -> Result<(), ServiceError>;

    /// Link a provider subject (e.g. a Google `sub`) to an account.
    async fn set_provider_subject(
        &self,
        user_id: Uuid,
        provider: &str,
        subject: &str,
    ) -> Result<(), ServiceError>;
}

/// In-memory token store for protocol tests. A single mutex makes `consume`
/// trivially atomic.
#[derive(Default)]
pub struct MemoryTokenStore {
    pub records: Mutex<HashMap<String, RefreshTokenRecord>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn lock_err<T>(e: std::sync::PoisonError<T>) -> ServiceError {
    ServiceError::Internal(anyhow::anyhow!("Store mutex poisoned: {}", e))
}

#[async_trait]
impl TokenStore for MemoryTokenStore {
    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), ServiceError> {
        self.records
            .lock()
            .map_err(lock_err)?
            .insert(record.token_hash.clone(), record.clone());
        Ok(())
    }

    async fn find_by_hash(
        &self,
        token_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, ServiceError> {
        Ok(self.records.lock().map_err(lock_err)?.get(token_hash).cloned())
    }

    async fn consume(
        &self,
        token_hash: &str,
        replaced_by_hash: &str,
    ) -> Result<Option<RefreshTokenRecord>, ServiceError> {
        let mut records = self.records.lock().map_err(lock_err)?;
        match records.get_mut(token_hash) {
            Some(record) if !record.is_used() && !record.is_revoked() => {
                record.used_utc = Some(Utc::now());
                record.replaced_by_hash = Some(replaced_by_hash.to_string());
                Ok(Some(record.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn revoke(&self, token_hash: &str) -> Result<(), ServiceError> {
        let mut records = self.records.lock().map_err(lock_err)?;
        if let Some(record) = records.get_mut(token_hash) {
            record.revoked_utc.get_or_insert_with(Utc::now);
        }
        Ok(())
    }

    async fn revoke_family(&self, family_id: Uuid) -> Result<u64, ServiceError> {
        let mut records = self.records.lock().map_err(lock_err)?;
        let mut revoked = 0;
        for record in records.values_mut() {
            if record.family_id == family_id && !record.is_revoked() {
                record.revoked_utc = Some(Utc::now());
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn revoke_all_for_user(&self, user_id: Uuid) -> Result<u64, ServiceError> {
        let mut records = self.records.lock().map_err(lock_err)?;
        let mut revoked = 0;
        for record in records.values_mut() {
            if record.user_id == user_id && !record.is_revoked() {
                record.revoked_utc = Some(Utc::now());
                revoked += 1;
            }
        }
        Ok(revoked)
    }

    async fn delete(&self, token_hash: &str) -> Result<(), ServiceError> {
        self.records.lock().map_err(lock_err)?.remove(token_hash);
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, ServiceError> {
        let mut records = self.records.lock().map_err(lock_err)?;
        let before = records.len();
        records.retain(|_, record| !record.is_expired());
        Ok((before - records.len()) as u64)
    }
}

/// In-memory account store for tests.
#[derive(Default)]
pub struct MemoryAccountStore {
    pub users: Mutex<HashMap<Uuid, User>>,
}

impl MemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, ServiceError> {
        Ok(self.users.lock().map_err(lock_err)?.get(&user_id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, ServiceError> {
        Ok(self
            .users
            .lock()
            .map_err(lock_err)?
            .values()
            .find(|u| u.email == email)
            .cloned())
    }

    async fn insert(&self, user: &User) -> Result<(), ServiceError> {
        self.users
            .lock()
            .map_err(lock_err)?
            .insert(user.user_id, user.clone());
        Ok(())
    }

    async fn set_provider_subject(
        &self,
        user_id: Uuid,
        provider: &str,
        subject: &str,
    ) -> Result<(), ServiceError> {
        let mut users = self.users.lock().map_err(lock_err)?;
        if let Some(user) = users.get_mut(&user_id) {
            match provider {
                "google" => user.google_id = Some(subject.to_string()),
                "github" => user.github_id = Some(subject.to_string()),
                _ => {
                    return Err(ServiceError::ProviderError(format!(
                        "Unknown provider: {}",
                        provider
                    )))
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionMeta;
    use chrono::Duration;

    fn record(user_id: Uuid, token: &str) -> RefreshTokenRecord {
        RefreshTokenRecord::new_family(user_id, token, 7, &SessionMeta::default())
    }

    #[tokio::test]
    async fn test_consume_is_single_shot() {
        let store = MemoryTokenStore::new();
        let rec = record(Uuid::new_v4(), "token");
        store.insert(&rec).await.unwrap();

        let first = store.consume(&rec.token_hash, "next-hash").await.unwrap();
        assert!(first.is_some());
        assert_eq!(
            first.unwrap().replaced_by_hash.as_deref(),
            Some("next-hash")
        );

        // Second consume observes the used record and must refuse.
        let second = store.consume(&rec.token_hash, "other-hash").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn test_consume_refuses_revoked() {
        let store = MemoryTokenStore::new();
        let rec = record(Uuid::new_v4(), "token");
        store.insert(&rec).await.unwrap();
        store.revoke(&rec.token_hash).await.unwrap();

        assert!(store
            .consume(&rec.token_hash, "next")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_revoke_family_hits_all_members() {
        let store = MemoryTokenStore::new();
        let user_id = Uuid::new_v4();
        let first = record(user_id, "token1");
        let second = RefreshTokenRecord::rotated(
            user_id,
            first.family_id,
            "token2",
            7,
            &SessionMeta::default(),
        );
        let unrelated = record(user_id, "token3");
        store.insert(&first).await.unwrap();
        store.insert(&second).await.unwrap();
        store.insert(&unrelated).await.unwrap();

        let revoked = store.revoke_family(first.family_id).await.unwrap();
        assert_eq!(revoked, 2);

        let other = store.find_by_hash(&unrelated.token_hash).await.unwrap();
        assert!(!other.unwrap().is_revoked());
    }

    #[tokio::test]
    async fn test_delete_expired_keeps_live_records() {
        let store = MemoryTokenStore::new();
        let live = record(Uuid::new_v4(), "live");
        let mut stale = record(Uuid::new_v4(), "stale");
        stale.expiry_utc = Utc::now() - Duration::hours(1);
        store.insert(&live).await.unwrap();
        store.insert(&stale).await.unwrap();

        assert_eq!(store.delete_expired().await.unwrap(), 1);
        assert!(store.find_by_hash(&stale.token_hash).await.unwrap().is_none());
        assert!(store.find_by_hash(&live.token_hash).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_revoke_is_idempotent() {
        let store = MemoryTokenStore::new();
        let rec = record(Uuid::new_v4(), "token");
        store.insert(&rec).await.unwrap();

        store.revoke(&rec.token_hash).await.unwrap();
        let first_stamp = store
            .find_by_hash(&rec.token_hash)
            .await
            .unwrap()
            .unwrap()
            .revoked_utc;

        store.revoke(&rec.token_hash).await.unwrap();
        let second_stamp = store
            .find_by_hash(&rec.token_hash)
            .await
            .unwrap()
            .unwrap()
            .revoked_utc;

        assert_eq!(first_stamp, second_stamp);
        // Unknown hash is a no-op, not an error.
        store.revoke("missing").await.unwrap();
    }
}
