//! User model - the account collaborator as seen by the auth core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

/// Account kinds. Stored as a code column on the account rather than split
/// collections, so token records carry only a `user_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountKind {
    Student,
    Admin,
}

impl AccountKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountKind::Student => "student",
            AccountKind::Admin => "admin",
        }
    }
}

/// Account state codes. The auth core only ever reads this flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountState {
    Active,
    Blocked,
}

impl AccountState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountState::Active => "active",
            AccountState::Blocked => "blocked",
        }
    }
}

/// User entity.
#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub password_hash: Option<String>,
    pub display_name: Option<String>,
    pub account_kind_code: String,
    pub account_state_code: String,
    pub google_id: Option<String>,
    pub github_id: Option<String>,
    pub created_utc: DateTime<Utc>,
}

impl User {
    /// Create a password-based account. The caller hashes the password first.
    pub fn new_password(email: String, password_hash: String, display_name: Option<String>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email,
            password_hash: Some(password_hash),
            display_name,
            account_kind_code: AccountKind::Student.as_str().to_string(),
            account_state_code: AccountState::Active.as_str().to_string(),
            google_id: None,
            github_id: None,
            created_utc: Utc::now(),
        }
    }

    /// Create a social-login account. No local credential.
    pub fn new_social(email: String, display_name: Option<String>) -> Self {
        Self {
            user_id: Uuid::new_v4(),
            email,
            password_hash: None,
            display_name,
            account_kind_code: AccountKind::Student.as_str().to_string(),
            account_state_code: AccountState::Active.as_str().to_string(),
            google_id: None,
            github_id: None,
            created_utc: Utc::now(),
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.account_state_code == AccountState::Blocked.as_str()
    }

    /// Convert to sanitized response (no credential fields).
    pub fn sanitized(&self) -> UserResponse {
        UserResponse::from(self.clone())
    }
}

/// User response for API (without sensitive fields).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserResponse {
    pub user_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub account_kind_code: String,
    pub created_utc: DateTime<Utc>,
}

impl From<User> for UserResponse {
    fn from(u: User) -> Self {
        Self {
            user_id: u.user_id,
            email: u.email,
            display_name: u.display_name,
            account_kind_code: u.account_kind_code,
            created_utc: u.created_utc,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_account_is_active_student() {
        let user = User::new_password("s@example.com".to_string(), "hash".to_string(), None);

        assert!(!user.is_blocked());
        assert_eq!(user.account_kind_code, "student");
        assert!(user.password_hash.is_some());
    }

    #[test]
    fn test_social_account_has_no_credential() {
        let user = User::new_social("s@example.com".to_string(), Some("S".to_string()));
        assert!(user.password_hash.is_none());
    }

    #[test]
    fn test_sanitized_drops_credentials() {
        let user = User::new_password("s@example.com".to_string(), "hash".to_string(), None);
        let response = serde_json::to_string(&user.sanitized()).unwrap();
        assert!(!response.contains("hash"));
    }
}
