mod auth;
mod database;
mod error;
mod identity;
mod store;
pub mod sweeper;
mod token;

pub use auth::AuthService;
pub use database::Database;
pub use error::ServiceError;
pub use identity::{GithubProvider, GoogleProvider, IdentityProvider, ProviderIdentity};
pub use store::{AccountStore, MemoryAccountStore, MemoryTokenStore, TokenStore};
pub use token::{AccessTokenClaims, TokenResponse, TokenService};
