pub mod refresh_token;
pub mod user;

pub use refresh_token::{RefreshTokenRecord, SessionMeta};
pub use user::{AccountKind, AccountState, User, UserResponse};
