pub mod registration;
pub mod session;
pub mod social;

pub use registration::register;
pub use session::{health_check, login, logout, logout_all, refresh};
pub use social::{oauth_callback, oauth_start, OAuthCallbackQuery};
