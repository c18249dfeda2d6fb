mod auth;

pub use auth::{
    LoginRequest, LogoutRequest, MessageResponse, RefreshRequest, RegisterRequest,
    RegisterResponse,
};
