//! Password login, token rotation, and logout endpoints.
//!
//! Tokens travel two ways: Set-Cookie for browsers and the JSON body for
//! API clients. The cookie policy is identical on every issuance path, and
//! the refresh cookie only travels to the refresh endpoint.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Json, State},
    http::{header, HeaderMap, StatusCode},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use validator::Validate;

use crate::config::CookieConfig;
use crate::dtos::{LoginRequest, LogoutRequest, MessageResponse, RefreshRequest};
use crate::error::AppError;
use crate::middleware::CurrentUser;
use crate::models::SessionMeta;
use crate::services::TokenResponse;
use crate::AppState;

pub(crate) fn session_meta(headers: &HeaderMap, addr: SocketAddr) -> SessionMeta {
    SessionMeta {
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string()),
        ip_address: Some(addr.ip().to_string()),
    }
}

pub(crate) fn apply_session_cookies(
    jar: CookieJar,
    state: &AppState,
    tokens: &TokenResponse,
) -> CookieJar {
    let cookies = &state.config.cookies;
    let access = Cookie::build((cookies.access_name.clone(), tokens.access_token.clone()))
        .path("/")
        .http_only(true)
        .secure(cookies.secure)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::seconds(tokens.expires_in));
    let refresh = Cookie::build((cookies.refresh_name.clone(), tokens.refresh_token.clone()))
        .path(cookies.refresh_path.clone())
        .http_only(true)
        .secure(cookies.secure)
        .same_site(SameSite::Strict)
        .max_age(time::Duration::days(
            state.config.jwt.refresh_token_expiry_days,
        ));
    jar.add(access).add(refresh)
}

pub(crate) fn clear_session_cookies(jar: CookieJar, cookies: &CookieConfig) -> CookieJar {
    let access = Cookie::build((cookies.access_name.clone(), "")).path("/");
    let refresh = Cookie::build((cookies.refresh_name.clone(), ""))
        .path(cookies.refresh_path.clone());
    jar.remove(access).remove(refresh)
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = TokenResponse),
        (status = 401, description = "Invalid credentials"),
        (status = 403, description = "Account blocked"),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<(CookieJar, Json<TokenResponse>), AppError> {
    req.validate()?;

    let meta = session_meta(&headers, addr);
    let tokens = state.auth_service.login(&req.email, &req.password, &meta).await?;

    let jar = apply_session_cookies(jar, &state, &tokens);
    Ok((jar, Json(tokens)))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body(content = RefreshRequest, description = "Optional when the refresh cookie is present"),
    responses(
        (status = 200, description = "Tokens rotated", body = TokenResponse),
        (status = 401, description = "Invalid, expired, or revoked refresh token"),
        (status = 403, description = "Reuse detected or account blocked"),
    ),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Option<Json<RefreshRequest>>,
) -> Result<(CookieJar, Json<TokenResponse>), AppError> {
    let presented = presented_refresh_token(&jar, &state, body.map(|Json(b)| b.refresh_token))
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing refresh token")))?;

    let meta = session_meta(&headers, addr);
    let tokens = state.auth_service.refresh(&presented, &meta).await?;

    let jar = apply_session_cookies(jar, &state, &tokens);
    Ok((jar, Json(tokens)))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body(content = LogoutRequest, description = "Optional when the refresh cookie is present"),
    responses(
        (status = 200, description = "Session revoked", body = MessageResponse),
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    body: Option<Json<LogoutRequest>>,
) -> Result<(CookieJar, Json<MessageResponse>), AppError> {
    // Idempotent by design of the service call; a missing token is also fine
    // so a half-logged-out browser can always converge to logged out.
    if let Some(presented) =
        presented_refresh_token(&jar, &state, body.map(|Json(b)| b.refresh_token))
    {
        state.auth_service.logout(&presented).await?;
    }

    let jar = clear_session_cookies(jar, &state.config.cookies);
    Ok((
        jar,
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    ))
}

#[utoipa::path(
    post,
    path = "/auth/logout-all",
    responses(
        (status = 200, description = "All sessions revoked", body = MessageResponse),
        (status = 401, description = "Not authenticated"),
    ),
    security(("bearer_auth" = [])),
    tag = "auth"
)]
pub async fn logout_all(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    jar: CookieJar,
) -> Result<(CookieJar, Json<MessageResponse>), AppError> {
    let revoked = state.auth_service.logout_all(user.user_id).await?;

    let jar = clear_session_cookies(jar, &state.config.cookies);
    Ok((
        jar,
        Json(MessageResponse {
            message: format!("Revoked {} sessions", revoked),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/health",
    responses((status = 200, description = "Service healthy")),
    tag = "health"
)]
pub async fn health_check(State(state): State<AppState>) -> Result<StatusCode, AppError> {
    state.db.health_check().await?;
    Ok(StatusCode::OK)
}

fn presented_refresh_token(
    jar: &CookieJar,
    state: &AppState,
    body_token: Option<String>,
) -> Option<String> {
    jar.get(&state.config.cookies.refresh_name)
        .map(|c| c.value().to_string())
        .or(body_token)
}
