//! Browser-redirect endpoints for social login.
//!
//! `/auth/:provider` starts the flow; `/auth/:provider/callback` finishes
//! it. State and PKCE verifier ride in short-lived cookies; the completed
//! session rides in the same cookies as password login, never in the
//! redirect URL.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Path, Query, State},
    http::HeaderMap,
    response::Redirect,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::error::AppError;
use crate::services::IdentityProvider;
use crate::AppState;

use super::session::{apply_session_cookies, session_meta};

const STATE_COOKIE: &str = "oauth_state";
const VERIFIER_COOKIE: &str = "oauth_verifier";

#[derive(Debug, Deserialize)]
pub struct OAuthCallbackQuery {
    pub code: String,
    pub state: String,
}

#[utoipa::path(
    get,
    path = "/auth/{provider}",
    params(("provider" = String, Path, description = "Identity provider key")),
    responses(
        (status = 303, description = "Redirect to the provider"),
        (status = 404, description = "Unknown provider"),
    ),
    tag = "auth"
)]
pub async fn oauth_start(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let provider = lookup_provider(&state, &provider)?;

    let state_val = uuid::Uuid::new_v4().to_string();
    let code_verifier = {
        let mut bytes = [0u8; 32];
        rand::thread_rng().fill(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    };
    let code_challenge = {
        let mut hasher = Sha256::new();
        hasher.update(code_verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(hasher.finalize())
    };

    let authorize_url = provider.authorize_url(&state_val, &code_challenge);

    // SameSite=Lax: the provider sends the browser back with a cross-site
    // top-level GET, which Strict cookies would not accompany.
    let jar = jar
        .add(temp_cookie(STATE_COOKIE, state_val, state.config.cookies.secure))
        .add(temp_cookie(
            VERIFIER_COOKIE,
            code_verifier,
            state.config.cookies.secure,
        ));

    Ok((jar, Redirect::to(&authorize_url)))
}

#[utoipa::path(
    get,
    path = "/auth/{provider}/callback",
    params(
        ("provider" = String, Path, description = "Identity provider key"),
        ("code" = String, Query, description = "Authorization code"),
        ("state" = String, Query, description = "Anti-forgery state"),
    ),
    responses(
        (status = 303, description = "Redirect to the frontend with session cookies set"),
        (status = 401, description = "State mismatch or exchange failure"),
    ),
    tag = "auth"
)]
pub async fn oauth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    Query(query): Query<OAuthCallbackQuery>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Redirect), AppError> {
    let provider = lookup_provider(&state, &provider)?;

    let expected_state = jar
        .get(STATE_COOKIE)
        .map(|c| c.value().to_string())
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing OAuth state cookie")))?;
    if expected_state != query.state {
        return Err(AppError::Unauthorized(anyhow::anyhow!("OAuth state mismatch")));
    }

    let code_verifier = jar
        .get(VERIFIER_COOKIE)
        .map(|c| c.value().to_string())
        .unwrap_or_default();

    let identity = provider.exchange_code(&query.code, &code_verifier).await?;

    let meta = session_meta(&headers, addr);
    let tokens = state
        .auth_service
        .oauth_login(&identity, provider.name(), &meta)
        .await?;

    let jar = jar
        .remove(Cookie::from(STATE_COOKIE))
        .remove(Cookie::from(VERIFIER_COOKIE));
    let jar = apply_session_cookies(jar, &state, &tokens);

    Ok((jar, Redirect::to(provider.frontend_redirect())))
}

fn lookup_provider(
    state: &AppState,
    name: &str,
) -> Result<Arc<dyn IdentityProvider>, AppError> {
    state
        .identity_providers
        .get(name)
        .cloned()
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Unknown provider: {}", name)))
}

fn temp_cookie(name: &'static str, value: String, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .max_age(time::Duration::minutes(5))
        .build()
}
