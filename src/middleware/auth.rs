//! Request authentication for protected routes.
//!
//! Verification is purely cryptographic plus one account lookup; the token
//! store is never consulted here, so a revoked session stays usable until
//! its access token expires.

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use crate::error::AppError;
use crate::models::User;
use crate::services::ServiceError;
use crate::AppState;

/// The authenticated account, inserted as a request extension.
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Authentication required")))
    }
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_token(&request, &state.config.cookies.access_name)
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing access token")))?;

    let claims = state.issuer.verify_access_token(&token)?;

    let user = state
        .accounts
        .find_by_id(claims.sub)
        .await?
        .ok_or(ServiceError::AccountNotFound)?;

    if user.is_blocked() {
        return Err(ServiceError::AccountBlocked.into());
    }

    request.extensions_mut().insert(CurrentUser(user));
    Ok(next.run(request).await)
}

/// Cookie first, then the Authorization header for non-browser clients.
fn extract_token(request: &Request, cookie_name: &str) -> Option<String> {
    let jar = CookieJar::from_headers(request.headers());
    if let Some(cookie) = jar.get(cookie_name) {
        return Some(cookie.value().to_string());
    }

    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_header(name: header::HeaderName, value: &str) -> Request {
        Request::builder()
            .header(name, value)
            .body(Body::empty())
            .unwrap()
    }

    #[test]
    fn test_extracts_bearer_token() {
        let request = request_with_header(header::AUTHORIZATION, "Bearer abc123");
        assert_eq!(extract_token(&request, "lms_access").as_deref(), Some("abc123"));
    }

    #[test]
    fn test_cookie_takes_precedence() {
        let request = Request::builder()
            .header(header::COOKIE, "lms_access=from-cookie")
            .header(header::AUTHORIZATION, "Bearer from-header")
            .body(Body::empty())
            .unwrap();
        assert_eq!(
            extract_token(&request, "lms_access").as_deref(),
            Some("from-cookie")
        );
    }

    #[test]
    fn test_rejects_non_bearer_scheme() {
        let request = request_with_header(header::AUTHORIZATION, "Basic abc123");
        assert!(extract_token(&request, "lms_access").is_none());
    }

    #[test]
    fn test_no_credentials() {
        let request = Request::builder().body(Body::empty()).unwrap();
        assert!(extract_token(&request, "lms_access").is_none());
    }
}
