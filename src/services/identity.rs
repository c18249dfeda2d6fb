//! Pluggable identity providers for social login.
//!
//! Each provider exchanges an authorization code for a normalized identity
//! tuple; the auth service consumes that tuple through the same issuance
//! path as password login. No provider SDK globals.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::OAuthProviderConfig;
use crate::services::ServiceError;

/// Normalized identity produced by every provider.
#[derive(Debug, Clone)]
pub struct ProviderIdentity {
    pub subject: String,
    pub email: String,
    pub name: Option<String>,
    pub avatar_url: Option<String>,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Stable provider key, also the account-store link column.
    fn name(&self) -> &'static str;

    /// Authorization URL to redirect the user to.
    fn authorize_url(&self, state: &str, code_challenge: &str) -> String;

    /// Where to send the browser once the login completes.
    fn frontend_redirect(&self) -> &str;

    /// Exchange the callback code for a normalized identity.
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<ProviderIdentity, ServiceError>;
}

pub struct GoogleProvider {
    http: reqwest::Client,
    config: OAuthProviderConfig,
}

#[derive(Debug, Deserialize)]
struct GoogleTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GoogleUserInfo {
    id: String,
    email: String,
    verified_email: bool,
    name: Option<String>,
    picture: Option<String>,
}

impl GoogleProvider {
    pub fn new(config: OAuthProviderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn name(&self) -> &'static str {
        "google"
    }

    fn authorize_url(&self, state: &str, code_challenge: &str) -> String {
        format!(
            "https://accounts.google.com/o/oauth2/v2/auth?client_id={}&redirect_uri={}&response_type=code&scope=openid%20email%20profile&state={}&code_challenge={}&code_challenge_method=S256",
            self.config.client_id, self.config.redirect_uri, state, code_challenge
        )
    }

    fn frontend_redirect(&self) -> &str {
        &self.config.frontend_url
    }

    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
    ) -> Result<ProviderIdentity, ServiceError> {
        let token_res = self
            .http
            .post("https://oauth2.googleapis.com/token")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("code_verifier", code_verifier),
                ("grant_type", "authorization_code"),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to exchange Google code");
                ServiceError::ProviderError("Google token exchange failed".to_string())
            })?;

        if !token_res.status().is_success() {
            let status = token_res.status();
            let body = token_res.text().await.unwrap_or_default();
            tracing::error!(status = %status, body = %body, "Google token exchange error");
            return Err(ServiceError::ProviderError(
                "Google token exchange failed".to_string(),
            ));
        }

        let token_data: GoogleTokenResponse = token_res.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse Google token response");
            ServiceError::ProviderError("Invalid Google token response".to_string())
        })?;

        let user_info: GoogleUserInfo = self
            .http
            .get("https://www.googleapis.com/oauth2/v2/userinfo")
            .bearer_auth(token_data.access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to fetch Google user info");
                ServiceError::ProviderError("Google user info fetch failed".to_string())
            })?
            .json()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to parse Google user info");
                ServiceError::ProviderError("Invalid Google user info".to_string())
            })?;

        if !user_info.verified_email {
            return Err(ServiceError::ProviderError(
                "Google account email not verified".to_string(),
            ));
        }

        Ok(ProviderIdentity {
            subject: user_info.id,
            email: user_info.email,
            name: user_info.name,
            avatar_url: user_info.picture,
        })
    }
}

pub struct GithubProvider {
    http: reqwest::Client,
    config: OAuthProviderConfig,
}

#[derive(Debug, Deserialize)]
struct GithubTokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: i64,
    email: Option<String>,
    name: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

impl GithubProvider {
    pub fn new(config: OAuthProviderConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl IdentityProvider for GithubProvider {
    fn name(&self) -> &'static str {
        "github"
    }

    fn authorize_url(&self, state: &str, _code_challenge: &str) -> String {
        // GitHub's OAuth flow has no PKCE support; state alone binds the
        // callback to the session.
        format!(
            "https://github.com/login/oauth/authorize?client_id={}&redirect_uri={}&scope=read:user%20user:email&state={}",
            self.config.client_id, self.config.redirect_uri, state
        )
    }

    fn frontend_redirect(&self) -> &str {
        &self.config.frontend_url
    }

    async fn exchange_code(
        &self,
        code: &str,
        _code_verifier: &str,
    ) -> Result<ProviderIdentity, ServiceError> {
        let token_res = self
            .http
            .post("https://github.com/login/oauth/access_token")
            .header(reqwest::header::ACCEPT, "application/json")
            .form(&[
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", self.config.redirect_uri.as_str()),
            ])
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to exchange GitHub code");
                ServiceError::ProviderError("GitHub token exchange failed".to_string())
            })?;

        let token_data: GithubTokenResponse = token_res.json().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to parse GitHub token response");
            ServiceError::ProviderError("Invalid GitHub token response".to_string())
        })?;

        let user: GithubUser = self
            .http
            .get("https://api.github.com/user")
            .header(reqwest::header::USER_AGENT, "lms-auth-service")
            .bearer_auth(&token_data.access_token)
            .send()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to fetch GitHub user");
                ServiceError::ProviderError("GitHub user fetch failed".to_string())
            })?
            .json()
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to parse GitHub user");
                ServiceError::ProviderError("Invalid GitHub user".to_string())
            })?;

        let email = match user.email {
            Some(email) => email,
            // Profile email is hidden for most accounts; ask the emails API
            // for the verified primary address.
            None => {
                let emails: Vec<GithubEmail> = self
                    .http
                    .get("https://api.github.com/user/emails")
                    .header(reqwest::header::USER_AGENT, "lms-auth-service")
                    .bearer_auth(&token_data.access_token)
                    .send()
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, "Failed to fetch GitHub emails");
                        ServiceError::ProviderError("GitHub email fetch failed".to_string())
                    })?
                    .json()
                    .await
                    .map_err(|e| {
                        tracing::error!(error = %e, "Failed to parse GitHub emails");
                        ServiceError::ProviderError("Invalid GitHub emails".to_string())
                    })?;

                emails
                    .into_iter()
                    .find(|e| e.primary && e.verified)
                    .map(|e| e.email)
                    .ok_or_else(|| {
                        ServiceError::ProviderError(
                            "GitHub account has no verified primary email".to_string(),
                        )
                    })?
            }
        };

        Ok(ProviderIdentity {
            subject: user.id.to_string(),
            email,
            name: user.name,
            avatar_url: user.avatar_url,
        })
    }
}
