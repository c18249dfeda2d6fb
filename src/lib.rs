pub mod config;
pub mod db;
pub mod dtos;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AuthConfig;
use crate::error::AppError;
use crate::services::{
    AccountStore, AuthService, Database, IdentityProvider, TokenService, TokenStore,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::auth::session::health_check,
        handlers::auth::registration::register,
        handlers::auth::session::login,
        handlers::auth::session::refresh,
        handlers::auth::session::logout,
        handlers::auth::session::logout_all,
        handlers::auth::social::oauth_start,
        handlers::auth::social::oauth_callback,
        handlers::user::get_me,
    ),
    components(
        schemas(
            dtos::RegisterRequest,
            dtos::RegisterResponse,
            dtos::LoginRequest,
            dtos::RefreshRequest,
            dtos::LogoutRequest,
            dtos::MessageResponse,
            services::TokenResponse,
            models::UserResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "auth", description = "Session lifecycle and social login"),
        (name = "users", description = "Account profile"),
        (name = "health", description = "Service health"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: AuthConfig,
    pub db: Database,
    pub accounts: Arc<dyn AccountStore>,
    pub tokens: Arc<dyn TokenStore>,
    pub issuer: TokenService,
    pub auth_service: AuthService,
    pub identity_providers: Arc<HashMap<&'static str, Arc<dyn IdentityProvider>>>,
}

pub fn build_router(state: AppState) -> Result<Router, AppError> {
    let cors = CorsLayer::new()
        .allow_origin(
            state
                .config
                .security
                .allowed_origins
                .iter()
                .map(|origin| {
                    origin.parse::<HeaderValue>().map_err(|e| {
                        AppError::ConfigError(anyhow::anyhow!(
                            "Invalid CORS origin '{}': {}",
                            origin,
                            e
                        ))
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
        )
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true);

    let protected = Router::new()
        .route("/auth/logout-all", post(handlers::auth::logout_all))
        .route("/users/me", get(handlers::user::get_me))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let app = Router::new()
        .route("/health", get(handlers::auth::health_check))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route("/auth/logout", post(handlers::auth::logout))
        // Static routes above take precedence over the provider parameter.
        .route("/auth/:provider", get(handlers::auth::oauth_start))
        .route(
            "/auth/:provider/callback",
            get(handlers::auth::oauth_callback),
        )
        .merge(protected)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    Ok(app)
}
