use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lms_auth::{
    build_router,
    config::AuthConfig,
    db,
    error::AppError,
    services::{
        sweeper, AccountStore, AuthService, Database, GithubProvider, GoogleProvider,
        IdentityProvider, TokenService, TokenStore,
    },
    AppState,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // Fail fast on invalid configuration.
    let config = AuthConfig::from_env()?;

    init_tracing(&config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting auth service"
    );

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;
    tracing::info!("Database initialized");

    let database = Database::new(pool);
    let accounts: Arc<dyn AccountStore> = Arc::new(database.clone());
    let tokens: Arc<dyn TokenStore> = Arc::new(database.clone());

    let issuer = TokenService::new(&config.jwt);
    let auth_service = AuthService::new(
        accounts.clone(),
        tokens.clone(),
        issuer.clone(),
        config.jwt.refresh_token_expiry_days,
    );

    let mut providers: HashMap<&'static str, Arc<dyn IdentityProvider>> = HashMap::new();
    let google: Arc<dyn IdentityProvider> = Arc::new(GoogleProvider::new(config.google.clone()));
    let github: Arc<dyn IdentityProvider> = Arc::new(GithubProvider::new(config.github.clone()));
    providers.insert(google.name(), google);
    providers.insert(github.name(), github);

    let sweeper_handle = sweeper::spawn(tokens.clone(), config.sweep_interval_seconds);

    let state = AppState {
        config: config.clone(),
        db: database,
        accounts,
        tokens,
        issuer,
        auth_service,
        identity_providers: Arc::new(providers),
    };

    let app = build_router(state)?;

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    sweeper_handle.abort();
    tracing::info!("Service shutdown complete");
    Ok(())
}

fn init_tracing(log_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
