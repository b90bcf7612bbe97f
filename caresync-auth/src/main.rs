use std::net::SocketAddr;
use std::sync::Arc;

use caresync_auth::{
    build_router,
    config::AuthConfig,
    db::MongoStore,
    services::{
        AuditService, AuthService, HttpIdentityProvider, LockoutService, LoggingEmailService,
        MfaService, MongoAuditSink, QrLoginService, RedisCache, TenantGuard, TokenService,
        WebAuthnService,
    },
    AppState,
};
use caresync_core::middleware::rate_limit::create_ip_rate_limiter;
use caresync_core::observability::logging::init_tracing;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), caresync_core::error::AppError> {
    // Fail fast on invalid configuration
    let config = AuthConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting authentication service"
    );

    let mongo = MongoStore::connect(&config.mongodb.uri, &config.mongodb.database).await?;
    mongo.initialize_indexes().await?;
    tracing::info!("Credential store initialized");

    let cache = Arc::new(RedisCache::new(&config.redis).await?);
    tracing::info!("Ephemeral cache initialized");

    let store: Arc<dyn caresync_auth::db::CredentialStore> = Arc::new(mongo.clone());
    let audit = AuditService::new(Arc::new(MongoAuditSink::new(mongo.database())));
    let cache: Arc<dyn caresync_auth::services::EphemeralCache> = cache;

    let tokens = TokenService::new(&config.jwt, store.clone(), cache.clone(), audit.clone());
    let lockout = LockoutService::new(&config.security, store.clone(), audit.clone());
    let mfa = MfaService::new(&config.totp, store.clone(), audit.clone());
    let webauthn = WebAuthnService::new(
        &config.webauthn,
        store.clone(),
        cache.clone(),
        audit.clone(),
    );
    let provider = Arc::new(HttpIdentityProvider::new(&config.qr)?);
    let qr = QrLoginService::new(
        &config.qr,
        provider,
        store.clone(),
        cache.clone(),
        tokens.clone(),
        audit.clone(),
    );
    let email = Arc::new(LoggingEmailService);
    let auth = AuthService::new(
        store.clone(),
        cache.clone(),
        tokens.clone(),
        lockout,
        mfa.clone(),
        email,
        audit.clone(),
    );
    let guard = TenantGuard::new(audit);

    let login_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.login_attempts,
        config.rate_limit.login_window_seconds,
    );
    let password_reset_rate_limiter = create_ip_rate_limiter(
        config.rate_limit.password_reset_attempts,
        config.rate_limit.password_reset_window_seconds,
    );

    let state = AppState {
        config: config.clone(),
        store,
        cache,
        tokens,
        auth,
        mfa,
        webauthn,
        qr,
        guard,
        login_rate_limiter,
        password_reset_rate_limiter,
    };

    let app = build_router(state);

    let addr = SocketAddr::from((config.common.bind, config.common.port));
    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "Failed to install signal handler"),
        }
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
