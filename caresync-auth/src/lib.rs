pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::{
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use caresync_core::error::AppError;
use caresync_core::middleware::{
    rate_limit::{ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{openapi::security::SecurityScheme, Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AuthConfig;
use crate::db::CredentialStore;
use crate::services::{
    AuthService, EphemeralCache, MfaService, QrLoginService, TenantGuard, TokenService,
    WebAuthnService,
};

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::auth::request_password_reset,
        handlers::auth::confirm_password_reset,
        handlers::mfa::start_enrollment,
        handlers::mfa::activate,
        handlers::mfa::disable,
        handlers::webauthn::begin_registration,
        handlers::webauthn::complete_registration,
        handlers::webauthn::begin_login,
        handlers::webauthn::complete_login,
        handlers::qr::create_session,
        handlers::qr::poll_session,
        handlers::accounts::get_me,
        handlers::accounts::get_account,
    ),
    components(
        schemas(
            dtos::RegisterRequest,
            dtos::LoginRequest,
            dtos::LoginResponse,
            dtos::RefreshRequest,
            dtos::LogoutRequest,
            dtos::PasswordResetRequest,
            dtos::PasswordResetConfirmRequest,
            dtos::MessageResponse,
            dtos::MfaCodeRequest,
            dtos::QrSessionRequest,
            dtos::WebAuthnLoginBeginRequest,
            dtos::WebAuthnLoginCompleteRequest,
            models::AccountResponse,
            models::Role,
            models::QrStatus,
            services::TokenPair,
            services::MfaEnrollment,
            services::webauthn::RegistrationChallenge,
            services::webauthn::RegistrationAttestation,
            services::webauthn::AuthenticationChallenge,
            services::webauthn::AuthenticationAssertion,
            services::qr_login::QrSessionResponse,
            services::qr_login::QrPollResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Auth", description = "Password authentication and session lifecycle"),
        (name = "MFA", description = "TOTP second-factor management"),
        (name = "WebAuthn", description = "Hardware credential ceremonies"),
        (name = "QR Login", description = "Cross-device login sessions"),
        (name = "Accounts", description = "Tenant-scoped account access"),
        (name = "Observability", description = "Service health"),
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
                    utoipa::openapi::security::HttpBuilder::new()
                        .scheme(utoipa::openapi::security::HttpAuthScheme::Bearer)
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
    pub store: Arc<dyn CredentialStore>,
    pub cache: Arc<dyn EphemeralCache>,
    pub tokens: TokenService,
    pub auth: AuthService,
    pub mfa: MfaService,
    pub webauthn: WebAuthnService,
    pub qr: QrLoginService,
    pub guard: TenantGuard,
    pub login_rate_limiter: IpRateLimiter,
    pub password_reset_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Load the account behind a set of verified claims.
    pub async fn current_account(
        &self,
        claims: &services::AccessTokenClaims,
    ) -> Result<models::Account, AppError> {
        let account_id: uuid::Uuid = claims
            .sub
            .parse()
            .map_err(|_| AppError::AuthError(anyhow::anyhow!("Malformed subject claim")))?;
        let account = self
            .store
            .find_account_by_id(account_id)
            .await
            .map_err(AppError::DatabaseError)?
            .ok_or(services::ServiceError::AccountNotFound)?;
        if !account.active {
            return Err(services::ServiceError::AccountInactive.into());
        }
        Ok(account)
    }
}

pub fn build_router(state: AppState) -> Router {
    // Login-shaped routes share the stricter per-IP limiter
    let login_limiter = state.login_rate_limiter.clone();
    let login_routes = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/register", post(handlers::auth::register))
        .route("/webauthn/login/begin", post(handlers::webauthn::begin_login))
        .route(
            "/webauthn/login/complete",
            post(handlers::webauthn::complete_login),
        )
        .layer(from_fn_with_state(login_limiter, ip_rate_limit_middleware));

    let reset_limiter = state.password_reset_rate_limiter.clone();
    let reset_routes = Router::new()
        .route(
            "/auth/password-reset",
            post(handlers::auth::request_password_reset),
        )
        .layer(from_fn_with_state(reset_limiter, ip_rate_limit_middleware));

    // Routes behind a verified bearer token
    let protected_routes = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/mfa/enroll", post(handlers::mfa::start_enrollment))
        .route("/mfa/activate", post(handlers::mfa::activate))
        .route("/mfa/disable", post(handlers::mfa::disable))
        .route(
            "/webauthn/register/begin",
            post(handlers::webauthn::begin_registration),
        )
        .route(
            "/webauthn/register/complete",
            post(handlers::webauthn::complete_registration),
        )
        .route("/accounts/me", get(handlers::accounts::get_me))
        .route(
            "/tenants/:tenant_id/accounts/:account_id",
            get(handlers::accounts::get_account),
        )
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let mut app = Router::new().route("/health", get(health_check));

    let swagger_enabled = match state.config.environment {
        config::Environment::Dev => true,
        config::Environment::Prod => state.config.swagger.enabled == config::SwaggerMode::Public,
    };
    if swagger_enabled {
        app = app
            .merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    }

    app.route("/auth/refresh", post(handlers::auth::refresh))
        .route(
            "/auth/password-reset/confirm",
            post(handlers::auth::confirm_password_reset),
        )
        .route("/qr/sessions", post(handlers::qr::create_session))
        .route("/qr/sessions/:session_id", get(handlers::qr::poll_session))
        .merge(login_routes)
        .merge(reset_routes)
        .merge(protected_routes)
        .with_state(state.clone())
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get("x-request-id")
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                )
            },
        ))
        .layer(from_fn(security_headers_middleware))
        .layer(
            CorsLayer::new()
                .allow_origin(
                    state
                        .config
                        .security
                        .allowed_origins
                        .iter()
                        .filter_map(|o| {
                            o.parse::<axum::http::HeaderValue>()
                                .map_err(|e| {
                                    tracing::error!("Invalid CORS origin '{}': {}", o, e);
                                    e
                                })
                                .ok()
                        })
                        .collect::<Vec<axum::http::HeaderValue>>(),
                )
                .allow_methods([
                    axum::http::Method::GET,
                    axum::http::Method::POST,
                    axum::http::Method::DELETE,
                    axum::http::Method::OPTIONS,
                ])
                .allow_headers([
                    axum::http::header::AUTHORIZATION,
                    axum::http::header::CONTENT_TYPE,
                ]),
        )
}

/// Service health check: storage and cache must both answer.
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "A dependency is unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Store health check failed");
        AppError::DatabaseError(e)
    })?;
    state.cache.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Cache health check failed");
        AppError::CacheError(e)
    })?;

    Ok(axum::Json(serde_json::json!({
        "status": "healthy",
        "service": state.config.service_name,
        "version": state.config.service_version,
    })))
}
