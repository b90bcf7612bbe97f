//! Password authentication handlers: registration, login with the MFA
//! gate, refresh rotation, logout and password reset.

use axum::{
    extract::{Json, State},
    http::StatusCode,
};
use validator::Validate;

use caresync_core::error::AppError;

use crate::dtos::{
    LoginRequest, LoginResponse, LogoutRequest, MessageResponse, PasswordResetConfirmRequest,
    PasswordResetRequest, RefreshRequest, RegisterRequest,
};
use crate::middleware::AuthUser;
use crate::models::AccountResponse;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Account created", body = AccountResponse),
        (status = 409, description = "Email already registered"),
        (status = 422, description = "Validation failed")
    ),
    tag = "Auth"
)]
pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AccountResponse>), AppError> {
    req.validate()?;
    let account = state.auth.register(req).await?;
    Ok((StatusCode::CREATED, Json(account.sanitized())))
}

#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 401, description = "Invalid credentials or MFA code required"),
        (status = 429, description = "Account locked")
    ),
    tag = "Auth"
)]
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    req.validate()?;
    let (account, tokens) = state.auth.login(req).await?;
    Ok(Json(LoginResponse {
        tokens,
        account: account.sanitized(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Pair rotated", body = LoginResponse),
        (status = 401, description = "Unknown, expired or replayed refresh token")
    ),
    tag = "Auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    Json(req): Json<RefreshRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    req.validate()?;
    let (account, tokens) = state.tokens.rotate_refresh(&req.refresh_token).await?;
    Ok(Json(LoginResponse {
        tokens,
        account: account.sanitized(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Session terminated", body = MessageResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "Auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(req): Json<LogoutRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    req.validate()?;
    state.auth.logout(&claims, &req.refresh_token).await?;
    Ok(Json(MessageResponse::new("Logged out")))
}

#[utoipa::path(
    post,
    path = "/auth/password-reset",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Reset email sent if the address is known", body = MessageResponse)
    ),
    tag = "Auth"
)]
pub async fn request_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    req.validate()?;
    state
        .auth
        .request_password_reset(req.tenant_id, &req.email)
        .await?;
    // Same response whether or not the address exists
    Ok(Json(MessageResponse::new(
        "If the address is registered, a reset email has been sent",
    )))
}

#[utoipa::path(
    post,
    path = "/auth/password-reset/confirm",
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 200, description = "Password updated", body = MessageResponse),
        (status = 401, description = "Unknown or expired reset token")
    ),
    tag = "Auth"
)]
pub async fn confirm_password_reset(
    State(state): State<AppState>,
    Json(req): Json<PasswordResetConfirmRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    req.validate()?;
    state
        .auth
        .confirm_password_reset(&req.token, req.new_password)
        .await?;
    Ok(Json(MessageResponse::new("Password updated")))
}
