//! TOTP enrollment lifecycle handlers. All routes require a valid session.

use axum::extract::{Json, State};
use validator::Validate;

use caresync_core::error::AppError;

use crate::dtos::{MessageResponse, MfaCodeRequest};
use crate::middleware::AuthUser;
use crate::services::MfaEnrollment;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/mfa/enroll",
    responses(
        (status = 200, description = "Enrollment started, secret returned once", body = MfaEnrollment),
        (status = 400, description = "Already enabled")
    ),
    security(("bearer_auth" = [])),
    tag = "MFA"
)]
pub async fn start_enrollment(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<MfaEnrollment>, AppError> {
    let account = state.current_account(&claims).await?;
    let enrollment = state.mfa.start_enrollment(&account).await?;
    Ok(Json(enrollment))
}

#[utoipa::path(
    post,
    path = "/mfa/activate",
    request_body = MfaCodeRequest,
    responses(
        (status = 200, description = "Second factor enabled", body = MessageResponse),
        (status = 401, description = "Code rejected")
    ),
    security(("bearer_auth" = [])),
    tag = "MFA"
)]
pub async fn activate(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(req): Json<MfaCodeRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    req.validate()?;
    let account = state.current_account(&claims).await?;
    state.mfa.activate(&account, &req.code).await?;
    Ok(Json(MessageResponse::new("Multi-factor authentication enabled")))
}

#[utoipa::path(
    post,
    path = "/mfa/disable",
    request_body = MfaCodeRequest,
    responses(
        (status = 200, description = "Second factor disabled", body = MessageResponse),
        (status = 401, description = "Code rejected")
    ),
    security(("bearer_auth" = [])),
    tag = "MFA"
)]
pub async fn disable(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(req): Json<MfaCodeRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    req.validate()?;
    let account = state.current_account(&claims).await?;
    state.mfa.disable(&account, &req.code).await?;
    Ok(Json(MessageResponse::new("Multi-factor authentication disabled")))
}
