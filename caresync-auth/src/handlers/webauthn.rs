//! WebAuthn ceremony handlers.
//!
//! Credential registration happens inside an authenticated session; the
//! assertion flow is itself a login method, keyed by tenant and email like
//! the password route, and deliberately answers unknown accounts the same
//! way as wrong signatures.

use axum::extract::{Json, State};
use validator::Validate;

use caresync_core::error::AppError;

use crate::dtos::{LoginResponse, MessageResponse, WebAuthnLoginBeginRequest, WebAuthnLoginCompleteRequest};
use crate::middleware::AuthUser;
use crate::models::Account;
use crate::services::webauthn::{
    AuthenticationChallenge, RegistrationAttestation, RegistrationChallenge,
};
use crate::services::ServiceError;
use crate::AppState;

#[utoipa::path(
    post,
    path = "/webauthn/register/begin",
    responses(
        (status = 200, description = "Registration challenge issued", body = RegistrationChallenge)
    ),
    security(("bearer_auth" = [])),
    tag = "WebAuthn"
)]
pub async fn begin_registration(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<RegistrationChallenge>, AppError> {
    let account = state.current_account(&claims).await?;
    let challenge = state.webauthn.begin_registration(&account).await?;
    Ok(Json(challenge))
}

#[utoipa::path(
    post,
    path = "/webauthn/register/complete",
    request_body = RegistrationAttestation,
    responses(
        (status = 200, description = "Credential stored", body = MessageResponse),
        (status = 400, description = "Challenge expired or attestation malformed")
    ),
    security(("bearer_auth" = [])),
    tag = "WebAuthn"
)]
pub async fn complete_registration(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Json(attestation): Json<RegistrationAttestation>,
) -> Result<Json<MessageResponse>, AppError> {
    let account = state.current_account(&claims).await?;
    state
        .webauthn
        .complete_registration(&account, attestation)
        .await?;
    Ok(Json(MessageResponse::new("Credential registered")))
}

#[utoipa::path(
    post,
    path = "/webauthn/login/begin",
    request_body = WebAuthnLoginBeginRequest,
    responses(
        (status = 200, description = "Assertion challenge issued", body = AuthenticationChallenge),
        (status = 401, description = "No usable credential")
    ),
    tag = "WebAuthn"
)]
pub async fn begin_login(
    State(state): State<AppState>,
    Json(req): Json<WebAuthnLoginBeginRequest>,
) -> Result<Json<AuthenticationChallenge>, AppError> {
    req.validate()?;
    let account = lookup_login_account(&state, req.tenant_id, &req.email).await?;
    let challenge = match state.webauthn.begin_authentication(&account).await {
        Ok(challenge) => challenge,
        // No enumeration through the credential list
        Err(ServiceError::CredentialNotFound) => return Err(ServiceError::InvalidCredentials.into()),
        Err(e) => return Err(e.into()),
    };
    Ok(Json(challenge))
}

#[utoipa::path(
    post,
    path = "/webauthn/login/complete",
    request_body = WebAuthnLoginCompleteRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 401, description = "Assertion rejected")
    ),
    tag = "WebAuthn"
)]
pub async fn complete_login(
    State(state): State<AppState>,
    Json(req): Json<WebAuthnLoginCompleteRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    req.validate()?;
    let account = lookup_login_account(&state, req.tenant_id, &req.email).await?;
    state
        .webauthn
        .complete_authentication(&account, req.assertion)
        .await?;
    let tokens = state.tokens.issue_pair(&account).await?;
    Ok(Json(LoginResponse {
        tokens,
        account: account.sanitized(),
    }))
}

async fn lookup_login_account(
    state: &AppState,
    tenant_id: uuid::Uuid,
    email: &str,
) -> Result<Account, AppError> {
    let account = state
        .store
        .find_account_by_email(tenant_id, email)
        .await
        .map_err(AppError::DatabaseError)?
        .ok_or(ServiceError::InvalidCredentials)?;
    if !account.active {
        return Err(ServiceError::AccountInactive.into());
    }
    Ok(account)
}
