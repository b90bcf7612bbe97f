//! Account read handlers, all behind the tenant and permission guard.

use axum::extract::{Json, Path, State};
use uuid::Uuid;

use caresync_core::error::AppError;

use crate::middleware::AuthUser;
use crate::models::AccountResponse;
use crate::services::ServiceError;
use crate::AppState;

#[utoipa::path(
    get,
    path = "/accounts/me",
    responses(
        (status = 200, description = "Current account", body = AccountResponse),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn get_me(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<Json<AccountResponse>, AppError> {
    let account = state.current_account(&claims).await?;
    Ok(Json(account.sanitized()))
}

#[utoipa::path(
    get,
    path = "/tenants/{tenant_id}/accounts/{account_id}",
    params(
        ("tenant_id" = Uuid, Path, description = "Tenant scope"),
        ("account_id" = Uuid, Path, description = "Account to read")
    ),
    responses(
        (status = 200, description = "Account in the requested tenant", body = AccountResponse),
        (status = 403, description = "Cross-tenant access or missing permission"),
        (status = 404, description = "No such account in this tenant")
    ),
    security(("bearer_auth" = [])),
    tag = "Accounts"
)]
pub async fn get_account(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    Path((tenant_id, account_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<AccountResponse>, AppError> {
    state.guard.scope_to_tenant(&claims, tenant_id).await?;
    state
        .guard
        .require_permission(&claims, "accounts:read")
        .await?;

    let account = state
        .store
        .find_account_by_id(account_id)
        .await
        .map_err(AppError::DatabaseError)?
        .filter(|a| a.tenant_id == tenant_id)
        .ok_or(ServiceError::AccountNotFound)?;

    Ok(Json(account.sanitized()))
}
