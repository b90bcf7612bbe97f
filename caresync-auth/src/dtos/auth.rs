use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::Role;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    pub tenant_id: Uuid,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 12, message = "Password must be at least 12 characters"))]
    pub password: String,
    #[validate(length(max = 120, message = "Display name too long"))]
    pub display_name: Option<String>,
    pub role: Option<Role>,
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    pub tenant_id: Uuid,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
    /// Six-digit TOTP code, required once the account has MFA enabled.
    pub totp_code: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LogoutRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetRequest {
    pub tenant_id: Uuid,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct PasswordResetConfirmRequest {
    #[validate(length(min = 1, message = "Reset token is required"))]
    pub token: String,
    #[validate(length(min = 12, message = "Password must be at least 12 characters"))]
    pub new_password: String,
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, serde::Serialize, ToSchema)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: crate::services::token::TokenPair,
    pub account: crate::models::AccountResponse,
}
