use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::services::webauthn::AuthenticationAssertion;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct WebAuthnLoginBeginRequest {
    pub tenant_id: Uuid,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct WebAuthnLoginCompleteRequest {
    pub tenant_id: Uuid,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    pub assertion: AuthenticationAssertion,
}
