use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct MfaCodeRequest {
    #[validate(length(equal = 6, message = "Code must be six digits"))]
    pub code: String,
}
