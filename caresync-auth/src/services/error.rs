use caresync_core::error::AppError;
use thiserror::Error;

/// Failure taxonomy for the authentication services.
///
/// Password, MFA and lockout failures deliberately collapse into
/// `InvalidCredentials` at the HTTP boundary so that responses do not reveal
/// which factor failed; the audit trail records the precise reason.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(anyhow::Error),

    #[error("Cache error: {0}")]
    Cache(anyhow::Error),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Account locked")]
    AccountLocked { retry_after_seconds: u64 },

    #[error("Account inactive")]
    AccountInactive,

    #[error("Email already registered")]
    EmailAlreadyRegistered,

    #[error("Account not found")]
    AccountNotFound,

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    TokenInvalid,

    #[error("Token revoked")]
    TokenRevoked,

    #[error("Multi-factor code required")]
    MfaRequired,

    #[error("Invalid multi-factor code")]
    MfaInvalid,

    #[error("Challenge expired or unknown")]
    ChallengeExpired,

    #[error("Credential not found")]
    CredentialNotFound,

    #[error("Authenticator counter regression")]
    CounterRegression,

    #[error("Session not found")]
    SessionNotFound,

    #[error("Tenant mismatch")]
    TenantMismatch,

    #[error("Forbidden")]
    Forbidden,

    #[error("Upstream identity provider error: {0}")]
    ProviderUnavailable(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(e),
            ServiceError::Cache(e) => AppError::CacheError(e),
            ServiceError::Internal(e) => AppError::InternalError(e),
            ServiceError::InvalidCredentials => {
                AppError::AuthError(anyhow::anyhow!("Invalid credentials"))
            }
            ServiceError::AccountLocked {
                retry_after_seconds,
            } => AppError::TooManyRequests(
                "Account temporarily locked".to_string(),
                Some(retry_after_seconds),
            ),
            ServiceError::AccountInactive => {
                AppError::Forbidden(anyhow::anyhow!("Account is inactive"))
            }
            ServiceError::EmailAlreadyRegistered => {
                AppError::Conflict(anyhow::anyhow!("Email already registered"))
            }
            ServiceError::AccountNotFound => {
                AppError::NotFound(anyhow::anyhow!("Account not found"))
            }
            ServiceError::TokenExpired => AppError::AuthError(anyhow::anyhow!("Token expired")),
            ServiceError::TokenInvalid => AppError::AuthError(anyhow::anyhow!("Invalid token")),
            ServiceError::TokenRevoked => AppError::AuthError(anyhow::anyhow!("Token revoked")),
            ServiceError::MfaRequired => {
                AppError::AuthError(anyhow::anyhow!("Multi-factor code required"))
            }
            ServiceError::MfaInvalid => {
                AppError::AuthError(anyhow::anyhow!("Invalid multi-factor code"))
            }
            ServiceError::ChallengeExpired => {
                AppError::BadRequest(anyhow::anyhow!("Challenge expired or unknown"))
            }
            ServiceError::CredentialNotFound => {
                AppError::NotFound(anyhow::anyhow!("Credential not found"))
            }
            ServiceError::CounterRegression => {
                AppError::AuthError(anyhow::anyhow!("Credential rejected"))
            }
            ServiceError::SessionNotFound => {
                AppError::NotFound(anyhow::anyhow!("Session not found"))
            }
            ServiceError::TenantMismatch => {
                AppError::Forbidden(anyhow::anyhow!("Access to this tenant is denied"))
            }
            ServiceError::Forbidden => {
                AppError::Forbidden(anyhow::anyhow!("Insufficient permissions"))
            }
            ServiceError::ProviderUnavailable(msg) => AppError::BadGateway(msg),
            ServiceError::Validation(e) => AppError::BadRequest(anyhow::anyhow!(e)),
        }
    }
}
