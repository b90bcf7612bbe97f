//! Password login orchestration: registration, the multi-factor login gate,
//! logout and password reset.
//!
//! Login proceeds strictly in order: account lookup, active check, lockout
//! gate, password verification, MFA gate, then token issue. Failures after
//! the lockout gate count toward the lockout threshold; a missing MFA code
//! on an enrolled account does not, since it is a protocol step rather than
//! a guess.

use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;
use uuid::Uuid;

use super::audit::AuditService;
use super::cache::EphemeralCache;
use super::email::EmailProvider;
use super::error::ServiceError;
use super::lockout::LockoutService;
use super::mfa::MfaService;
use super::token::{AccessTokenClaims, TokenPair, TokenService};
use crate::db::CredentialStore;
use crate::dtos::{LoginRequest, RegisterRequest};
use crate::models::{Account, AuditAction, AuditEvent, Role, Severity};
use crate::utils::password::{hash_password, verify_password, Password};

const RESET_TOKEN_TTL_SECONDS: i64 = 3600;

#[derive(Clone)]
pub struct AuthService {
    store: Arc<dyn CredentialStore>,
    cache: Arc<dyn EphemeralCache>,
    tokens: TokenService,
    lockout: LockoutService,
    mfa: MfaService,
    email: Arc<dyn EmailProvider>,
    audit: AuditService,
}

impl AuthService {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        cache: Arc<dyn EphemeralCache>,
        tokens: TokenService,
        lockout: LockoutService,
        mfa: MfaService,
        email: Arc<dyn EmailProvider>,
        audit: AuditService,
    ) -> Self {
        Self {
            store,
            cache,
            tokens,
            lockout,
            mfa,
            email,
            audit,
        }
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<Account, ServiceError> {
        let existing = self
            .store
            .find_account_by_email(request.tenant_id, &request.email)
            .await
            .map_err(ServiceError::Database)?;
        if existing.is_some() {
            return Err(ServiceError::EmailAlreadyRegistered);
        }

        let password_hash = hash_password(&Password::new(request.password))
            .map_err(ServiceError::Internal)?;

        let account = Account::new(
            request.tenant_id,
            request.email,
            password_hash,
            request.display_name,
            request.role.unwrap_or(Role::Staff),
            request.permissions,
        );
        self.store
            .insert_account(&account)
            .await
            .map_err(ServiceError::Database)?;

        self.audit.record_async(AuditEvent::new(
            Some(account.id),
            Some(account.tenant_id),
            AuditAction::AccountRegistered,
            "account",
            Severity::Info,
            format!("Account registered with role {}", account.role.as_str()),
        ));

        Ok(account)
    }

    pub async fn login(
        &self,
        request: LoginRequest,
    ) -> Result<(Account, TokenPair), ServiceError> {
        let account = self
            .store
            .find_account_by_email(request.tenant_id, &request.email)
            .await
            .map_err(ServiceError::Database)?
            .ok_or(ServiceError::InvalidCredentials)?;

        if !account.active {
            return Err(ServiceError::AccountInactive);
        }

        self.lockout.check(&account).await?;

        let password = Password::new(request.password);
        if verify_password(&password, &account.password_hash).is_err() {
            self.fail_attempt(&account, "Password rejected").await?;
            return Err(ServiceError::InvalidCredentials);
        }

        if account.mfa_enabled {
            let now = Utc::now().timestamp() as u64;
            match self
                .mfa
                .verify_login_code(&account, request.totp_code.as_deref(), now)
            {
                Ok(()) => {}
                Err(ServiceError::MfaRequired) => return Err(ServiceError::MfaRequired),
                Err(ServiceError::MfaInvalid) => {
                    self.audit.record_async(AuditEvent::new(
                        Some(account.id),
                        Some(account.tenant_id),
                        AuditAction::MfaRejected,
                        "mfa",
                        Severity::Warning,
                        "TOTP code rejected at login",
                    ));
                    self.fail_attempt(&account, "TOTP code rejected").await?;
                    return Err(ServiceError::InvalidCredentials);
                }
                Err(e) => return Err(e),
            }
        }

        self.lockout.record_success(&account).await?;
        let pair = self.tokens.issue_pair(&account).await?;

        self.audit.record_async(AuditEvent::new(
            Some(account.id),
            Some(account.tenant_id),
            AuditAction::LoginSucceeded,
            "session",
            Severity::Info,
            "Password login succeeded",
        ));

        Ok((account, pair))
    }

    async fn fail_attempt(&self, account: &Account, detail: &str) -> Result<(), ServiceError> {
        self.audit.record_async(AuditEvent::new(
            Some(account.id),
            Some(account.tenant_id),
            AuditAction::LoginFailed,
            "session",
            Severity::Warning,
            detail.to_string(),
        ));
        self.lockout.record_failure(account).await?;
        Ok(())
    }

    /// Idempotent logout: revoke the access token for its remaining
    /// lifetime and drop the presented refresh token.
    pub async fn logout(
        &self,
        claims: &AccessTokenClaims,
        refresh_token: &str,
    ) -> Result<(), ServiceError> {
        let account_id: Uuid = claims
            .sub
            .parse()
            .map_err(|_| ServiceError::Internal(anyhow::anyhow!("Malformed subject claim")))?;

        self.tokens.revoke_access(claims).await?;
        self.tokens.revoke_refresh(account_id, refresh_token).await?;

        self.audit.record_async(AuditEvent::new(
            Some(account_id),
            claims.tenant_id.parse().ok(),
            AuditAction::Logout,
            "session",
            Severity::Info,
            "Session terminated",
        ));

        Ok(())
    }

    /// Open a password reset. The response to the caller is identical
    /// whether or not the address is known; only existing active accounts
    /// get a token.
    pub async fn request_password_reset(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<(), ServiceError> {
        let account = self
            .store
            .find_account_by_email(tenant_id, email)
            .await
            .map_err(ServiceError::Database)?;

        let Some(account) = account else {
            return Ok(());
        };
        if !account.active {
            return Ok(());
        }

        let mut bytes = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut bytes);
        let reset_token = hex::encode(bytes);

        self.cache
            .set(
                &reset_key(&reset_token),
                &account.id.to_string(),
                RESET_TOKEN_TTL_SECONDS,
            )
            .await
            .map_err(ServiceError::Cache)?;

        if let Err(e) = self.email.send_password_reset(&account.email, &reset_token).await {
            tracing::error!(error = %e, "Failed to send password reset email");
        }

        self.audit.record_async(AuditEvent::new(
            Some(account.id),
            Some(account.tenant_id),
            AuditAction::PasswordResetRequested,
            "account",
            Severity::Info,
            "Password reset requested",
        ));

        Ok(())
    }

    /// Consume a reset token and install the new password. Every live
    /// session and refresh token is invalidated.
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: String,
    ) -> Result<(), ServiceError> {
        let account_id = self
            .cache
            .get_and_delete(&reset_key(token))
            .await
            .map_err(ServiceError::Cache)?
            .ok_or(ServiceError::TokenInvalid)?;
        let account_id: Uuid = account_id
            .parse()
            .map_err(|_| ServiceError::Internal(anyhow::anyhow!("Malformed reset record")))?;

        let account = self
            .store
            .find_account_by_id(account_id)
            .await
            .map_err(ServiceError::Database)?
            .ok_or(ServiceError::AccountNotFound)?;

        let password_hash = hash_password(&Password::new(new_password))
            .map_err(ServiceError::Internal)?;

        self.store
            .set_password_hash(account.id, &password_hash)
            .await
            .map_err(ServiceError::Database)?;
        self.store
            .clear_all_refresh_tokens(account.id)
            .await
            .map_err(ServiceError::Database)?;
        self.store
            .reset_lockout(account.id)
            .await
            .map_err(ServiceError::Database)?;

        self.audit.record_async(AuditEvent::new(
            Some(account.id),
            Some(account.tenant_id),
            AuditAction::PasswordResetCompleted,
            "account",
            Severity::Warning,
            "Password reset completed; all refresh tokens cleared",
        ));

        Ok(())
    }
}

fn reset_key(token: &str) -> String {
    format!("pwreset:{}", token)
}
