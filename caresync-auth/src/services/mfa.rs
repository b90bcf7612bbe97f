//! TOTP multi-factor manager.
//!
//! Enrollment is two-phase: a generated secret sits in a pending state until
//! the holder proves possession with a valid code, and only then does the
//! login gate start demanding a second factor. Codes are compared in
//! constant time across the current step and the configured clock skew
//! either side.

use std::sync::Arc;

use chrono::Utc;
use rand::RngCore;
use serde::Serialize;
use subtle::ConstantTimeEq;
use totp_rs::{Algorithm, Secret, TOTP};
use utoipa::ToSchema;

use super::audit::AuditService;
use super::error::ServiceError;
use crate::config::TotpConfig;
use crate::db::CredentialStore;
use crate::models::{Account, AuditAction, AuditEvent, Severity};

const SECRET_BYTES: usize = 20;

/// Material returned once at enrollment start. The secret is never shown
/// again.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct MfaEnrollment {
    pub secret: String,
    pub otpauth_url: String,
}

#[derive(Clone)]
pub struct MfaService {
    issuer: String,
    digits: usize,
    step_seconds: u64,
    skew_steps: u8,
    store: Arc<dyn CredentialStore>,
    audit: AuditService,
}

impl MfaService {
    pub fn new(config: &TotpConfig, store: Arc<dyn CredentialStore>, audit: AuditService) -> Self {
        Self {
            issuer: config.issuer.clone(),
            digits: config.digits,
            step_seconds: config.step_seconds,
            skew_steps: config.skew_steps,
            store,
            audit,
        }
    }

    /// Generate a fresh secret and park it pending confirmation. Restarting
    /// enrollment replaces any earlier pending secret.
    pub async fn start_enrollment(&self, account: &Account) -> Result<MfaEnrollment, ServiceError> {
        if account.mfa_enabled {
            return Err(ServiceError::Validation(
                "Multi-factor authentication is already enabled".to_string(),
            ));
        }

        let mut bytes = [0u8; SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let secret = Secret::Raw(bytes.to_vec()).to_encoded().to_string();

        let totp = self.build_totp(&secret, &account.email)?;
        let otpauth_url = totp.get_url();

        self.store
            .set_mfa(account.id, Some(secret.clone()), false)
            .await
            .map_err(ServiceError::Database)?;

        self.audit.record_async(AuditEvent::new(
            Some(account.id),
            Some(account.tenant_id),
            AuditAction::MfaEnrollmentStarted,
            "mfa",
            Severity::Info,
            "TOTP enrollment started",
        ));

        Ok(MfaEnrollment {
            secret,
            otpauth_url,
        })
    }

    /// Confirm a pending enrollment with a valid code; from here on, login
    /// requires the second factor.
    pub async fn activate(&self, account: &Account, code: &str) -> Result<(), ServiceError> {
        if account.mfa_enabled {
            return Err(ServiceError::Validation(
                "Multi-factor authentication is already enabled".to_string(),
            ));
        }
        let secret = account
            .mfa_secret
            .as_deref()
            .ok_or_else(|| ServiceError::Validation("No enrollment in progress".to_string()))?;

        self.verify_code_at(secret, &account.email, code, Utc::now().timestamp() as u64)?;

        self.store
            .set_mfa(account.id, Some(secret.to_string()), true)
            .await
            .map_err(ServiceError::Database)?;

        self.audit.record_async(AuditEvent::new(
            Some(account.id),
            Some(account.tenant_id),
            AuditAction::MfaEnabled,
            "mfa",
            Severity::Info,
            "TOTP enabled",
        ));

        Ok(())
    }

    /// Disable the second factor. Requires a currently valid code, so a
    /// stolen session alone cannot weaken the account.
    pub async fn disable(&self, account: &Account, code: &str) -> Result<(), ServiceError> {
        if !account.mfa_enabled {
            return Err(ServiceError::Validation(
                "Multi-factor authentication is not enabled".to_string(),
            ));
        }
        let secret = account
            .mfa_secret
            .as_deref()
            .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("Enabled account has no secret")))?;

        self.verify_code_at(secret, &account.email, code, Utc::now().timestamp() as u64)?;

        self.store
            .set_mfa(account.id, None, false)
            .await
            .map_err(ServiceError::Database)?;

        self.audit.record_async(AuditEvent::new(
            Some(account.id),
            Some(account.tenant_id),
            AuditAction::MfaDisabled,
            "mfa",
            Severity::Warning,
            "TOTP disabled",
        ));

        Ok(())
    }

    /// The login gate. Only consulted for accounts with MFA enabled.
    pub fn verify_login_code(
        &self,
        account: &Account,
        code: Option<&str>,
        unix_time: u64,
    ) -> Result<(), ServiceError> {
        let secret = account
            .mfa_secret
            .as_deref()
            .ok_or_else(|| ServiceError::Internal(anyhow::anyhow!("Enabled account has no secret")))?;

        let code = code.ok_or(ServiceError::MfaRequired)?;
        self.verify_code_at(secret, &account.email, code, unix_time)
    }

    /// Constant-time code check across the current step and the configured
    /// skew either side.
    pub fn verify_code_at(
        &self,
        secret: &str,
        account_name: &str,
        code: &str,
        unix_time: u64,
    ) -> Result<(), ServiceError> {
        let totp = self.build_totp(secret, account_name)?;

        let step = self.step_seconds;
        let skew = self.skew_steps as i64;
        let mut matched = false;
        for offset in -skew..=skew {
            let t = unix_time.saturating_add_signed(offset * step as i64);
            let expected = totp.generate(t);
            if expected.len() == code.len()
                && bool::from(expected.as_bytes().ct_eq(code.as_bytes()))
            {
                matched = true;
            }
        }

        if matched {
            Ok(())
        } else {
            Err(ServiceError::MfaInvalid)
        }
    }

    fn build_totp(&self, secret: &str, account_name: &str) -> Result<TOTP, ServiceError> {
        let secret_bytes = Secret::Encoded(secret.to_string())
            .to_bytes()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Invalid TOTP secret: {:?}", e)))?;

        TOTP::new(
            Algorithm::SHA1,
            self.digits,
            self.skew_steps,
            self.step_seconds,
            secret_bytes,
            Some(self.issuer.clone()),
            account_name.to_string(),
        )
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to build TOTP: {}", e)))
    }
}
