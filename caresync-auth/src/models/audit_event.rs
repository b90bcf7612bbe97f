//! Audit event model - append-only security trail.
//!
//! Every security-relevant transition (login, lockout, MFA toggle, token
//! refresh, tenant-access violation) emits one of these. Events are
//! write-once and never mutated.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Audited actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    AccountRegistered,
    AccountProvisioned,
    LoginSucceeded,
    LoginFailed,
    AccountLockedOut,
    Logout,
    TokenIssued,
    TokenRefreshed,
    TokenReuseDetected,
    PasswordResetRequested,
    PasswordResetCompleted,
    MfaEnrollmentStarted,
    MfaEnabled,
    MfaDisabled,
    MfaRejected,
    CredentialRegistered,
    CredentialAuthenticated,
    CounterRegressionDetected,
    CrossTenantAccessDenied,
    PermissionDenied,
    QrSessionCreated,
    QrSessionCompleted,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::AccountRegistered => "account_registered",
            AuditAction::AccountProvisioned => "account_provisioned",
            AuditAction::LoginSucceeded => "login_succeeded",
            AuditAction::LoginFailed => "login_failed",
            AuditAction::AccountLockedOut => "account_locked_out",
            AuditAction::Logout => "logout",
            AuditAction::TokenIssued => "token_issued",
            AuditAction::TokenRefreshed => "token_refreshed",
            AuditAction::TokenReuseDetected => "token_reuse_detected",
            AuditAction::PasswordResetRequested => "password_reset_requested",
            AuditAction::PasswordResetCompleted => "password_reset_completed",
            AuditAction::MfaEnrollmentStarted => "mfa_enrollment_started",
            AuditAction::MfaEnabled => "mfa_enabled",
            AuditAction::MfaDisabled => "mfa_disabled",
            AuditAction::MfaRejected => "mfa_rejected",
            AuditAction::CredentialRegistered => "credential_registered",
            AuditAction::CredentialAuthenticated => "credential_authenticated",
            AuditAction::CounterRegressionDetected => "counter_regression_detected",
            AuditAction::CrossTenantAccessDenied => "cross_tenant_access_denied",
            AuditAction::PermissionDenied => "permission_denied",
            AuditAction::QrSessionCreated => "qr_session_created",
            AuditAction::QrSessionCompleted => "qr_session_completed",
        }
    }
}

/// Event severity. `High` events are always recorded, even when the caller
/// is told a less specific reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    High,
}

/// Append-only audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub account_id: Option<Uuid>,
    pub tenant_id: Option<Uuid>,
    pub action: AuditAction,
    pub resource: String,
    pub severity: Severity,
    pub detail: String,
    pub created_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(
        account_id: Option<Uuid>,
        tenant_id: Option<Uuid>,
        action: AuditAction,
        resource: impl Into<String>,
        severity: Severity,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            tenant_id,
            action,
            resource: resource.into(),
            severity,
            detail: detail.into(),
            created_at: Utc::now(),
        }
    }

    /// A denied cross-tenant access attempt. Always high severity.
    pub fn cross_tenant_denied(
        account_id: Uuid,
        claimed_tenant: Uuid,
        requested_tenant: Uuid,
    ) -> Self {
        Self::new(
            Some(account_id),
            Some(claimed_tenant),
            AuditAction::CrossTenantAccessDenied,
            "tenant",
            Severity::High,
            format!(
                "Attempted access to tenant {} from tenant {}",
                requested_tenant, claimed_tenant
            ),
        )
    }

    /// Lockout threshold reached for an account. Always high severity.
    pub fn lockout(account_id: Uuid, tenant_id: Uuid, attempts: u32) -> Self {
        Self::new(
            Some(account_id),
            Some(tenant_id),
            AuditAction::AccountLockedOut,
            "account",
            Severity::High,
            format!("Account locked after {} consecutive failed attempts", attempts),
        )
    }
}
