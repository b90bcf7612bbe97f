//! Account model - tenant-scoped identity records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::RefreshTokenRecord;

/// Roles recognized by the permission guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Superadmin,
    Admin,
    Clinician,
    Staff,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Superadmin => "superadmin",
            Role::Admin => "admin",
            Role::Clinician => "clinician",
            Role::Staff => "staff",
        }
    }
}

/// Account entity. Unique per (tenant_id, email).
///
/// Refresh-token records are embedded by value so that rotation is a single
/// atomic document update rather than a multi-entity transaction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub password_hash: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub permissions: Vec<String>,
    pub mfa_enabled: bool,
    pub mfa_secret: Option<String>,
    pub failed_login_attempts: u32,
    pub lockout_until: Option<DateTime<Utc>>,
    pub active: bool,
    /// Subject identifier at the external identity provider, set on
    /// JIT-provisioned accounts.
    pub external_subject: Option<String>,
    #[serde(default)]
    pub refresh_tokens: Vec<RefreshTokenRecord>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create a new password-based account.
    pub fn new(
        tenant_id: Uuid,
        email: String,
        password_hash: String,
        display_name: Option<String>,
        role: Role,
        permissions: Vec<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            tenant_id,
            email,
            password_hash,
            display_name,
            role,
            permissions,
            mfa_enabled: false,
            mfa_secret: None,
            failed_login_attempts: 0,
            lockout_until: None,
            active: true,
            external_subject: None,
            refresh_tokens: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Create an account provisioned from an external identity provider.
    /// Such accounts have no usable password.
    pub fn provisioned(tenant_id: Uuid, email: String, external_subject: String) -> Self {
        let mut account = Self::new(
            tenant_id,
            email,
            String::new(),
            None,
            Role::Clinician,
            Vec::new(),
        );
        account.external_subject = Some(external_subject);
        account
    }

    /// Whether the account is currently locked out.
    pub fn is_locked(&self, now: DateTime<Utc>) -> bool {
        self.lockout_until.map(|until| until > now).unwrap_or(false)
    }

    /// Convert to sanitized response (no sensitive fields).
    pub fn sanitized(&self) -> AccountResponse {
        AccountResponse {
            id: self.id,
            tenant_id: self.tenant_id,
            email: self.email.clone(),
            display_name: self.display_name.clone(),
            role: self.role,
            permissions: self.permissions.clone(),
            mfa_enabled: self.mfa_enabled,
            active: self.active,
            created_at: self.created_at,
        }
    }
}

/// Account response for the API (without credential material).
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AccountResponse {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Role,
    pub permissions: Vec<String>,
    pub mfa_enabled: bool,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn new_account_starts_unlocked() {
        let account = Account::new(
            Uuid::new_v4(),
            "dr.smith@clinic.example".to_string(),
            "$argon2id$fake".to_string(),
            None,
            Role::Clinician,
            vec!["patients:read".to_string()],
        );
        assert!(!account.is_locked(Utc::now()));
        assert_eq!(account.failed_login_attempts, 0);
        assert!(!account.mfa_enabled);
    }

    #[test]
    fn lockout_window_is_respected() {
        let mut account = Account::new(
            Uuid::new_v4(),
            "a@b.example".to_string(),
            String::new(),
            None,
            Role::Staff,
            vec![],
        );
        let now = Utc::now();
        account.lockout_until = Some(now + Duration::minutes(30));
        assert!(account.is_locked(now));
        assert!(!account.is_locked(now + Duration::minutes(31)));
    }

    #[test]
    fn sanitized_omits_credential_material() {
        let account = Account::new(
            Uuid::new_v4(),
            "a@b.example".to_string(),
            "hash".to_string(),
            Some("Dr. A".to_string()),
            Role::Admin,
            vec![],
        );
        let response = account.sanitized();
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("hash"));
        assert!(!json.contains("mfa_secret"));
    }
}
