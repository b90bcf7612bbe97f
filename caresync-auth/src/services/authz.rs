//! Tenant and permission guard.
//!
//! Every data-bearing operation is checked here before it touches a
//! tenant's records. Cross-tenant denials are always audited at high
//! severity, whatever the caller is told.

use uuid::Uuid;

use super::audit::AuditService;
use super::error::ServiceError;
use super::token::AccessTokenClaims;
use crate::models::{AuditAction, AuditEvent, Role, Severity};

#[derive(Clone)]
pub struct TenantGuard {
    audit: AuditService,
}

impl TenantGuard {
    pub fn new(audit: AuditService) -> Self {
        Self { audit }
    }

    /// Confine a request to the tenant named in its token. Superadmins may
    /// cross tenants; everyone else is refused and the attempt is recorded.
    pub async fn scope_to_tenant(
        &self,
        claims: &AccessTokenClaims,
        requested_tenant: Uuid,
    ) -> Result<(), ServiceError> {
        let claimed_tenant = parse_uuid(&claims.tenant_id)?;
        if claimed_tenant == requested_tenant || claims.role == Role::Superadmin {
            return Ok(());
        }

        let account_id = parse_uuid(&claims.sub)?;
        self.audit
            .record(AuditEvent::cross_tenant_denied(
                account_id,
                claimed_tenant,
                requested_tenant,
            ))
            .await;

        Err(ServiceError::TenantMismatch)
    }

    /// Require a named permission. Admin roles hold every permission within
    /// their own tenant.
    pub async fn require_permission(
        &self,
        claims: &AccessTokenClaims,
        permission: &str,
    ) -> Result<(), ServiceError> {
        if matches!(claims.role, Role::Superadmin | Role::Admin) {
            return Ok(());
        }
        if claims.permissions.iter().any(|p| p == permission) {
            return Ok(());
        }

        let account_id = parse_uuid(&claims.sub)?;
        let tenant_id = parse_uuid(&claims.tenant_id)?;
        self.audit.record_async(AuditEvent::new(
            Some(account_id),
            Some(tenant_id),
            AuditAction::PermissionDenied,
            "permission",
            Severity::Warning,
            format!("Missing permission {}", permission),
        ));

        Err(ServiceError::Forbidden)
    }
}

fn parse_uuid(value: &str) -> Result<Uuid, ServiceError> {
    value
        .parse()
        .map_err(|_| ServiceError::Internal(anyhow::anyhow!("Malformed id in token claims")))
}
