//! Tenant isolation and permission checks.

mod common;

use caresync_auth::models::{AuditAction, Role};
use caresync_auth::services::{AccessTokenClaims, ServiceError};
use common::harness;
use uuid::Uuid;

fn claims_for(tenant: Uuid, role: Role, permissions: Vec<String>) -> AccessTokenClaims {
    AccessTokenClaims {
        sub: Uuid::new_v4().to_string(),
        tenant_id: tenant.to_string(),
        role,
        permissions,
        exp: 4_000_000_000,
        iat: 1_700_000_000,
        jti: Uuid::new_v4().to_string(),
    }
}

#[tokio::test]
async fn same_tenant_access_is_allowed() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let claims = claims_for(tenant, Role::Staff, vec![]);

    h.guard
        .scope_to_tenant(&claims, tenant)
        .await
        .expect("same-tenant access refused");
    assert!(h.audit_actions().is_empty());
}

#[tokio::test]
async fn cross_tenant_access_is_denied_and_audited() {
    let h = harness();
    let claims = claims_for(Uuid::new_v4(), Role::Admin, vec![]);

    let result = h.guard.scope_to_tenant(&claims, Uuid::new_v4()).await;
    assert!(matches!(result, Err(ServiceError::TenantMismatch)));

    // Denials are written synchronously, before the caller hears anything
    assert!(h
        .audit_actions()
        .contains(&AuditAction::CrossTenantAccessDenied));
}

#[tokio::test]
async fn superadmin_may_cross_tenants() {
    let h = harness();
    let claims = claims_for(Uuid::new_v4(), Role::Superadmin, vec![]);

    h.guard
        .scope_to_tenant(&claims, Uuid::new_v4())
        .await
        .expect("superadmin refused");
    assert!(h.audit_actions().is_empty());
}

#[tokio::test]
async fn admin_holds_every_permission() {
    let h = harness();
    let claims = claims_for(Uuid::new_v4(), Role::Admin, vec![]);

    h.guard
        .require_permission(&claims, "accounts:read")
        .await
        .expect("admin refused");
}

#[tokio::test]
async fn granted_permission_passes_missing_permission_is_forbidden() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let granted = claims_for(tenant, Role::Staff, vec!["records:read".to_string()]);

    h.guard
        .require_permission(&granted, "records:read")
        .await
        .expect("granted permission refused");

    let result = h.guard.require_permission(&granted, "records:write").await;
    assert!(matches!(result, Err(ServiceError::Forbidden)));

    h.settle_audit().await;
    assert!(h.audit_actions().contains(&AuditAction::PermissionDenied));
}
