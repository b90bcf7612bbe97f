//! Refresh rotation, replay detection and access-token revocation.

mod common;

use caresync_auth::config::JwtConfig;
use caresync_auth::dtos::LoginRequest;
use caresync_auth::models::{AuditAction, Role};
use caresync_auth::services::ServiceError;
use common::harness;
use uuid::Uuid;

const PASSWORD: &str = "a-long-enough-password";

#[tokio::test]
async fn rotation_issues_new_pair_and_consumes_old_token() {
    let h = harness();
    let tenant = Uuid::new_v4();
    h.register_account(tenant, "dr.smith@clinic.example", PASSWORD, Role::Clinician)
        .await;

    let (_, pair) = h
        .auth
        .login(LoginRequest {
            tenant_id: tenant,
            email: "dr.smith@clinic.example".to_string(),
            password: PASSWORD.to_string(),
            totp_code: None,
        })
        .await
        .expect("login failed");

    let (account, rotated) = h
        .tokens
        .rotate_refresh(&pair.refresh_token)
        .await
        .expect("rotation failed");
    assert_eq!(account.email, "dr.smith@clinic.example");
    assert_ne!(rotated.refresh_token, pair.refresh_token);

    // The rotated-in token is live
    let claims = h
        .tokens
        .verify_access(&rotated.access_token)
        .await
        .expect("access token invalid");
    assert_eq!(claims.tenant_id, tenant.to_string());
}

#[tokio::test]
async fn replaying_a_rotated_token_burns_the_family() {
    let h = harness();
    let tenant = Uuid::new_v4();
    h.register_account(tenant, "a@clinic.example", PASSWORD, Role::Staff)
        .await;

    let (_, pair) = h
        .auth
        .login(LoginRequest {
            tenant_id: tenant,
            email: "a@clinic.example".to_string(),
            password: PASSWORD.to_string(),
            totp_code: None,
        })
        .await
        .expect("login failed");

    let (_, rotated) = h
        .tokens
        .rotate_refresh(&pair.refresh_token)
        .await
        .expect("rotation failed");

    // Replay of the consumed token is refused
    let replay = h.tokens.rotate_refresh(&pair.refresh_token).await;
    assert!(matches!(replay, Err(ServiceError::TokenInvalid)));

    // And its whole family is gone, including the fresh token
    let descendant = h.tokens.rotate_refresh(&rotated.refresh_token).await;
    assert!(matches!(descendant, Err(ServiceError::TokenInvalid)));

    h.settle_audit().await;
    assert!(h
        .audit_actions()
        .contains(&AuditAction::TokenReuseDetected));
}

#[tokio::test]
async fn unknown_refresh_token_is_rejected_without_side_effects() {
    let h = harness();
    let result = h.tokens.rotate_refresh("never-issued").await;
    assert!(matches!(result, Err(ServiceError::TokenInvalid)));
    assert!(!h
        .audit_actions()
        .contains(&AuditAction::TokenReuseDetected));
}

#[tokio::test]
async fn expired_refresh_token_is_invalid() {
    let h = common::harness_with_jwt(JwtConfig {
        secret: common::jwt_config().secret,
        access_token_expiry_minutes: 15,
        refresh_token_expiry_days: -1,
    });
    let tenant = Uuid::new_v4();
    let account = h
        .register_account(tenant, "b@clinic.example", PASSWORD, Role::Staff)
        .await;

    let pair = h.tokens.issue_pair(&account).await.expect("issue failed");
    let result = h.tokens.rotate_refresh(&pair.refresh_token).await;
    assert!(matches!(result, Err(ServiceError::TokenInvalid)));
}

#[tokio::test]
async fn expired_access_token_is_reported_as_expired() {
    // Expiry far enough in the past to clear the decoder leeway
    let h = common::harness_with_jwt(JwtConfig {
        secret: common::jwt_config().secret,
        access_token_expiry_minutes: -5,
        refresh_token_expiry_days: 7,
    });
    let tenant = Uuid::new_v4();
    let account = h
        .register_account(tenant, "c@clinic.example", PASSWORD, Role::Staff)
        .await;

    let pair = h.tokens.issue_pair(&account).await.expect("issue failed");
    let result = h.tokens.verify_access(&pair.access_token).await;
    assert!(matches!(result, Err(ServiceError::TokenExpired)));
}

#[tokio::test]
async fn revoked_access_token_is_refused_until_expiry() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let account = h
        .register_account(tenant, "d@clinic.example", PASSWORD, Role::Staff)
        .await;

    let pair = h.tokens.issue_pair(&account).await.expect("issue failed");
    let claims = h
        .tokens
        .verify_access(&pair.access_token)
        .await
        .expect("token invalid");

    h.tokens.revoke_access(&claims).await.expect("revoke failed");

    let result = h.tokens.verify_access(&pair.access_token).await;
    assert!(matches!(result, Err(ServiceError::TokenRevoked)));
}

#[tokio::test]
async fn tampered_access_token_is_invalid() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let account = h
        .register_account(tenant, "e@clinic.example", PASSWORD, Role::Staff)
        .await;

    let pair = h.tokens.issue_pair(&account).await.expect("issue failed");
    let mut tampered = pair.access_token.clone();
    tampered.pop();
    tampered.push('x');

    let result = h.tokens.verify_access(&tampered).await;
    assert!(matches!(result, Err(ServiceError::TokenInvalid)));
}
