//! Consecutive-failure lockout behavior.

mod common;

use caresync_auth::db::CredentialStore;
use caresync_auth::dtos::LoginRequest;
use caresync_auth::models::{AuditAction, Role};
use caresync_auth::services::ServiceError;
use common::harness;
use uuid::Uuid;

const PASSWORD: &str = "a-long-enough-password";

fn login_request(tenant: Uuid, email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        tenant_id: tenant,
        email: email.to_string(),
        password: password.to_string(),
        totp_code: None,
    }
}

#[tokio::test]
async fn fifth_consecutive_failure_locks_the_account() {
    let h = harness();
    let tenant = Uuid::new_v4();
    h.register_account(tenant, "locked@clinic.example", PASSWORD, Role::Staff)
        .await;

    for _ in 0..5 {
        let result = h
            .auth
            .login(login_request(tenant, "locked@clinic.example", "wrong"))
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidCredentials)));
    }

    // Even the correct password is refused while the window is open
    let result = h
        .auth
        .login(login_request(tenant, "locked@clinic.example", PASSWORD))
        .await;
    match result {
        Err(ServiceError::AccountLocked {
            retry_after_seconds,
        }) => {
            assert!(retry_after_seconds > 0);
            assert!(retry_after_seconds <= 30 * 60);
        }
        other => panic!("expected lockout, got {:?}", other.map(|_| ())),
    }

    assert!(h.audit_actions().contains(&AuditAction::AccountLockedOut));
}

#[tokio::test]
async fn successful_login_resets_the_failure_counter() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let account = h
        .register_account(tenant, "reset@clinic.example", PASSWORD, Role::Staff)
        .await;

    for _ in 0..3 {
        let _ = h
            .auth
            .login(login_request(tenant, "reset@clinic.example", "wrong"))
            .await;
    }
    assert_eq!(h.reload(&account).await.failed_login_attempts, 3);

    h.auth
        .login(login_request(tenant, "reset@clinic.example", PASSWORD))
        .await
        .expect("login failed");
    assert_eq!(h.reload(&account).await.failed_login_attempts, 0);

    // Counting starts over: four more failures stay below the threshold
    for _ in 0..4 {
        let _ = h
            .auth
            .login(login_request(tenant, "reset@clinic.example", "wrong"))
            .await;
    }
    let result = h
        .auth
        .login(login_request(tenant, "reset@clinic.example", PASSWORD))
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn expired_window_clears_the_counter() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let account = h
        .register_account(tenant, "expired@clinic.example", PASSWORD, Role::Staff)
        .await;

    for _ in 0..5 {
        let _ = h
            .auth
            .login(login_request(tenant, "expired@clinic.example", "wrong"))
            .await;
    }

    // Window over: a single slip must not re-lock immediately
    h.store
        .set_lockout(account.id, chrono::Utc::now() - chrono::Duration::minutes(1))
        .await
        .expect("store error");

    let result = h
        .auth
        .login(login_request(tenant, "expired@clinic.example", "wrong"))
        .await;
    assert!(matches!(result, Err(ServiceError::InvalidCredentials)));
    assert_eq!(h.reload(&account).await.failed_login_attempts, 1);

    h.auth
        .login(login_request(tenant, "expired@clinic.example", PASSWORD))
        .await
        .expect("login failed after window expiry");
}

#[tokio::test]
async fn unknown_account_failures_do_not_panic_or_lock_others() {
    let h = harness();
    let tenant = Uuid::new_v4();
    h.register_account(tenant, "other@clinic.example", PASSWORD, Role::Staff)
        .await;

    for _ in 0..6 {
        let result = h
            .auth
            .login(login_request(tenant, "ghost@clinic.example", "wrong"))
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidCredentials)));
    }

    let result = h
        .auth
        .login(login_request(tenant, "other@clinic.example", PASSWORD))
        .await;
    assert!(result.is_ok());
}
