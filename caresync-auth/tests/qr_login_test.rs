//! Cross-device QR login sessions.

mod common;

use caresync_auth::db::CredentialStore;
use caresync_auth::models::{AuditAction, ExternalClaims, QrStatus, Role};
use caresync_auth::services::ServiceError;
use common::harness;
use uuid::Uuid;

const PASSWORD: &str = "a-long-enough-password";

#[tokio::test]
async fn completed_flow_mints_tokens_and_provisions_the_account() {
    let h = harness();
    let tenant = Uuid::new_v4();

    let session = h.qr.create_session(tenant).await.expect("create failed");
    assert!(session.qr_content.contains("caresync://approve/"));

    // Still waiting for the phone
    let poll = h.qr.poll_session(&session.session_id).await.expect("poll failed");
    assert_eq!(poll.status, QrStatus::Pending);
    assert!(poll.tokens.is_none());

    // Approve on the other device
    let flow_token = h
        .provider
        .flows
        .lock()
        .expect("mutex")
        .keys()
        .next()
        .cloned()
        .expect("no flow");
    h.provider.complete(
        &flow_token,
        ExternalClaims {
            subject: "ext-subject-1".to_string(),
            email: "new.clinician@clinic.example".to_string(),
        },
    );

    let poll = h.qr.poll_session(&session.session_id).await.expect("poll failed");
    assert_eq!(poll.status, QrStatus::Completed);
    let tokens = poll.tokens.expect("no tokens");
    let account = poll.account.expect("no account");
    assert_eq!(account.tenant_id, tenant);
    assert_eq!(account.email, "new.clinician@clinic.example");

    // The minted access token is genuine
    let claims = h
        .tokens
        .verify_access(&tokens.access_token)
        .await
        .expect("access token invalid");
    assert_eq!(claims.tenant_id, tenant.to_string());

    // Provisioned account is persisted with the external subject
    let stored = h
        .store
        .find_account_by_email(tenant, "new.clinician@clinic.example")
        .await
        .expect("store error")
        .expect("account not provisioned");
    assert_eq!(stored.external_subject.as_deref(), Some("ext-subject-1"));

    h.settle_audit().await;
    let actions = h.audit_actions();
    assert!(actions.contains(&AuditAction::AccountProvisioned));
    assert!(actions.contains(&AuditAction::QrSessionCompleted));
}

#[tokio::test]
async fn completion_is_single_use() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let session = h.qr.create_session(tenant).await.expect("create failed");

    let flow_token = h
        .provider
        .flows
        .lock()
        .expect("mutex")
        .keys()
        .next()
        .cloned()
        .expect("no flow");
    h.provider.complete(
        &flow_token,
        ExternalClaims {
            subject: "s".to_string(),
            email: "once@clinic.example".to_string(),
        },
    );

    h.qr.poll_session(&session.session_id)
        .await
        .expect("first poll failed");

    let result = h.qr.poll_session(&session.session_id).await;
    assert!(matches!(result, Err(ServiceError::SessionNotFound)));
}

#[tokio::test]
async fn existing_account_is_reused_not_duplicated() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let existing = h
        .register_account(tenant, "known@clinic.example", PASSWORD, Role::Clinician)
        .await;

    let session = h.qr.create_session(tenant).await.expect("create failed");
    let flow_token = h
        .provider
        .flows
        .lock()
        .expect("mutex")
        .keys()
        .next()
        .cloned()
        .expect("no flow");
    h.provider.complete(
        &flow_token,
        ExternalClaims {
            subject: "ext".to_string(),
            email: "known@clinic.example".to_string(),
        },
    );

    let poll = h.qr.poll_session(&session.session_id).await.expect("poll failed");
    assert_eq!(poll.account.expect("no account").id, existing.id);
}

#[tokio::test]
async fn provider_outage_keeps_the_session_pending() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let session = h.qr.create_session(tenant).await.expect("create failed");

    h.provider.set_unreachable(true);
    let poll = h.qr.poll_session(&session.session_id).await.expect("poll failed");
    assert_eq!(poll.status, QrStatus::Pending);

    // Back online, still pending, session intact
    h.provider.set_unreachable(false);
    let poll = h.qr.poll_session(&session.session_id).await.expect("poll failed");
    assert_eq!(poll.status, QrStatus::Pending);
}

#[tokio::test]
async fn provider_forgetting_the_flow_terminates_the_session() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let session = h.qr.create_session(tenant).await.expect("create failed");

    let flow_token = h
        .provider
        .flows
        .lock()
        .expect("mutex")
        .keys()
        .next()
        .cloned()
        .expect("no flow");
    h.provider.forget(&flow_token);

    let result = h.qr.poll_session(&session.session_id).await;
    assert!(matches!(result, Err(ServiceError::SessionNotFound)));

    // And it stays terminal
    let result = h.qr.poll_session(&session.session_id).await;
    assert!(matches!(result, Err(ServiceError::SessionNotFound)));
}

#[tokio::test]
async fn expired_session_is_unknown() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let session = h.qr.create_session(tenant).await.expect("create failed");

    h.cache.expire(&format!("qr:{}", session.session_id));

    let result = h.qr.poll_session(&session.session_id).await;
    assert!(matches!(result, Err(ServiceError::SessionNotFound)));
}

#[tokio::test]
async fn provider_outage_at_creation_is_surfaced() {
    let h = harness();
    h.provider.set_unreachable(true);
    let result = h.qr.create_session(Uuid::new_v4()).await;
    assert!(matches!(result, Err(ServiceError::ProviderUnavailable(_))));
}
