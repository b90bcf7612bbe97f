//! WebAuthn ceremonies: registration, assertion, counter regression and
//! challenge consumption.

mod common;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use caresync_auth::db::CredentialStore;
use caresync_auth::models::{AuditAction, Role};
use caresync_auth::services::webauthn::{AuthenticationAssertion, RegistrationAttestation};
use caresync_auth::services::ServiceError;
use common::{harness, Harness, TEST_ORIGIN, TEST_RP_ID};
use ed25519_dalek::{Signer, SigningKey};
use sha2::{Digest, Sha256};
use uuid::Uuid;

const PASSWORD: &str = "a-long-enough-password";

fn signing_key() -> SigningKey {
    SigningKey::from_bytes(&[7u8; 32])
}

fn client_data(ceremony_type: &str, challenge: &str, origin: &str) -> String {
    let json = serde_json::json!({
        "type": ceremony_type,
        "challenge": challenge,
        "origin": origin,
    });
    STANDARD.encode(serde_json::to_vec(&json).expect("json"))
}

fn authenticator_data(rp_id: &str, counter: u32) -> Vec<u8> {
    let mut data = Sha256::digest(rp_id.as_bytes()).to_vec();
    data.push(0x01); // user present
    data.extend_from_slice(&counter.to_be_bytes());
    data
}

fn sign_ceremony(key: &SigningKey, client_data_json: &str, auth_data: &[u8]) -> String {
    let mut message = auth_data.to_vec();
    message.extend_from_slice(&Sha256::digest(
        STANDARD.decode(client_data_json).expect("b64"),
    ));
    STANDARD.encode(key.sign(&message).to_bytes())
}

fn signed_assertion(
    key: &SigningKey,
    credential_id: &str,
    challenge: &str,
    counter: u32,
) -> AuthenticationAssertion {
    let cdj = client_data("webauthn.get", challenge, TEST_ORIGIN);
    let auth_data = authenticator_data(TEST_RP_ID, counter);
    let signature = sign_ceremony(key, &cdj, &auth_data);

    AuthenticationAssertion {
        credential_id: credential_id.to_string(),
        client_data_json: cdj,
        authenticator_data: STANDARD.encode(auth_data),
        signature,
    }
}

fn signed_attestation(
    key: &SigningKey,
    credential_id: &str,
    challenge: &str,
    counter: u32,
) -> RegistrationAttestation {
    let cdj = client_data("webauthn.create", challenge, TEST_ORIGIN);
    let auth_data = authenticator_data(TEST_RP_ID, counter);
    let signature = sign_ceremony(key, &cdj, &auth_data);

    RegistrationAttestation {
        credential_id: credential_id.to_string(),
        public_key: STANDARD.encode(key.verifying_key().to_bytes()),
        client_data_json: cdj,
        authenticator_data: STANDARD.encode(auth_data),
        signature,
        transports: vec!["usb".to_string()],
    }
}

async fn register_credential(h: &Harness, account: &caresync_auth::models::Account) -> String {
    let key = signing_key();
    let challenge = h
        .webauthn
        .begin_registration(account)
        .await
        .expect("begin registration failed");

    let credential_id = URL_SAFE_NO_PAD.encode(b"test-credential");
    let attestation = signed_attestation(&key, &credential_id, &challenge.challenge, 0);
    h.webauthn
        .complete_registration(account, attestation)
        .await
        .expect("complete registration failed");
    credential_id
}

#[tokio::test]
async fn registration_then_assertion_succeeds() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let account = h
        .register_account(tenant, "key@clinic.example", PASSWORD, Role::Clinician)
        .await;

    let credential_id = register_credential(&h, &account).await;

    let challenge = h
        .webauthn
        .begin_authentication(&account)
        .await
        .expect("begin authentication failed");
    assert_eq!(challenge.allowed_credentials, vec![credential_id.clone()]);

    let assertion = signed_assertion(&signing_key(), &credential_id, &challenge.challenge, 1);
    h.webauthn
        .complete_authentication(&account, assertion)
        .await
        .expect("assertion rejected");

    let stored = h
        .store
        .find_credential(&credential_id)
        .await
        .expect("store error")
        .expect("credential missing");
    assert_eq!(stored.sign_counter, 1);
}

#[tokio::test]
async fn non_increasing_counter_is_rejected_as_clone() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let account = h
        .register_account(tenant, "clone@clinic.example", PASSWORD, Role::Clinician)
        .await;
    let credential_id = register_credential(&h, &account).await;

    let challenge = h.webauthn.begin_authentication(&account).await.expect("begin");
    let assertion = signed_assertion(&signing_key(), &credential_id, &challenge.challenge, 5);
    h.webauthn
        .complete_authentication(&account, assertion)
        .await
        .expect("first assertion rejected");

    // Same counter again: cloned-authenticator signal
    let challenge = h.webauthn.begin_authentication(&account).await.expect("begin");
    let assertion = signed_assertion(&signing_key(), &credential_id, &challenge.challenge, 5);
    let result = h.webauthn.complete_authentication(&account, assertion).await;
    assert!(matches!(result, Err(ServiceError::CounterRegression)));

    assert!(h
        .audit_actions()
        .contains(&AuditAction::CounterRegressionDetected));
}

#[tokio::test]
async fn counter_stalled_at_zero_is_rejected() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let account = h
        .register_account(tenant, "zero@clinic.example", PASSWORD, Role::Clinician)
        .await;
    let credential_id = register_credential(&h, &account).await;

    // Registration stored counter 0; a valid signature reporting 0 again
    // must not pass the clone check.
    let challenge = h.webauthn.begin_authentication(&account).await.expect("begin");
    let assertion = signed_assertion(&signing_key(), &credential_id, &challenge.challenge, 0);
    let result = h.webauthn.complete_authentication(&account, assertion).await;
    assert!(matches!(result, Err(ServiceError::CounterRegression)));

    assert!(h
        .audit_actions()
        .contains(&AuditAction::CounterRegressionDetected));
}

#[tokio::test]
async fn assertion_counter_must_exceed_the_registration_counter() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let account = h
        .register_account(tenant, "seeded@clinic.example", PASSWORD, Role::Clinician)
        .await;

    let key = signing_key();
    let challenge = h
        .webauthn
        .begin_registration(&account)
        .await
        .expect("begin registration failed");
    let credential_id = URL_SAFE_NO_PAD.encode(b"seeded-credential");
    let attestation = signed_attestation(&key, &credential_id, &challenge.challenge, 10);
    h.webauthn
        .complete_registration(&account, attestation)
        .await
        .expect("complete registration failed");

    let challenge = h.webauthn.begin_authentication(&account).await.expect("begin");
    let assertion = signed_assertion(&key, &credential_id, &challenge.challenge, 10);
    let result = h.webauthn.complete_authentication(&account, assertion).await;
    assert!(matches!(result, Err(ServiceError::CounterRegression)));

    let challenge = h.webauthn.begin_authentication(&account).await.expect("begin");
    let assertion = signed_assertion(&key, &credential_id, &challenge.challenge, 11);
    h.webauthn
        .complete_authentication(&account, assertion)
        .await
        .expect("advancing counter rejected");
}

#[tokio::test]
async fn challenge_is_single_use() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let account = h
        .register_account(tenant, "once@clinic.example", PASSWORD, Role::Staff)
        .await;
    let credential_id = register_credential(&h, &account).await;

    let challenge = h.webauthn.begin_authentication(&account).await.expect("begin");
    let assertion = signed_assertion(&signing_key(), &credential_id, &challenge.challenge, 1);
    h.webauthn
        .complete_authentication(&account, assertion.clone())
        .await
        .expect("first use rejected");

    let replay = signed_assertion(&signing_key(), &credential_id, &challenge.challenge, 2);
    let result = h.webauthn.complete_authentication(&account, replay).await;
    assert!(matches!(result, Err(ServiceError::ChallengeExpired)));
}

#[tokio::test]
async fn wrong_origin_and_bad_signature_are_rejected() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let account = h
        .register_account(tenant, "strict@clinic.example", PASSWORD, Role::Staff)
        .await;
    let credential_id = register_credential(&h, &account).await;

    // Origin mismatch in clientDataJSON
    let challenge = h.webauthn.begin_authentication(&account).await.expect("begin");
    let mut assertion = signed_assertion(&signing_key(), &credential_id, &challenge.challenge, 1);
    assertion.client_data_json =
        client_data("webauthn.get", &challenge.challenge, "https://evil.example");
    let result = h.webauthn.complete_authentication(&account, assertion).await;
    assert!(matches!(result, Err(ServiceError::Validation(_))));

    // Signature from a different key
    let challenge = h.webauthn.begin_authentication(&account).await.expect("begin");
    let wrong_key = SigningKey::from_bytes(&[9u8; 32]);
    let assertion = signed_assertion(&wrong_key, &credential_id, &challenge.challenge, 1);
    let result = h.webauthn.complete_authentication(&account, assertion).await;
    assert!(matches!(result, Err(ServiceError::InvalidCredentials)));
}

#[tokio::test]
async fn registration_challenge_must_match() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let account = h
        .register_account(tenant, "mismatch@clinic.example", PASSWORD, Role::Staff)
        .await;

    let _challenge = h
        .webauthn
        .begin_registration(&account)
        .await
        .expect("begin registration failed");

    let attestation = signed_attestation(
        &signing_key(),
        &URL_SAFE_NO_PAD.encode(b"other"),
        "some-other-challenge",
        0,
    );
    let result = h.webauthn.complete_registration(&account, attestation).await;
    assert!(matches!(result, Err(ServiceError::ChallengeExpired)));
}

#[tokio::test]
async fn registration_requires_possession_of_the_private_key() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let account = h
        .register_account(tenant, "possess@clinic.example", PASSWORD, Role::Staff)
        .await;

    // Signed with a key other than the one being enrolled
    let challenge = h
        .webauthn
        .begin_registration(&account)
        .await
        .expect("begin registration failed");
    let mut attestation = signed_attestation(
        &SigningKey::from_bytes(&[9u8; 32]),
        &URL_SAFE_NO_PAD.encode(b"forged"),
        &challenge.challenge,
        0,
    );
    attestation.public_key = STANDARD.encode(signing_key().verifying_key().to_bytes());
    let result = h.webauthn.complete_registration(&account, attestation).await;
    assert!(matches!(result, Err(ServiceError::InvalidCredentials)));

    // Authenticator data bound to a different relying party
    let challenge = h
        .webauthn
        .begin_registration(&account)
        .await
        .expect("begin registration failed");
    let key = signing_key();
    let cdj = client_data("webauthn.create", &challenge.challenge, TEST_ORIGIN);
    let foreign_data = authenticator_data("other.example", 0);
    let signature = sign_ceremony(&key, &cdj, &foreign_data);
    let attestation = RegistrationAttestation {
        credential_id: URL_SAFE_NO_PAD.encode(b"foreign"),
        public_key: STANDARD.encode(key.verifying_key().to_bytes()),
        client_data_json: cdj,
        authenticator_data: STANDARD.encode(foreign_data),
        signature,
        transports: vec![],
    };
    let result = h.webauthn.complete_registration(&account, attestation).await;
    assert!(matches!(result, Err(ServiceError::Validation(_))));
}

#[tokio::test]
async fn registered_credentials_are_listed_for_exclusion() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let account = h
        .register_account(tenant, "exclude@clinic.example", PASSWORD, Role::Staff)
        .await;

    let first = h
        .webauthn
        .begin_registration(&account)
        .await
        .expect("begin registration failed");
    assert!(first.exclude_credentials.is_empty());

    let credential_id = register_credential(&h, &account).await;

    let second = h
        .webauthn
        .begin_registration(&account)
        .await
        .expect("begin registration failed");
    assert_eq!(second.exclude_credentials, vec![credential_id]);
}

#[tokio::test]
async fn begin_authentication_without_credentials_is_refused() {
    let h = harness();
    let tenant = Uuid::new_v4();
    let account = h
        .register_account(tenant, "nokey@clinic.example", PASSWORD, Role::Staff)
        .await;

    let result = h.webauthn.begin_authentication(&account).await;
    assert!(matches!(result, Err(ServiceError::CredentialNotFound)));
}
