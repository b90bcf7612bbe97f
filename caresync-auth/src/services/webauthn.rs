//! WebAuthn ceremony coordinator for Ed25519 hardware credentials.
//!
//! Both registration and authentication are two-step ceremonies: a
//! single-use challenge is parked in the ephemeral cache, and the completing
//! request must present client data binding that exact challenge to our
//! origin. Both completions are signed over `authenticatorData ||
//! SHA-256(clientDataJSON)`, so registration proves possession of the key
//! being enrolled. Assertions must strictly advance the signature counter
//! recorded at registration; a counter that fails to increase is treated as
//! a cloned authenticator.

use std::sync::Arc;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use utoipa::ToSchema;

use super::audit::AuditService;
use super::cache::EphemeralCache;
use super::error::ServiceError;
use crate::config::WebAuthnConfig;
use crate::db::CredentialStore;
use crate::models::{Account, AuditAction, AuditEvent, HardwareCredential, Severity};

const CHALLENGE_BYTES: usize = 32;
const AUTHENTICATOR_DATA_MIN_LEN: usize = 37;
const FLAG_USER_PRESENT: u8 = 0x01;

/// Options returned to the client to start credential registration.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RegistrationChallenge {
    pub challenge: String,
    pub rp_id: String,
    pub rp_name: String,
    pub user_id: String,
    pub user_name: String,
    /// Credential ids already registered to this account; the client must
    /// not offer these to the authenticator again.
    pub exclude_credentials: Vec<String>,
}

/// Attestation payload completing a registration ceremony.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct RegistrationAttestation {
    /// base64url credential id chosen by the authenticator
    pub credential_id: String,
    /// base64 Ed25519 public key (32 bytes)
    pub public_key: String,
    /// base64 clientDataJSON
    pub client_data_json: String,
    /// base64 authenticatorData
    pub authenticator_data: String,
    /// base64 Ed25519 signature over `authenticatorData || SHA-256(clientDataJSON)`
    pub signature: String,
    #[serde(default)]
    pub transports: Vec<String>,
}

/// Options returned to the client to start an assertion.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuthenticationChallenge {
    pub challenge: String,
    pub rp_id: String,
    pub allowed_credentials: Vec<String>,
}

/// Assertion payload completing an authentication ceremony.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct AuthenticationAssertion {
    pub credential_id: String,
    /// base64 clientDataJSON
    pub client_data_json: String,
    /// base64 authenticatorData
    pub authenticator_data: String,
    /// base64 Ed25519 signature
    pub signature: String,
}

#[derive(Debug, Deserialize)]
struct ClientData {
    #[serde(rename = "type")]
    ceremony_type: String,
    challenge: String,
    origin: String,
}

#[derive(Clone)]
pub struct WebAuthnService {
    rp_id: String,
    rp_name: String,
    origin: String,
    challenge_ttl_seconds: i64,
    store: Arc<dyn CredentialStore>,
    cache: Arc<dyn EphemeralCache>,
    audit: AuditService,
}

impl WebAuthnService {
    pub fn new(
        config: &WebAuthnConfig,
        store: Arc<dyn CredentialStore>,
        cache: Arc<dyn EphemeralCache>,
        audit: AuditService,
    ) -> Self {
        Self {
            rp_id: config.rp_id.clone(),
            rp_name: config.rp_name.clone(),
            origin: config.origin.clone(),
            challenge_ttl_seconds: config.challenge_ttl_seconds,
            store,
            cache,
            audit,
        }
    }

    pub async fn begin_registration(
        &self,
        account: &Account,
    ) -> Result<RegistrationChallenge, ServiceError> {
        let existing = self
            .store
            .credentials_for_account(account.id)
            .await
            .map_err(ServiceError::Database)?;

        let challenge = generate_challenge();

        self.cache
            .set(
                &registration_key(account),
                &challenge,
                self.challenge_ttl_seconds,
            )
            .await
            .map_err(ServiceError::Cache)?;

        Ok(RegistrationChallenge {
            challenge,
            rp_id: self.rp_id.clone(),
            rp_name: self.rp_name.clone(),
            user_id: account.id.to_string(),
            user_name: account.email.clone(),
            exclude_credentials: existing.into_iter().map(|c| c.credential_id).collect(),
        })
    }

    pub async fn complete_registration(
        &self,
        account: &Account,
        attestation: RegistrationAttestation,
    ) -> Result<HardwareCredential, ServiceError> {
        let challenge = self
            .cache
            .get_and_delete(&registration_key(account))
            .await
            .map_err(ServiceError::Cache)?
            .ok_or(ServiceError::ChallengeExpired)?;

        let client_data_bytes =
            self.check_client_data(&attestation.client_data_json, "webauthn.create", &challenge)?;
        let (auth_data, counter) = self.check_authenticator_data(&attestation.authenticator_data)?;

        // The attestation must be signed with the key being enrolled, so a
        // caller cannot register a public key it does not hold.
        let verifying_key = parse_public_key(&attestation.public_key)?;
        let signature = parse_signature(&attestation.signature)?;
        let mut message = auth_data;
        message.extend_from_slice(&Sha256::digest(&client_data_bytes));
        verifying_key
            .verify(&message, &signature)
            .map_err(|_| ServiceError::InvalidCredentials)?;

        let credential = HardwareCredential::new(
            account.id,
            attestation.credential_id,
            attestation.public_key,
            counter,
            attestation.transports,
        );
        self.store
            .add_credential(&credential)
            .await
            .map_err(ServiceError::Database)?;

        self.audit.record_async(AuditEvent::new(
            Some(account.id),
            Some(account.tenant_id),
            AuditAction::CredentialRegistered,
            "credential",
            Severity::Info,
            format!("Hardware credential {} registered", credential.credential_id),
        ));

        Ok(credential)
    }

    pub async fn begin_authentication(
        &self,
        account: &Account,
    ) -> Result<AuthenticationChallenge, ServiceError> {
        let credentials = self
            .store
            .credentials_for_account(account.id)
            .await
            .map_err(ServiceError::Database)?;
        if credentials.is_empty() {
            return Err(ServiceError::CredentialNotFound);
        }

        let challenge = generate_challenge();
        self.cache
            .set(
                &authentication_key(account),
                &challenge,
                self.challenge_ttl_seconds,
            )
            .await
            .map_err(ServiceError::Cache)?;

        Ok(AuthenticationChallenge {
            challenge,
            rp_id: self.rp_id.clone(),
            allowed_credentials: credentials.into_iter().map(|c| c.credential_id).collect(),
        })
    }

    /// Verify an assertion. On success the stored signature counter has
    /// been advanced to the asserted value.
    pub async fn complete_authentication(
        &self,
        account: &Account,
        assertion: AuthenticationAssertion,
    ) -> Result<(), ServiceError> {
        let challenge = self
            .cache
            .get_and_delete(&authentication_key(account))
            .await
            .map_err(ServiceError::Cache)?
            .ok_or(ServiceError::ChallengeExpired)?;

        let client_data_bytes =
            self.check_client_data(&assertion.client_data_json, "webauthn.get", &challenge)?;

        let credential = self
            .store
            .find_credential(&assertion.credential_id)
            .await
            .map_err(ServiceError::Database)?
            .ok_or(ServiceError::CredentialNotFound)?;
        if credential.account_id != account.id {
            return Err(ServiceError::CredentialNotFound);
        }

        let (auth_data, counter) =
            self.check_authenticator_data(&assertion.authenticator_data)?;

        let verifying_key = parse_public_key(&credential.public_key)?;
        let signature = parse_signature(&assertion.signature)?;

        // Signed message per the WebAuthn assertion procedure.
        let mut message = auth_data;
        message.extend_from_slice(&Sha256::digest(&client_data_bytes));

        verifying_key
            .verify(&message, &signature)
            .map_err(|_| ServiceError::InvalidCredentials)?;

        // A counter at or below the stored value is a cloned-authenticator
        // signal, signature validity notwithstanding.
        if counter <= credential.sign_counter {
            self.audit
                .record(AuditEvent::new(
                    Some(account.id),
                    Some(account.tenant_id),
                    AuditAction::CounterRegressionDetected,
                    "credential",
                    Severity::High,
                    format!(
                        "Credential {} asserted counter {} against stored {}",
                        credential.credential_id, counter, credential.sign_counter
                    ),
                ))
                .await;
            return Err(ServiceError::CounterRegression);
        }

        self.store
            .update_sign_counter(&credential.credential_id, counter)
            .await
            .map_err(ServiceError::Database)?;

        self.audit.record_async(AuditEvent::new(
            Some(account.id),
            Some(account.tenant_id),
            AuditAction::CredentialAuthenticated,
            "credential",
            Severity::Info,
            format!("Credential {} asserted", credential.credential_id),
        ));

        Ok(())
    }

    /// Decode clientDataJSON and bind it to the ceremony type, the issued
    /// challenge and our origin. Returns the raw bytes for signature input.
    fn check_client_data(
        &self,
        client_data_b64: &str,
        expected_type: &str,
        expected_challenge: &str,
    ) -> Result<Vec<u8>, ServiceError> {
        let bytes = STANDARD
            .decode(client_data_b64)
            .map_err(|_| ServiceError::Validation("Invalid clientDataJSON encoding".to_string()))?;
        let client_data: ClientData = serde_json::from_slice(&bytes)
            .map_err(|_| ServiceError::Validation("Malformed clientDataJSON".to_string()))?;

        if client_data.ceremony_type != expected_type {
            return Err(ServiceError::Validation(
                "Unexpected ceremony type".to_string(),
            ));
        }
        if client_data.challenge != expected_challenge {
            return Err(ServiceError::ChallengeExpired);
        }
        if client_data.origin != self.origin {
            return Err(ServiceError::Validation("Origin mismatch".to_string()));
        }

        Ok(bytes)
    }

    /// Decode authenticatorData, bind it to our relying-party id and demand
    /// user presence. Returns the raw bytes and the signature counter.
    fn check_authenticator_data(
        &self,
        auth_data_b64: &str,
    ) -> Result<(Vec<u8>, u32), ServiceError> {
        let auth_data = STANDARD
            .decode(auth_data_b64)
            .map_err(|_| ServiceError::Validation("Invalid authenticator data".to_string()))?;
        if auth_data.len() < AUTHENTICATOR_DATA_MIN_LEN {
            return Err(ServiceError::Validation(
                "Authenticator data too short".to_string(),
            ));
        }

        let rp_id_hash = Sha256::digest(self.rp_id.as_bytes());
        if auth_data[..32] != rp_id_hash[..] {
            return Err(ServiceError::Validation(
                "Relying-party id mismatch".to_string(),
            ));
        }

        let flags = auth_data[32];
        if flags & FLAG_USER_PRESENT == 0 {
            return Err(ServiceError::Validation(
                "User presence not asserted".to_string(),
            ));
        }

        let counter = u32::from_be_bytes([
            auth_data[33],
            auth_data[34],
            auth_data[35],
            auth_data[36],
        ]);

        Ok((auth_data, counter))
    }
}

fn generate_challenge() -> String {
    let mut bytes = [0u8; CHALLENGE_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

fn registration_key(account: &Account) -> String {
    format!("webauthn:reg:{}", account.id)
}

fn authentication_key(account: &Account) -> String {
    format!("webauthn:auth:{}", account.id)
}

fn parse_signature(signature_b64: &str) -> Result<Signature, ServiceError> {
    let bytes = STANDARD
        .decode(signature_b64)
        .map_err(|_| ServiceError::Validation("Invalid signature encoding".to_string()))?;
    Signature::from_slice(&bytes)
        .map_err(|_| ServiceError::Validation("Invalid signature encoding".to_string()))
}

fn parse_public_key(public_key_b64: &str) -> Result<VerifyingKey, ServiceError> {
    let bytes = STANDARD
        .decode(public_key_b64)
        .map_err(|_| ServiceError::Validation("Invalid public key encoding".to_string()))?;
    let bytes: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ServiceError::Validation("Public key must be 32 bytes".to_string()))?;
    VerifyingKey::from_bytes(&bytes)
        .map_err(|_| ServiceError::Validation("Invalid Ed25519 public key".to_string()))
}
