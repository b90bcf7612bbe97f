//! Hardware credential model - WebAuthn registered authenticators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered hardware/platform authenticator credential.
///
/// The signature counter must increase strictly on every successful
/// assertion; a non-increasing counter signals a cloned authenticator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HardwareCredential {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub account_id: Uuid,
    /// Credential identifier reported by the authenticator (base64url).
    pub credential_id: String,
    /// Ed25519 public key (base64, 32 bytes).
    pub public_key: String,
    pub sign_counter: u32,
    pub transports: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl HardwareCredential {
    pub fn new(
        account_id: Uuid,
        credential_id: String,
        public_key: String,
        sign_counter: u32,
        transports: Vec<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            credential_id,
            public_key,
            sign_counter,
            transports,
            created_at: Utc::now(),
        }
    }
}
