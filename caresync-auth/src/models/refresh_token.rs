use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Refresh-token record embedded in the owning account document.
///
/// Only the SHA-256 hash of the opaque token value is persisted; the token
/// itself is returned to the client exactly once.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    pub token_hash: String,
    /// Rotation family. Reuse of a rotated token invalidates every live
    /// record carrying the same family id.
    pub family: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl RefreshTokenRecord {
    /// Create a record for a freshly issued token, starting a new family.
    pub fn new(token: &str, expires_in_days: i64) -> Self {
        Self::with_family(token, Uuid::new_v4(), expires_in_days)
    }

    /// Create a record continuing an existing rotation family.
    pub fn with_family(token: &str, family: Uuid, expires_in_days: i64) -> Self {
        let now = Utc::now();
        Self {
            token_hash: Self::hash_token(token),
            family,
            issued_at: now,
            expires_at: now + Duration::days(expires_in_days),
        }
    }

    /// Hash a token value using SHA-256.
    pub fn hash_token(token: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(token.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_hashes_token_value() {
        let record = RefreshTokenRecord::new("opaque-token-value", 7);
        assert_ne!(record.token_hash, "opaque-token-value");
        assert_eq!(
            record.token_hash,
            RefreshTokenRecord::hash_token("opaque-token-value")
        );
        assert!(!record.is_expired(Utc::now()));
    }

    #[test]
    fn record_expiry() {
        let mut record = RefreshTokenRecord::new("t", 7);
        record.expires_at = Utc::now() - Duration::seconds(1);
        assert!(record.is_expired(Utc::now()));
    }

    #[test]
    fn rotation_preserves_family() {
        let first = RefreshTokenRecord::new("t1", 7);
        let second = RefreshTokenRecord::with_family("t2", first.family, 7);
        assert_eq!(first.family, second.family);
        assert_ne!(first.token_hash, second.token_hash);
    }
}
