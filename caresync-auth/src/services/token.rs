//! Token service - short-lived JWT access tokens paired with opaque,
//! rotating refresh tokens.
//!
//! Access tokens are HS256 JWTs and are verified statelessly except for a
//! revocation check against the ephemeral cache. Refresh tokens are opaque
//! random values; only their SHA-256 hash is persisted, embedded in the
//! owning account document. Every refresh consumes the presented token and
//! issues a replacement in the same rotation family. Presenting an
//! already-consumed token burns the whole family.

use std::sync::Arc;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::audit::AuditService;
use super::cache::EphemeralCache;
use super::error::ServiceError;
use crate::config::JwtConfig;
use crate::db::CredentialStore;
use crate::models::{Account, AuditAction, AuditEvent, RefreshTokenRecord, Role, Severity};

/// Claims carried by access tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    /// Account id
    pub sub: String,
    pub tenant_id: String,
    pub role: Role,
    pub permissions: Vec<String>,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Token id, used as the revocation-set key
    pub jti: String,
}

/// Token pair returned to the client.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

/// Marker left behind after a successful rotation so a replayed token can be
/// traced back to its family.
#[derive(Debug, Serialize, Deserialize)]
struct RotationMarker {
    account_id: Uuid,
    family: Uuid,
}

#[derive(Clone)]
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
    store: Arc<dyn CredentialStore>,
    cache: Arc<dyn EphemeralCache>,
    audit: AuditService,
}

impl TokenService {
    pub fn new(
        config: &JwtConfig,
        store: Arc<dyn CredentialStore>,
        cache: Arc<dyn EphemeralCache>,
        audit: AuditService,
    ) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
            store,
            cache,
            audit,
        }
    }

    /// Issue a fresh access/refresh pair, starting a new rotation family.
    pub async fn issue_pair(&self, account: &Account) -> Result<TokenPair, ServiceError> {
        self.issue_pair_in_family(account, Uuid::new_v4()).await
    }

    async fn issue_pair_in_family(
        &self,
        account: &Account,
        family: Uuid,
    ) -> Result<TokenPair, ServiceError> {
        let access_token = self.generate_access_token(account)?;
        let refresh_token = generate_opaque_token();

        let record = RefreshTokenRecord::with_family(
            &refresh_token,
            family,
            self.refresh_token_expiry_days,
        );
        self.store
            .push_refresh_token(account.id, record)
            .await
            .map_err(ServiceError::Database)?;

        self.audit.record_async(AuditEvent::new(
            Some(account.id),
            Some(account.tenant_id),
            AuditAction::TokenIssued,
            "token",
            Severity::Info,
            "Access/refresh pair issued",
        ));

        Ok(TokenPair {
            access_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: self.access_token_expiry_minutes * 60,
        })
    }

    fn generate_access_token(&self, account: &Account) -> Result<String, ServiceError> {
        let now = Utc::now();
        let exp = now + Duration::minutes(self.access_token_expiry_minutes);

        let claims = AccessTokenClaims {
            sub: account.id.to_string(),
            tenant_id: account.tenant_id.to_string(),
            role: account.role,
            permissions: account.permissions.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        let header = Header::new(Algorithm::HS256);
        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("Failed to encode token: {}", e)))
    }

    /// Validate an access token: signature, expiry, then the revocation set.
    pub async fn verify_access(&self, token: &str) -> Result<AccessTokenClaims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;

        let data =
            decode::<AccessTokenClaims>(token, &self.decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    jsonwebtoken::errors::ErrorKind::ExpiredSignature => ServiceError::TokenExpired,
                    _ => ServiceError::TokenInvalid,
                }
            })?;

        let revoked = self
            .cache
            .get(&revocation_key(&data.claims.jti))
            .await
            .map_err(ServiceError::Cache)?;
        if revoked.is_some() {
            return Err(ServiceError::TokenRevoked);
        }

        Ok(data.claims)
    }

    /// Rotate a refresh token: consume the presented token, issue a
    /// replacement in the same family.
    ///
    /// A token that is absent from the store but carries a rotation marker
    /// was already consumed; that is the replay signal, and every live token
    /// in its family is invalidated before the caller is refused.
    pub async fn rotate_refresh(
        &self,
        refresh_token: &str,
    ) -> Result<(Account, TokenPair), ServiceError> {
        let token_hash = RefreshTokenRecord::hash_token(refresh_token);

        let taken = self
            .store
            .take_refresh_token(&token_hash)
            .await
            .map_err(ServiceError::Database)?;

        let (account, record) = match taken {
            Some(pair) => pair,
            None => return self.handle_reuse(&token_hash).await,
        };

        // A record past its own expiry is refused as invalid.
        if record.is_expired(Utc::now()) {
            return Err(ServiceError::TokenInvalid);
        }
        if !account.active {
            return Err(ServiceError::AccountInactive);
        }

        // Leave a marker so a later replay of this hash can be attributed.
        let marker = RotationMarker {
            account_id: account.id,
            family: record.family,
        };
        let marker_json = serde_json::to_string(&marker)
            .map_err(|e| ServiceError::Internal(anyhow::Error::new(e)))?;
        self.cache
            .set(
                &rotation_marker_key(&token_hash),
                &marker_json,
                self.refresh_token_expiry_days * 86_400,
            )
            .await
            .map_err(ServiceError::Cache)?;

        let pair = self.issue_pair_in_family(&account, record.family).await?;

        self.audit.record_async(AuditEvent::new(
            Some(account.id),
            Some(account.tenant_id),
            AuditAction::TokenRefreshed,
            "token",
            Severity::Info,
            "Refresh token rotated",
        ));

        Ok((account, pair))
    }

    async fn handle_reuse(&self, token_hash: &str) -> Result<(Account, TokenPair), ServiceError> {
        let marker = self
            .cache
            .get(&rotation_marker_key(token_hash))
            .await
            .map_err(ServiceError::Cache)?;

        let Some(marker_json) = marker else {
            // Unknown token: expired, pruned or simply never issued.
            return Err(ServiceError::TokenInvalid);
        };

        let marker: RotationMarker = serde_json::from_str(&marker_json)
            .map_err(|e| ServiceError::Internal(anyhow::Error::new(e)))?;

        self.store
            .clear_refresh_family(marker.account_id, marker.family)
            .await
            .map_err(ServiceError::Database)?;

        self.audit
            .record(AuditEvent::new(
                Some(marker.account_id),
                None,
                AuditAction::TokenReuseDetected,
                "token",
                Severity::High,
                format!(
                    "Rotated refresh token replayed; family {} invalidated",
                    marker.family
                ),
            ))
            .await;

        Err(ServiceError::TokenInvalid)
    }

    /// Add an access token to the revocation set for its remaining lifetime.
    pub async fn revoke_access(&self, claims: &AccessTokenClaims) -> Result<(), ServiceError> {
        let remaining = claims.exp - Utc::now().timestamp();
        if remaining <= 0 {
            return Ok(());
        }
        self.cache
            .set(&revocation_key(&claims.jti), "revoked", remaining)
            .await
            .map_err(ServiceError::Cache)
    }

    /// Remove a single refresh token (logout). Unknown tokens are ignored;
    /// logout is idempotent.
    pub async fn revoke_refresh(
        &self,
        account_id: Uuid,
        refresh_token: &str,
    ) -> Result<(), ServiceError> {
        let token_hash = RefreshTokenRecord::hash_token(refresh_token);
        self.store
            .remove_refresh_token(account_id, &token_hash)
            .await
            .map_err(ServiceError::Database)?;
        Ok(())
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }
}

fn generate_opaque_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn revocation_key(jti: &str) -> String {
    format!("revoked:{}", jti)
}

fn rotation_marker_key(token_hash: &str) -> String {
    format!("rotated:{}", token_hash)
}
