//! Cross-device QR login broker.
//!
//! A desktop client opens a session, renders the provider-supplied QR
//! payload, and polls until the holder approves the flow on their phone.
//! Session state lives only in the ephemeral cache; completion is
//! single-use and consumed atomically, so two racing polls can never both
//! mint tokens.
//!
//! Provider outages are treated as transient: a timeout or 5xx during a
//! poll leaves the session pending. Only an explicit not-found from the
//! provider (or cache expiry) terminates a session.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::audit::AuditService;
use super::cache::EphemeralCache;
use super::error::ServiceError;
use super::token::{TokenPair, TokenService};
use crate::config::QrConfig;
use crate::db::CredentialStore;
use crate::models::{
    Account, AccountResponse, AuditAction, AuditEvent, ExternalClaims, QrAuthSession, QrStatus,
    Severity,
};

/// Flow opened at the external identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderFlow {
    pub flow_token: String,
    pub qr_content: String,
}

/// Outcome of polling the provider for a flow.
#[derive(Debug, Clone)]
pub enum ProviderPoll {
    Pending,
    Completed(ExternalClaims),
    NotFound,
}

/// External identity provider used for cross-device approval.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn create_flow(&self) -> Result<ProviderFlow, anyhow::Error>;

    /// Poll a flow. `Err` means the provider could not be reached and the
    /// flow state is unknown.
    async fn poll_flow(&self, flow_token: &str) -> Result<ProviderPoll, anyhow::Error>;
}

/// HTTP client for the provider's flow API.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ProviderPollBody {
    status: String,
    subject: Option<String>,
    email: Option<String>,
}

impl HttpIdentityProvider {
    pub fn new(config: &QrConfig) -> Result<Self, anyhow::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: config.provider_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn create_flow(&self) -> Result<ProviderFlow, anyhow::Error> {
        let response = self
            .client
            .post(format!("{}/flows", self.base_url))
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    async fn poll_flow(&self, flow_token: &str) -> Result<ProviderPoll, anyhow::Error> {
        let response = self
            .client
            .get(format!("{}/flows/{}", self.base_url, flow_token))
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(ProviderPoll::NotFound);
        }
        let body: ProviderPollBody = response.error_for_status()?.json().await?;

        match body.status.as_str() {
            "completed" => {
                let subject = body
                    .subject
                    .ok_or_else(|| anyhow::anyhow!("Completed flow without subject"))?;
                let email = body
                    .email
                    .ok_or_else(|| anyhow::anyhow!("Completed flow without email"))?;
                Ok(ProviderPoll::Completed(ExternalClaims { subject, email }))
            }
            _ => Ok(ProviderPoll::Pending),
        }
    }
}

/// Session opened for a desktop client.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QrSessionResponse {
    pub session_id: String,
    pub qr_content: String,
    pub poll_interval_ms: u64,
    pub expires_in: i64,
}

/// Poll result for a session.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QrPollResponse {
    pub status: QrStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tokens: Option<TokenPair>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<AccountResponse>,
}

#[derive(Clone)]
pub struct QrLoginService {
    provider: Arc<dyn IdentityProvider>,
    store: Arc<dyn CredentialStore>,
    cache: Arc<dyn EphemeralCache>,
    tokens: TokenService,
    audit: AuditService,
    session_ttl_seconds: i64,
    poll_interval_ms: u64,
}

impl QrLoginService {
    pub fn new(
        config: &QrConfig,
        provider: Arc<dyn IdentityProvider>,
        store: Arc<dyn CredentialStore>,
        cache: Arc<dyn EphemeralCache>,
        tokens: TokenService,
        audit: AuditService,
    ) -> Self {
        Self {
            provider,
            store,
            cache,
            tokens,
            audit,
            session_ttl_seconds: config.session_ttl_seconds,
            poll_interval_ms: config.poll_interval_ms,
        }
    }

    pub async fn create_session(&self, tenant_id: Uuid) -> Result<QrSessionResponse, ServiceError> {
        let flow = self
            .provider
            .create_flow()
            .await
            .map_err(|e| ServiceError::ProviderUnavailable(e.to_string()))?;

        let session = QrAuthSession {
            session_id: Uuid::new_v4().to_string(),
            tenant_id,
            external_token: flow.flow_token,
            status: QrStatus::Pending,
        };
        let session_json = serde_json::to_string(&session)
            .map_err(|e| ServiceError::Internal(anyhow::Error::new(e)))?;
        self.cache
            .set(
                &session_key(&session.session_id),
                &session_json,
                self.session_ttl_seconds,
            )
            .await
            .map_err(ServiceError::Cache)?;

        self.audit.record_async(AuditEvent::new(
            None,
            Some(tenant_id),
            AuditAction::QrSessionCreated,
            "qr_session",
            Severity::Info,
            format!("Cross-device session {} opened", session.session_id),
        ));

        Ok(QrSessionResponse {
            session_id: session.session_id,
            qr_content: flow.qr_content,
            poll_interval_ms: self.poll_interval_ms,
            expires_in: self.session_ttl_seconds,
        })
    }

    /// Poll a session. A completed flow is consumed atomically; the first
    /// caller to observe completion gets the tokens and the session is gone.
    pub async fn poll_session(&self, session_id: &str) -> Result<QrPollResponse, ServiceError> {
        let session_json = self
            .cache
            .get(&session_key(session_id))
            .await
            .map_err(ServiceError::Cache)?
            .ok_or(ServiceError::SessionNotFound)?;
        let session: QrAuthSession = serde_json::from_str(&session_json)
            .map_err(|e| ServiceError::Internal(anyhow::Error::new(e)))?;

        let poll = match self.provider.poll_flow(&session.external_token).await {
            Ok(poll) => poll,
            Err(e) => {
                // Unknown provider state; keep the session alive.
                tracing::warn!(error = %e, session_id, "Identity provider unreachable, session stays pending");
                return Ok(QrPollResponse {
                    status: QrStatus::Pending,
                    tokens: None,
                    account: None,
                });
            }
        };

        match poll {
            ProviderPoll::Pending => Ok(QrPollResponse {
                status: QrStatus::Pending,
                tokens: None,
                account: None,
            }),
            ProviderPoll::NotFound => {
                self.cache
                    .delete(&session_key(session_id))
                    .await
                    .map_err(ServiceError::Cache)?;
                Err(ServiceError::SessionNotFound)
            }
            ProviderPoll::Completed(claims) => {
                // Consume the session; a concurrent poll that lost the race
                // sees a terminal not-found.
                let consumed = self
                    .cache
                    .get_and_delete(&session_key(session_id))
                    .await
                    .map_err(ServiceError::Cache)?;
                if consumed.is_none() {
                    return Err(ServiceError::SessionNotFound);
                }

                let account = self.resolve_account(session.tenant_id, &claims).await?;
                let tokens = self.tokens.issue_pair(&account).await?;

                self.audit.record_async(AuditEvent::new(
                    Some(account.id),
                    Some(account.tenant_id),
                    AuditAction::QrSessionCompleted,
                    "qr_session",
                    Severity::Info,
                    format!("Cross-device session {} completed", session_id),
                ));

                Ok(QrPollResponse {
                    status: QrStatus::Completed,
                    tokens: Some(tokens),
                    account: Some(account.sanitized()),
                })
            }
        }
    }

    /// Map external claims onto a tenant-scoped account, provisioning one
    /// just-in-time when none exists.
    async fn resolve_account(
        &self,
        tenant_id: Uuid,
        claims: &ExternalClaims,
    ) -> Result<Account, ServiceError> {
        let existing = self
            .store
            .find_account_by_email(tenant_id, &claims.email)
            .await
            .map_err(ServiceError::Database)?;

        if let Some(account) = existing {
            if !account.active {
                return Err(ServiceError::AccountInactive);
            }
            return Ok(account);
        }

        let account = Account::provisioned(tenant_id, claims.email.clone(), claims.subject.clone());
        self.store
            .insert_account(&account)
            .await
            .map_err(ServiceError::Database)?;

        self.audit.record_async(AuditEvent::new(
            Some(account.id),
            Some(tenant_id),
            AuditAction::AccountProvisioned,
            "account",
            Severity::Info,
            format!("Account provisioned for external subject {}", claims.subject),
        ));

        Ok(account)
    }
}

fn session_key(session_id: &str) -> String {
    format!("qr:{}", session_id)
}

/// Scripted provider for tests.
#[derive(Default)]
pub struct MockIdentityProvider {
    pub flows: std::sync::Mutex<std::collections::HashMap<String, ProviderPoll>>,
    counter: std::sync::atomic::AtomicU64,
    pub unreachable: std::sync::atomic::AtomicBool,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn complete(&self, flow_token: &str, claims: ExternalClaims) {
        if let Ok(mut flows) = self.flows.lock() {
            flows.insert(flow_token.to_string(), ProviderPoll::Completed(claims));
        }
    }

    pub fn forget(&self, flow_token: &str) {
        if let Ok(mut flows) = self.flows.lock() {
            flows.insert(flow_token.to_string(), ProviderPoll::NotFound);
        }
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable
            .store(unreachable, std::sync::atomic::Ordering::SeqCst);
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn create_flow(&self) -> Result<ProviderFlow, anyhow::Error> {
        if self.unreachable.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("provider unreachable");
        }
        let n = self
            .counter
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let flow_token = format!("flow-{}", n);
        self.flows
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock mutex poisoned: {}", e))?
            .insert(flow_token.clone(), ProviderPoll::Pending);
        Ok(ProviderFlow {
            qr_content: format!("caresync://approve/{}", flow_token),
            flow_token,
        })
    }

    async fn poll_flow(&self, flow_token: &str) -> Result<ProviderPoll, anyhow::Error> {
        if self.unreachable.load(std::sync::atomic::Ordering::SeqCst) {
            anyhow::bail!("provider unreachable");
        }
        let poll = self
            .flows
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock mutex poisoned: {}", e))?
            .get(flow_token)
            .cloned()
            .unwrap_or(ProviderPoll::NotFound);
        Ok(poll)
    }
}
