//! Shared test harness: every service wired against in-memory fakes.

#![allow(dead_code)]

use std::sync::Arc;

use caresync_auth::config::{JwtConfig, QrConfig, SecurityConfig, TotpConfig, WebAuthnConfig};
use caresync_auth::db::{CredentialStore, MemoryStore};
use caresync_auth::dtos::RegisterRequest;
use caresync_auth::models::{Account, AuditAction, Role};
use caresync_auth::services::{
    AuditService, AuthService, EphemeralCache, LockoutService, MemoryAuditSink, MemoryCache,
    MfaService, MockEmailService, MockIdentityProvider, QrLoginService, TenantGuard, TokenService,
    WebAuthnService,
};
use uuid::Uuid;

pub const TEST_ORIGIN: &str = "http://localhost:3000";
pub const TEST_RP_ID: &str = "localhost";

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub cache: Arc<MemoryCache>,
    pub audit_sink: Arc<MemoryAuditSink>,
    pub email: Arc<MockEmailService>,
    pub provider: Arc<MockIdentityProvider>,
    pub tokens: TokenService,
    pub lockout: LockoutService,
    pub mfa: MfaService,
    pub webauthn: WebAuthnService,
    pub qr: QrLoginService,
    pub auth: AuthService,
    pub guard: TenantGuard,
}

pub fn jwt_config() -> JwtConfig {
    JwtConfig {
        secret: "test-secret-test-secret-test-secret".to_string(),
        access_token_expiry_minutes: 15,
        refresh_token_expiry_days: 7,
    }
}

pub fn security_config() -> SecurityConfig {
    SecurityConfig {
        allowed_origins: vec![TEST_ORIGIN.to_string()],
        lockout_max_attempts: 5,
        lockout_minutes: 30,
    }
}

pub fn totp_config() -> TotpConfig {
    TotpConfig {
        issuer: "CareSync".to_string(),
        digits: 6,
        step_seconds: 30,
        skew_steps: 1,
    }
}

pub fn webauthn_config() -> WebAuthnConfig {
    WebAuthnConfig {
        rp_id: TEST_RP_ID.to_string(),
        rp_name: "CareSync".to_string(),
        origin: TEST_ORIGIN.to_string(),
        challenge_ttl_seconds: 300,
    }
}

pub fn qr_config() -> QrConfig {
    QrConfig {
        provider_base_url: "http://localhost:9100".to_string(),
        session_ttl_seconds: 300,
        poll_interval_ms: 2000,
        provider_timeout_seconds: 5,
    }
}

pub fn harness() -> Harness {
    harness_with_jwt(jwt_config())
}

pub fn harness_with_jwt(jwt: JwtConfig) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let cache = Arc::new(MemoryCache::new());
    let audit_sink = Arc::new(MemoryAuditSink::new());
    let email = Arc::new(MockEmailService::new());
    let provider = Arc::new(MockIdentityProvider::new());

    let store_dyn: Arc<dyn CredentialStore> = store.clone();
    let cache_dyn: Arc<dyn EphemeralCache> = cache.clone();
    let audit = AuditService::new(audit_sink.clone());

    let tokens = TokenService::new(&jwt, store_dyn.clone(), cache_dyn.clone(), audit.clone());
    let lockout = LockoutService::new(&security_config(), store_dyn.clone(), audit.clone());
    let mfa = MfaService::new(&totp_config(), store_dyn.clone(), audit.clone());
    let webauthn = WebAuthnService::new(
        &webauthn_config(),
        store_dyn.clone(),
        cache_dyn.clone(),
        audit.clone(),
    );
    let qr = QrLoginService::new(
        &qr_config(),
        provider.clone(),
        store_dyn.clone(),
        cache_dyn.clone(),
        tokens.clone(),
        audit.clone(),
    );
    let auth = AuthService::new(
        store_dyn,
        cache_dyn,
        tokens.clone(),
        lockout.clone(),
        mfa.clone(),
        email.clone(),
        audit.clone(),
    );
    let guard = TenantGuard::new(audit);

    Harness {
        store,
        cache,
        audit_sink,
        email,
        provider,
        tokens,
        lockout,
        mfa,
        webauthn,
        qr,
        auth,
        guard,
    }
}

impl Harness {
    pub async fn register_account(
        &self,
        tenant_id: Uuid,
        email: &str,
        password: &str,
        role: Role,
    ) -> Account {
        self.auth
            .register(RegisterRequest {
                tenant_id,
                email: email.to_string(),
                password: password.to_string(),
                display_name: None,
                role: Some(role),
                permissions: vec![],
            })
            .await
            .expect("registration failed")
    }

    pub async fn reload(&self, account: &Account) -> Account {
        self.store
            .find_account_by_id(account.id)
            .await
            .expect("store error")
            .expect("account vanished")
    }

    pub fn audit_actions(&self) -> Vec<AuditAction> {
        self.audit_sink
            .recorded()
            .into_iter()
            .map(|e| e.action)
            .collect()
    }

    /// Audit writes from the happy path are fire-and-forget; yield so the
    /// spawned tasks run before asserting on the trail.
    pub async fn settle_audit(&self) {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }
}
