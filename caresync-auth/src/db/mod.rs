//! Credential store - durable record of accounts, hardware credentials and
//! embedded refresh-token lists.
//!
//! The store contract requires atomic compare-and-swap semantics on the
//! refresh-token list and the lockout counters; both backends below provide
//! them (MongoDB via single-document update operators, the in-memory store
//! via per-entry locking).

mod memory;
mod mongo;

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Account, HardwareCredential, RefreshTokenRecord};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_account_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<Account>, anyhow::Error>;

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, anyhow::Error>;

    async fn insert_account(&self, account: &Account) -> Result<(), anyhow::Error>;

    /// Append a refresh-token record, lazily pruning expired entries.
    async fn push_refresh_token(
        &self,
        account_id: Uuid,
        record: RefreshTokenRecord,
    ) -> Result<(), anyhow::Error>;

    /// Atomically remove the record matching `token_hash` and return the
    /// owning account together with the removed record. A concurrent call
    /// with the same hash observes `None`; this is the replay defense for
    /// refresh rotation.
    async fn take_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<(Account, RefreshTokenRecord)>, anyhow::Error>;

    /// Remove a single refresh-token record (logout). Returns whether a
    /// record was removed.
    async fn remove_refresh_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
    ) -> Result<bool, anyhow::Error>;

    /// Drop every live record in a rotation family (token-theft response).
    async fn clear_refresh_family(
        &self,
        account_id: Uuid,
        family: Uuid,
    ) -> Result<(), anyhow::Error>;

    /// Drop all refresh tokens for an account (password reset).
    async fn clear_all_refresh_tokens(&self, account_id: Uuid) -> Result<(), anyhow::Error>;

    /// Atomically increment the failed-login counter, returning the new
    /// count. Must never under-count due to lost updates.
    async fn increment_failed_logins(&self, account_id: Uuid) -> Result<u32, anyhow::Error>;

    async fn set_lockout(
        &self,
        account_id: Uuid,
        until: DateTime<Utc>,
    ) -> Result<(), anyhow::Error>;

    /// Reset the failed-login counter and clear any lockout.
    async fn reset_lockout(&self, account_id: Uuid) -> Result<(), anyhow::Error>;

    async fn set_password_hash(
        &self,
        account_id: Uuid,
        password_hash: &str,
    ) -> Result<(), anyhow::Error>;

    async fn set_mfa(
        &self,
        account_id: Uuid,
        secret: Option<String>,
        enabled: bool,
    ) -> Result<(), anyhow::Error>;

    async fn add_credential(&self, credential: &HardwareCredential) -> Result<(), anyhow::Error>;

    async fn find_credential(
        &self,
        credential_id: &str,
    ) -> Result<Option<HardwareCredential>, anyhow::Error>;

    async fn credentials_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<HardwareCredential>, anyhow::Error>;

    async fn update_sign_counter(
        &self,
        credential_id: &str,
        sign_counter: u32,
    ) -> Result<(), anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}
