use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use super::CredentialStore;
use crate::models::{Account, HardwareCredential, RefreshTokenRecord};

/// In-memory credential store used by tests and local development.
///
/// DashMap entry guards hold the shard lock for the duration of each
/// mutation, which gives the same per-account atomicity the MongoDB backend
/// gets from single-document updates.
#[derive(Default)]
pub struct MemoryStore {
    accounts: DashMap<Uuid, Account>,
    credentials: DashMap<String, HardwareCredential>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn find_account_by_email(
        &self,
        tenant_id: Uuid,
        email: &str,
    ) -> Result<Option<Account>, anyhow::Error> {
        Ok(self
            .accounts
            .iter()
            .find(|a| a.tenant_id == tenant_id && a.email == email)
            .map(|a| a.clone()))
    }

    async fn find_account_by_id(&self, id: Uuid) -> Result<Option<Account>, anyhow::Error> {
        Ok(self.accounts.get(&id).map(|a| a.clone()))
    }

    async fn insert_account(&self, account: &Account) -> Result<(), anyhow::Error> {
        if self
            .accounts
            .iter()
            .any(|a| a.tenant_id == account.tenant_id && a.email == account.email)
        {
            anyhow::bail!("duplicate (tenant, email) pair");
        }
        self.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn push_refresh_token(
        &self,
        account_id: Uuid,
        record: RefreshTokenRecord,
    ) -> Result<(), anyhow::Error> {
        let mut account = self
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| anyhow::anyhow!("Account not found: {}", account_id))?;
        let now = Utc::now();
        account.refresh_tokens.retain(|r| !r.is_expired(now));
        account.refresh_tokens.push(record);
        Ok(())
    }

    async fn take_refresh_token(
        &self,
        token_hash: &str,
    ) -> Result<Option<(Account, RefreshTokenRecord)>, anyhow::Error> {
        for mut account in self.accounts.iter_mut() {
            if let Some(pos) = account
                .refresh_tokens
                .iter()
                .position(|r| r.token_hash == token_hash)
            {
                let record = account.refresh_tokens.remove(pos);
                return Ok(Some((account.clone(), record)));
            }
        }
        Ok(None)
    }

    async fn remove_refresh_token(
        &self,
        account_id: Uuid,
        token_hash: &str,
    ) -> Result<bool, anyhow::Error> {
        let mut account = match self.accounts.get_mut(&account_id) {
            Some(account) => account,
            None => return Ok(false),
        };
        let before = account.refresh_tokens.len();
        account.refresh_tokens.retain(|r| r.token_hash != token_hash);
        Ok(account.refresh_tokens.len() < before)
    }

    async fn clear_refresh_family(
        &self,
        account_id: Uuid,
        family: Uuid,
    ) -> Result<(), anyhow::Error> {
        if let Some(mut account) = self.accounts.get_mut(&account_id) {
            account.refresh_tokens.retain(|r| r.family != family);
        }
        Ok(())
    }

    async fn clear_all_refresh_tokens(&self, account_id: Uuid) -> Result<(), anyhow::Error> {
        if let Some(mut account) = self.accounts.get_mut(&account_id) {
            account.refresh_tokens.clear();
        }
        Ok(())
    }

    async fn increment_failed_logins(&self, account_id: Uuid) -> Result<u32, anyhow::Error> {
        let mut account = self
            .accounts
            .get_mut(&account_id)
            .ok_or_else(|| anyhow::anyhow!("Account not found: {}", account_id))?;
        account.failed_login_attempts += 1;
        Ok(account.failed_login_attempts)
    }

    async fn set_lockout(
        &self,
        account_id: Uuid,
        until: DateTime<Utc>,
    ) -> Result<(), anyhow::Error> {
        if let Some(mut account) = self.accounts.get_mut(&account_id) {
            account.lockout_until = Some(until);
        }
        Ok(())
    }

    async fn reset_lockout(&self, account_id: Uuid) -> Result<(), anyhow::Error> {
        if let Some(mut account) = self.accounts.get_mut(&account_id) {
            account.failed_login_attempts = 0;
            account.lockout_until = None;
        }
        Ok(())
    }

    async fn set_password_hash(
        &self,
        account_id: Uuid,
        password_hash: &str,
    ) -> Result<(), anyhow::Error> {
        if let Some(mut account) = self.accounts.get_mut(&account_id) {
            account.password_hash = password_hash.to_string();
            account.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn set_mfa(
        &self,
        account_id: Uuid,
        secret: Option<String>,
        enabled: bool,
    ) -> Result<(), anyhow::Error> {
        if let Some(mut account) = self.accounts.get_mut(&account_id) {
            account.mfa_secret = secret;
            account.mfa_enabled = enabled;
            account.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn add_credential(&self, credential: &HardwareCredential) -> Result<(), anyhow::Error> {
        if self.credentials.contains_key(&credential.credential_id) {
            anyhow::bail!("credential already registered");
        }
        self.credentials
            .insert(credential.credential_id.clone(), credential.clone());
        Ok(())
    }

    async fn find_credential(
        &self,
        credential_id: &str,
    ) -> Result<Option<HardwareCredential>, anyhow::Error> {
        Ok(self.credentials.get(credential_id).map(|c| c.clone()))
    }

    async fn credentials_for_account(
        &self,
        account_id: Uuid,
    ) -> Result<Vec<HardwareCredential>, anyhow::Error> {
        Ok(self
            .credentials
            .iter()
            .filter(|c| c.account_id == account_id)
            .map(|c| c.clone())
            .collect())
    }

    async fn update_sign_counter(
        &self,
        credential_id: &str,
        sign_counter: u32,
    ) -> Result<(), anyhow::Error> {
        if let Some(mut credential) = self.credentials.get_mut(credential_id) {
            credential.sign_counter = sign_counter;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
