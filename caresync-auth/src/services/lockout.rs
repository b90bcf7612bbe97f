//! Lockout guard - consecutive-failure counting with a timed lockout window.
//!
//! The counter lives on the account document and is incremented through an
//! atomic store operation, so concurrent failed attempts cannot under-count.

use std::sync::Arc;

use chrono::{Duration, Utc};

use super::audit::AuditService;
use super::error::ServiceError;
use crate::config::SecurityConfig;
use crate::db::CredentialStore;
use crate::models::{Account, AuditEvent};

#[derive(Clone)]
pub struct LockoutService {
    max_attempts: u32,
    lockout_minutes: i64,
    store: Arc<dyn CredentialStore>,
    audit: AuditService,
}

impl LockoutService {
    pub fn new(
        config: &SecurityConfig,
        store: Arc<dyn CredentialStore>,
        audit: AuditService,
    ) -> Self {
        Self {
            max_attempts: config.lockout_max_attempts,
            lockout_minutes: config.lockout_minutes,
            store,
            audit,
        }
    }

    /// Refuse the attempt while a lockout window is open. The caller gets a
    /// retry hint; no credential verification happens behind this gate.
    ///
    /// An expired window clears the counter, so the holder starts over with
    /// a full allowance rather than re-locking on the next slip.
    pub async fn check(&self, account: &Account) -> Result<(), ServiceError> {
        let now = Utc::now();
        if let Some(until) = account.lockout_until {
            if until > now {
                let retry_after_seconds = (until - now).num_seconds().max(1) as u64;
                return Err(ServiceError::AccountLocked {
                    retry_after_seconds,
                });
            }
            self.store
                .reset_lockout(account.id)
                .await
                .map_err(ServiceError::Database)?;
        }
        Ok(())
    }

    /// Count a failed attempt; open the lockout window when the threshold is
    /// reached. Returns the updated attempt count.
    pub async fn record_failure(&self, account: &Account) -> Result<u32, ServiceError> {
        let attempts = self
            .store
            .increment_failed_logins(account.id)
            .await
            .map_err(ServiceError::Database)?;

        if attempts >= self.max_attempts {
            let until = Utc::now() + Duration::minutes(self.lockout_minutes);
            self.store
                .set_lockout(account.id, until)
                .await
                .map_err(ServiceError::Database)?;

            self.audit
                .record(AuditEvent::lockout(account.id, account.tenant_id, attempts))
                .await;
        }

        Ok(attempts)
    }

    /// Clear the counter and any open window after a fully successful
    /// authentication (all factors).
    pub async fn record_success(&self, account: &Account) -> Result<(), ServiceError> {
        if account.failed_login_attempts > 0 || account.lockout_until.is_some() {
            self.store
                .reset_lockout(account.id)
                .await
                .map_err(ServiceError::Database)?;
        }
        Ok(())
    }
}
