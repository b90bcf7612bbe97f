//! Outbound email seam for password-reset delivery.

use async_trait::async_trait;

#[async_trait]
pub trait EmailProvider: Send + Sync {
    async fn send_password_reset(&self, email: &str, reset_token: &str)
        -> Result<(), anyhow::Error>;
}

/// Development provider: logs instead of sending. The token itself is never
/// logged.
pub struct LoggingEmailService;

#[async_trait]
impl EmailProvider for LoggingEmailService {
    async fn send_password_reset(
        &self,
        email: &str,
        _reset_token: &str,
    ) -> Result<(), anyhow::Error> {
        tracing::info!(email = %email, "Password reset email dispatched");
        Ok(())
    }
}

/// Test provider retaining sent messages for assertions.
#[derive(Default)]
pub struct MockEmailService {
    pub sent: std::sync::Mutex<Vec<(String, String)>>,
}

impl MockEmailService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_token_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .ok()?
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, token)| token.clone())
    }
}

#[async_trait]
impl EmailProvider for MockEmailService {
    async fn send_password_reset(
        &self,
        email: &str,
        reset_token: &str,
    ) -> Result<(), anyhow::Error> {
        self.sent
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock email mutex poisoned: {}", e))?
            .push((email.to_string(), reset_token.to_string()));
        Ok(())
    }
}
