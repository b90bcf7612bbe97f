use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};

/// Ephemeral key-value collaborator holding revocation markers, ceremony
/// challenges, cross-device sessions and password-reset tokens. Every entry
/// carries a TTL; expiry equals deletion.
#[async_trait]
pub trait EphemeralCache: Send + Sync {
    async fn set(&self, key: &str, value: &str, expiry_seconds: i64) -> Result<(), anyhow::Error>;

    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error>;

    /// Atomically fetch and delete a key. Single-use artifacts (challenges,
    /// completed sessions, reset tokens) are consumed through this so that
    /// two concurrent callers can never both observe the value.
    async fn get_and_delete(&self, key: &str) -> Result<Option<String>, anyhow::Error>;

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct RedisCache {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisCache {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %config.url, "Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        // ConnectionManager reconnects automatically
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl EphemeralCache for RedisCache {
    async fn set(&self, key: &str, value: &str, expiry_seconds: i64) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(expiry_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to set cache key: {}", e))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get cache key: {}", e))
    }

    async fn get_and_delete(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to consume cache key: {}", e))
    }

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete cache key: {}", e))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

/// In-memory cache for tests. TTLs are not tracked; a test expires entries
/// explicitly via [`MemoryCache::expire`].
#[derive(Default)]
pub struct MemoryCache {
    entries: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop a key as if its TTL had elapsed.
    pub fn expire(&self, key: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.remove(key);
        }
    }
}

#[async_trait]
impl EphemeralCache for MemoryCache {
    async fn set(
        &self,
        key: &str,
        value: &str,
        _expiry_seconds: i64,
    ) -> Result<(), anyhow::Error> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Cache mutex poisoned: {}", e))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let val = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Cache mutex poisoned: {}", e))?
            .get(key)
            .cloned();
        Ok(val)
    }

    async fn get_and_delete(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let val = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Cache mutex poisoned: {}", e))?
            .remove(key);
        Ok(val)
    }

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Cache mutex poisoned: {}", e))?
            .remove(key);
        Ok(())
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
