//! Shared key-value state: the token denylist and login-attempt counters.
//! Both are TTL-bound, so Redis carries them in production; an in-memory
//! variant backs the tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};

#[async_trait]
pub trait SharedKv: Send + Sync {
    /// Mark a token id as revoked until its natural expiry.
    async fn deny_token(&self, token_jti: &str, expiry_seconds: i64) -> Result<(), anyhow::Error>;

    async fn is_token_denied(&self, token_jti: &str) -> Result<bool, anyhow::Error>;

    /// Increment a windowed counter and return the new count. The window
    /// starts at the first increment and is not extended by later ones.
    async fn incr_counter(&self, key: &str, window_seconds: i64) -> Result<u64, anyhow::Error>;

    async fn reset_counter(&self, key: &str) -> Result<(), anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct RedisKv {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisKv {
    pub async fn new(url: &str) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %url, "Connecting to Redis");
        let client = Client::open(url.to_string())?;

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
impl SharedKv for RedisKv {
    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }

    async fn deny_token(&self, token_jti: &str, expiry_seconds: i64) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        let key = format!("denylist:{}", token_jti);

        redis::cmd("SET")
            .arg(&key)
            .arg("revoked")
            .arg("EX")
            .arg(expiry_seconds.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to deny token: {}", e))
    }

    async fn is_token_denied(&self, token_jti: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        let key = format!("denylist:{}", token_jti);

        let exists: bool = redis::cmd("EXISTS")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to check denylist: {}", e))?;

        Ok(exists)
    }

    async fn incr_counter(&self, key: &str, window_seconds: i64) -> Result<u64, anyhow::Error> {
        let mut conn = self.manager.clone();
        let key = format!("counter:{}", key);

        let count: u64 = redis::cmd("INCR")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to increment counter: {}", e))?;

        // Only the first increment sets the window
        if count == 1 {
            redis::cmd("EXPIRE")
                .arg(&key)
                .arg(window_seconds)
                .query_async::<_, ()>(&mut conn)
                .await
                .map_err(|e| anyhow::anyhow!("Failed to set counter expiry: {}", e))?;
        }

        Ok(count)
    }

    async fn reset_counter(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        let key = format!("counter:{}", key);

        redis::cmd("DEL")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to reset counter: {}", e))
    }
}

/// In-process stand-in for Redis, used by tests and local runs without a
/// Redis instance.
pub struct MemoryKv {
    denied: Mutex<HashMap<String, Instant>>,
    counters: Mutex<HashMap<String, (u64, Instant)>>,
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKv {
    pub fn new() -> Self {
        Self {
            denied: Mutex::new(HashMap::new()),
            counters: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl SharedKv for MemoryKv {
    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }

    async fn deny_token(&self, token_jti: &str, expiry_seconds: i64) -> Result<(), anyhow::Error> {
        let expires = Instant::now() + Duration::from_secs(expiry_seconds.max(1) as u64);
        self.denied
            .lock()
            .map_err(|e| anyhow::anyhow!("Denylist mutex poisoned: {}", e))?
            .insert(token_jti.to_string(), expires);
        Ok(())
    }

    async fn is_token_denied(&self, token_jti: &str) -> Result<bool, anyhow::Error> {
        let denied = self
            .denied
            .lock()
            .map_err(|e| anyhow::anyhow!("Denylist mutex poisoned: {}", e))?
            .get(token_jti)
            .is_some_and(|expires| *expires > Instant::now());
        Ok(denied)
    }

    async fn incr_counter(&self, key: &str, window_seconds: i64) -> Result<u64, anyhow::Error> {
        let mut counters = self
            .counters
            .lock()
            .map_err(|e| anyhow::anyhow!("Counter mutex poisoned: {}", e))?;

        let now = Instant::now();
        let entry = counters
            .entry(key.to_string())
            .and_modify(|(count, expires)| {
                if *expires <= now {
                    *count = 0;
                    *expires = now + Duration::from_secs(window_seconds.max(1) as u64);
                }
                *count += 1;
            })
            .or_insert((1, now + Duration::from_secs(window_seconds.max(1) as u64)));

        Ok(entry.0)
    }

    async fn reset_counter(&self, key: &str) -> Result<(), anyhow::Error> {
        self.counters
            .lock()
            .map_err(|e| anyhow::anyhow!("Counter mutex poisoned: {}", e))?
            .remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_denied_token_is_visible_until_expiry() {
        let kv = MemoryKv::new();
        assert!(!kv.is_token_denied("jti-1").await.unwrap());
        kv.deny_token("jti-1", 60).await.unwrap();
        assert!(kv.is_token_denied("jti-1").await.unwrap());
        assert!(!kv.is_token_denied("jti-2").await.unwrap());
    }

    #[tokio::test]
    async fn test_counter_increments_and_resets() {
        let kv = MemoryKv::new();
        assert_eq!(kv.incr_counter("login:alice", 300).await.unwrap(), 1);
        assert_eq!(kv.incr_counter("login:alice", 300).await.unwrap(), 2);
        assert_eq!(kv.incr_counter("login:bob", 300).await.unwrap(), 1);

        kv.reset_counter("login:alice").await.unwrap();
        assert_eq!(kv.incr_counter("login:alice", 300).await.unwrap(), 1);
    }
}
