//! Redis store backend.
//!
//! Wraps `redis::aio::ConnectionManager`, which owns the reconnect policy:
//! capped exponential backoff with a bounded retry count. A lightweight
//! ping supervisor publishes connection transitions on a watch channel so
//! the facade can gate operations and reset its circuit breaker on
//! recovery.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::backend::{ConnectionState, StoreBackend, StoreError};

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Connection settings for [`RedisBackend`].
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://localhost:6379` (credentials optional,
    /// embedded in the URL).
    pub url: String,
    /// How often the supervisor probes the connection.
    pub ping_interval: Duration,
    /// Reconnect attempts before the manager gives up on a request.
    pub max_reconnect_retries: usize,
    /// Base delay factor for reconnect backoff, in milliseconds. Attempt N
    /// waits roughly `N * factor`, capped at `max_retry_delay_ms`.
    pub retry_factor_ms: u64,
    /// Upper bound on the reconnect delay, in milliseconds.
    pub max_retry_delay_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            ping_interval: Duration::from_secs(5),
            max_reconnect_retries: 10,
            retry_factor_ms: 50,
            max_retry_delay_ms: 2000,
        }
    }
}

impl RedisConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }
}

// ============================================================================
// BACKEND
// ============================================================================

/// [`StoreBackend`] over a managed Redis connection.
#[derive(Clone)]
pub struct RedisBackend {
    manager: ConnectionManager,
    connected: Arc<watch::Sender<ConnectionState>>,
}

impl RedisBackend {
    /// Connect to Redis and start the ping supervisor.
    ///
    /// Must be called within a Tokio runtime.
    pub async fn connect(config: RedisConfig) -> Result<Self, StoreError> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| StoreError::io("connect", e.to_string()))?;

        let manager_config = ConnectionManagerConfig::new()
            .set_factor(config.retry_factor_ms)
            .set_max_delay(config.max_retry_delay_ms)
            .set_number_of_retries(config.max_reconnect_retries);

        let manager = ConnectionManager::new_with_config(client, manager_config)
            .await
            .map_err(|e| StoreError::io("connect", e.to_string()))?;

        let (connected, _) = watch::channel(ConnectionState::Connected);
        let backend = Self {
            manager,
            connected: Arc::new(connected),
        };
        backend.spawn_ping_supervisor(config.ping_interval);

        tracing::info!(url = %config.url, "redis backend connected");
        Ok(backend)
    }

    /// Detached task probing the connection and publishing transitions.
    fn spawn_ping_supervisor(&self, period: Duration) {
        let mut con = self.manager.clone();
        let connected = Arc::clone(&self.connected);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;

                let probe: Result<String, redis::RedisError> =
                    redis::cmd("PING").query_async(&mut con).await;
                let state = match probe {
                    Ok(_) => ConnectionState::Connected,
                    Err(_) => ConnectionState::Disconnected,
                };

                let previous = *connected.borrow();
                if previous != state {
                    match state {
                        ConnectionState::Connected => {
                            tracing::info!("redis connection established")
                        }
                        ConnectionState::Disconnected => {
                            tracing::warn!("redis connection lost")
                        }
                    }
                    connected.send_replace(state);
                }
            }
        });
    }
}

#[async_trait]
impl StoreBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut con = self.manager.clone();
        let value: Option<String> = con
            .get(key)
            .await
            .map_err(|e| StoreError::io("get", e.to_string()))?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut con = self.manager.clone();
        // SETEX rejects a zero expiry; clamp to the minimum.
        let seconds = ttl.as_secs().max(1);
        con.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .map_err(|e| StoreError::io("set_ex", e.to_string()))?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        let mut con = self.manager.clone();
        let removed: u64 = con
            .del(keys.to_vec())
            .await
            .map_err(|e| StoreError::io("del", e.to_string()))?;
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut con = self.manager.clone();
        let keys: Vec<String> = con
            .keys(pattern)
            .await
            .map_err(|e| StoreError::io("keys", e.to_string()))?;
        Ok(keys)
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow() == ConnectionState::Connected
    }

    fn connection_events(&self) -> watch::Receiver<ConnectionState> {
        self.connected.subscribe()
    }
}
