//! Backing store contract.
//!
//! The facade consumes the store through this trait so the reliability layer
//! is independent of the concrete client. Implementations: [`RedisBackend`]
//! for production, [`InMemoryBackend`] for tests and cache-less development.
//!
//! [`RedisBackend`]: crate::redis_backend::RedisBackend
//! [`InMemoryBackend`]: crate::memory::InMemoryBackend

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

// ============================================================================
// ERRORS
// ============================================================================

/// Errors surfaced by store backends.
///
/// These never escape the facade: every public cache operation converts them
/// into a fail-soft return value after recording them on the circuit breaker.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The underlying client reported an I/O or protocol failure.
    #[error("store {operation} failed: {reason}")]
    Io {
        operation: &'static str,
        reason: String,
    },

    /// The connection is known to be down (reconnect attempts exhausted or
    /// still in progress).
    #[error("store connection is down")]
    Disconnected,
}

impl StoreError {
    pub fn io(operation: &'static str, reason: impl Into<String>) -> Self {
        StoreError::Io {
            operation,
            reason: reason.into(),
        }
    }
}

// ============================================================================
// CONNECTION STATE
// ============================================================================

/// Connection lifecycle state, published on a watch channel.
///
/// The facade subscribes to these transitions: a Disconnected -> Connected
/// edge forces the circuit breaker closed, recovering from an outage faster
/// than the open-timeout probe would.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Disconnected,
}

// ============================================================================
// BACKEND TRAIT
// ============================================================================

/// Remote key/value store operations consumed by the facade.
///
/// Semantics follow the Redis commands they map to: `GET`, `SETEX`, `DEL`,
/// `KEYS`. Values are opaque strings; the facade owns JSON encoding.
#[async_trait]
pub trait StoreBackend: Send + Sync + 'static {
    /// Fetch a value. `Ok(None)` means the key is absent.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store a value with an expiry.
    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError>;

    /// Delete keys, returning the number removed.
    async fn del(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// List keys matching a glob pattern.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Whether the connection is currently believed healthy.
    fn is_connected(&self) -> bool;

    /// Subscribe to connection lifecycle transitions.
    fn connection_events(&self) -> watch::Receiver<ConnectionState>;
}
