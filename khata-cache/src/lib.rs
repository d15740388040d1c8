//! Khata Cache - Resilient Store Facade
//!
//! This crate wraps a remote key/value store (Redis semantics) with the
//! reliability guards the back office depends on:
//!
//! - A circuit breaker around every store operation, so a failing store
//!   degrades to fast, fail-soft no-ops instead of amplifying latency.
//! - Single-flight de-duplication (`get_or_fetch`), so concurrent cache
//!   misses for the same key trigger at most one upstream fetch.
//! - Fail-soft semantics throughout: cache unavailability must never fail
//!   the request path it exists to optimize.
//!
//! The store itself is abstracted behind [`StoreBackend`]; production uses
//! [`RedisBackend`], tests and cache-less development use
//! [`InMemoryBackend`].

pub mod backend;
pub mod breaker;
pub mod facade;
pub mod memory;
pub mod redis_backend;

pub use backend::{ConnectionState, StoreBackend, StoreError};
pub use breaker::{
    BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker, DEFAULT_FAILURE_THRESHOLD,
    DEFAULT_OPEN_TIMEOUT,
};
pub use facade::{CacheConfig, CacheFacade, CacheMetricsSnapshot, FetchError};
pub use memory::InMemoryBackend;
pub use redis_backend::{RedisBackend, RedisConfig};
