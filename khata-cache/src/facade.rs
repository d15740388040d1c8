//! Resilient cache facade.
//!
//! Every store operation is routed through the circuit breaker; nothing
//! bypasses it. All public operations are fail-soft: a transient store
//! failure degrades to `None`/`false` instead of an error, because cache
//! unavailability must never fail the request path it is optimizing.
//!
//! `get_or_fetch` adds stampede protection: concurrent misses for the same
//! key share one in-flight computation, and the computation is spawned on
//! the runtime so it completes even if every caller is abandoned.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures_util::future::{BoxFuture, FutureExt, Shared};
use khata_core::TenantId;
use serde_json::Value;
use thiserror::Error;

use crate::backend::{ConnectionState, StoreBackend, StoreError};
use crate::breaker::{BreakerConfig, BreakerSnapshot, BreakerState, CircuitBreaker};

/// Default entry TTL, matching the route-cache default.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Facade configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL applied when callers do not specify one.
    pub default_ttl: Duration,
    /// Circuit breaker tuning.
    pub breaker: BreakerConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_CACHE_TTL,
            breaker: BreakerConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    pub fn with_breaker(mut self, breaker: BreakerConfig) -> Self {
        self.breaker = breaker;
        self
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Failure of a `get_or_fetch` computation.
///
/// Clone-able so one outcome can be delivered to every waiter sharing the
/// in-flight computation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchError {
    /// The compute function itself failed.
    #[error("fetch for {key} failed: {reason}")]
    Failed { key: String, reason: String },
}

impl FetchError {
    pub fn failed(key: impl Into<String>, reason: impl Into<String>) -> Self {
        FetchError::Failed {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

#[derive(Debug, Default)]
struct CacheMetrics {
    hits: AtomicU64,
    misses: AtomicU64,
    joined_flights: AtomicU64,
    fetches: AtomicU64,
    store_failures: AtomicU64,
    breaker_rejections: AtomicU64,
}

/// Point-in-time counters, exposed via the health endpoint.
#[derive(Debug, Clone, Copy)]
pub struct CacheMetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub joined_flights: u64,
    pub fetches: u64,
    pub store_failures: u64,
    pub breaker_rejections: u64,
}

// ============================================================================
// FACADE
// ============================================================================

type FetchOutcome = Result<Value, FetchError>;
type SharedFetch = Shared<BoxFuture<'static, FetchOutcome>>;

/// Cache facade over a [`StoreBackend`], owning the circuit breaker and the
/// in-flight request registry.
///
/// One instance exists per backing-store connection; clones share state.
/// Must be created within a Tokio runtime (it spawns a listener that resets
/// the breaker when the store reconnects).
pub struct CacheFacade {
    backend: Arc<dyn StoreBackend>,
    breaker: Arc<CircuitBreaker>,
    in_flight: Arc<Mutex<HashMap<String, SharedFetch>>>,
    metrics: Arc<CacheMetrics>,
    config: CacheConfig,
}

impl CacheFacade {
    pub fn new(backend: Arc<dyn StoreBackend>, config: CacheConfig) -> Self {
        let facade = Self {
            backend,
            breaker: Arc::new(CircuitBreaker::new(config.breaker.clone())),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            metrics: Arc::new(CacheMetrics::default()),
            config,
        };
        facade.spawn_reconnect_listener();
        facade
    }

    pub fn with_defaults(backend: Arc<dyn StoreBackend>) -> Self {
        Self::new(backend, CacheConfig::default())
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Whether the cache can currently serve: store connected and breaker
    /// not open. Route middleware bypasses caching entirely when false.
    pub fn is_available(&self) -> bool {
        self.backend.is_connected() && self.breaker.state() != BreakerState::Open
    }

    pub fn breaker_snapshot(&self) -> BreakerSnapshot {
        self.breaker.snapshot()
    }

    pub fn metrics_snapshot(&self) -> CacheMetricsSnapshot {
        CacheMetricsSnapshot {
            hits: self.metrics.hits.load(Ordering::Relaxed),
            misses: self.metrics.misses.load(Ordering::Relaxed),
            joined_flights: self.metrics.joined_flights.load(Ordering::Relaxed),
            fetches: self.metrics.fetches.load(Ordering::Relaxed),
            store_failures: self.metrics.store_failures.load(Ordering::Relaxed),
            breaker_rejections: self.metrics.breaker_rejections.load(Ordering::Relaxed),
        }
    }

    // ========================================================================
    // FAIL-SOFT STORE OPERATIONS
    // ========================================================================

    /// Fetch and parse a cached value.
    ///
    /// Returns `None` when the key is absent, the stored value is not valid
    /// JSON, the store is unavailable, or the breaker rejects the call.
    /// Never returns an error.
    pub async fn get(&self, key: &str) -> Option<Value> {
        if !self.backend.is_connected() {
            return None;
        }

        let raw = self
            .with_breaker("get", key, self.backend.get(key))
            .await
            .flatten()?;

        match serde_json::from_str(&raw) {
            Ok(value) => {
                self.metrics.hits.fetch_add(1, Ordering::Relaxed);
                Some(value)
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "discarding corrupt cache entry");
                self.metrics.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a value with an expiry. Returns `false` (not an error) when
    /// the value cannot be serialized, the store is down, or the breaker
    /// rejects the call.
    pub async fn set(&self, key: &str, value: &Value, ttl: Duration) -> bool {
        if !self.backend.is_connected() {
            return false;
        }

        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(key, error = %e, "failed to serialize cache value");
                return false;
            }
        };

        self.with_breaker("set_ex", key, self.backend.set_ex(key, &serialized, ttl))
            .await
            .is_some()
    }

    /// Delete a single key. Fail-soft.
    pub async fn delete(&self, key: &str) -> bool {
        if !self.backend.is_connected() {
            return false;
        }

        let keys = vec![key.to_string()];
        self.with_breaker("del", key, self.backend.del(&keys))
            .await
            .is_some()
    }

    /// Delete every key matching a glob pattern. Fail-soft.
    ///
    /// The lookup and the deletion run under a single breaker acquisition.
    pub async fn delete_by_pattern(&self, pattern: &str) -> bool {
        if !self.backend.is_connected() {
            return false;
        }

        let backend = Arc::clone(&self.backend);
        let pattern_owned = pattern.to_string();
        let op = async move {
            let keys = backend.keys(&pattern_owned).await?;
            if !keys.is_empty() {
                backend.del(&keys).await?;
            }
            Ok(())
        };

        self.with_breaker("del_pattern", pattern, op).await.is_some()
    }

    /// Drop every cached response for a tenant, optionally narrowed by a
    /// path pattern (`*` drops everything).
    pub async fn invalidate_tenant(&self, tenant_id: TenantId, pattern: &str) -> bool {
        self.delete_by_pattern(&format!("cache:{}:{}", tenant_id, pattern))
            .await
    }

    /// Route an operation through the circuit breaker.
    ///
    /// This is the single chokepoint: no store operation may bypass it. The
    /// operation future is only polled after the breaker admits the call.
    async fn with_breaker<T, Fut>(&self, operation: &'static str, key: &str, op: Fut) -> Option<T>
    where
        Fut: Future<Output = Result<T, StoreError>>,
    {
        if !self.breaker.try_acquire() {
            self.metrics.breaker_rejections.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(operation, key, "circuit open, failing fast");
            return None;
        }

        match op.await {
            Ok(value) => {
                self.breaker.record_success();
                Some(value)
            }
            Err(e) => {
                self.breaker.record_failure();
                self.metrics.store_failures.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(
                    operation,
                    key,
                    error = %e,
                    breaker_state = %self.breaker.state(),
                    "store operation failed"
                );
                None
            }
        }
    }

    // ========================================================================
    // SINGLE-FLIGHT
    // ========================================================================

    /// Fetch-or-compute with stampede protection.
    ///
    /// 1. A cache hit is returned immediately.
    /// 2. If a computation for `key` is already in flight, the caller awaits
    ///    that shared outcome instead of starting a new one.
    /// 3. Otherwise the caller registers a new computation which invokes
    ///    `fetch`, stores a successful result, deregisters itself, and then
    ///    resolves for every waiter.
    ///
    /// Exactly one concurrent caller per key executes `fetch`; all others
    /// observe the same value or error. A failed computation is deregistered
    /// before it resolves, so the key is immediately available for a fresh
    /// attempt. The computation is spawned: it runs to completion even if
    /// every caller is dropped mid-await.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        key: &str,
        ttl: Duration,
        fetch: F,
    ) -> Result<Value, FetchError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        if let Some(cached) = self.get(key).await {
            return Ok(cached);
        }
        self.metrics.misses.fetch_add(1, Ordering::Relaxed);

        let (shared, is_leader) = {
            let mut in_flight = lock_in_flight(&self.in_flight);

            if let Some(existing) = in_flight.get(key) {
                self.metrics.joined_flights.fetch_add(1, Ordering::Relaxed);
                (existing.clone(), false)
            } else {
                self.metrics.fetches.fetch_add(1, Ordering::Relaxed);

                let this = self.clone();
                let key_owned = key.to_string();
                let shared: SharedFetch = async move {
                    let result = fetch().await;
                    if let Ok(value) = &result {
                        // Best effort: a store failure here only means the
                        // next miss refetches.
                        this.set(&key_owned, value, ttl).await;
                    }
                    // Deregister before resolving so a settled key is
                    // immediately available for a fresh attempt.
                    lock_in_flight(&this.in_flight).remove(&key_owned);
                    result
                }
                .boxed()
                .shared();

                in_flight.insert(key.to_string(), shared.clone());
                (shared, true)
            }
        };

        // A spawned clone drives the computation to completion even if
        // every caller is abandoned. Shared polls the inner future exactly
        // once however many clones await it, and nothing polls before the
        // registry entry above is in place.
        if is_leader {
            tokio::spawn(shared.clone());
        }

        shared.await
    }

    /// Listener that forces the breaker closed when the store transport
    /// reports a successful reconnection.
    fn spawn_reconnect_listener(&self) {
        let mut events = self.backend.connection_events();
        let breaker = Arc::clone(&self.breaker);

        tokio::spawn(async move {
            let mut previous = *events.borrow();
            while events.changed().await.is_ok() {
                let current = *events.borrow();
                if previous == ConnectionState::Disconnected
                    && current == ConnectionState::Connected
                {
                    breaker.force_closed();
                }
                previous = current;
            }
        });
    }
}

impl Clone for CacheFacade {
    fn clone(&self) -> Self {
        Self {
            backend: Arc::clone(&self.backend),
            breaker: Arc::clone(&self.breaker),
            in_flight: Arc::clone(&self.in_flight),
            metrics: Arc::clone(&self.metrics),
            config: self.config.clone(),
        }
    }
}

fn lock_in_flight(
    map: &Mutex<HashMap<String, SharedFetch>>,
) -> std::sync::MutexGuard<'_, HashMap<String, SharedFetch>> {
    map.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// TESTS
// ============================================================================
