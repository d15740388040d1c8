//! Circuit breaker for store operations.
//!
//! Prevents repeated calls into a failing backing store from amplifying
//! latency and load, and allows automatic, bounded-risk recovery probing.
//!
//! # State Machine
//!
//! ```text
//! ┌────────┐  failure_threshold  ┌──────┐   open_timeout   ┌──────────┐
//! │ Closed │ ──────reached─────→ │ Open │ ────elapsed────→ │ HalfOpen │
//! └────────┘                     └──────┘ ←─trial fails─── └──────────┘
//!      ↑                                                        │
//!      └───────────────────trial succeeds───────────────────────┘
//! ```
//!
//! HalfOpen admits exactly one trial call; concurrent callers are rejected
//! until the trial settles. A connection-reestablished signal forces the
//! breaker closed from any state.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use tokio::time::Instant;

/// Default number of consecutive failures before opening the circuit.
pub const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default duration the circuit stays open before admitting a trial call.
pub const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(60);

// ============================================================================
// TYPES
// ============================================================================

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation: all calls are attempted.
    Closed,
    /// Calls fail fast without touching the store.
    Open,
    /// One trial call is in flight; everyone else fails fast.
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BreakerState::Closed => write!(f, "closed"),
            BreakerState::Open => write!(f, "open"),
            BreakerState::HalfOpen => write!(f, "half_open"),
        }
    }
}

/// Circuit breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures before the circuit opens.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a recovery trial is admitted.
    pub open_timeout: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            open_timeout: DEFAULT_OPEN_TIMEOUT,
        }
    }
}

/// Point-in-time view of breaker state, exposed for health reporting.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSnapshot {
    pub state: BreakerState,
    pub failure_count: u32,
    pub fast_fail_count: u64,
    pub transitions: u64,
}

#[derive(Debug)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    last_failure: Option<Instant>,
    fast_fail_count: u64,
    transitions: u64,
}

// ============================================================================
// BREAKER
// ============================================================================

/// Shared guard through which every store operation must pass.
///
/// One instance exists per backing-store connection, owned by the facade.
/// All transitions happen atomically under an internal mutex, so the
/// HalfOpen single-trial guarantee holds on a multi-threaded runtime.
#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                failure_count: 0,
                last_failure: None,
                fast_fail_count: 0,
                transitions: 0,
            }),
            config,
        }
    }

    /// Decide whether a call may be attempted, applying the Open -> HalfOpen
    /// transition first when the open timeout has elapsed.
    ///
    /// Returns `false` when the caller must fail fast. A `true` from the
    /// HalfOpen transition admits exactly that caller as the trial; further
    /// callers are rejected until the trial settles via
    /// [`record_success`](Self::record_success) or
    /// [`record_failure`](Self::record_failure).
    pub fn try_acquire(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            BreakerState::Closed => true,
            BreakerState::Open => {
                let timed_out = inner
                    .last_failure
                    .map(|at| at.elapsed() > self.config.open_timeout)
                    .unwrap_or(true);
                if timed_out {
                    inner.state = BreakerState::HalfOpen;
                    inner.transitions += 1;
                    tracing::warn!("circuit breaker attempting recovery (half-open)");
                    true
                } else {
                    inner.fast_fail_count += 1;
                    false
                }
            }
            // Trial already in flight.
            BreakerState::HalfOpen => {
                inner.fast_fail_count += 1;
                false
            }
        }
    }

    /// Record a successful call: the circuit closes and the failure count
    /// resets, whatever the current state.
    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state != BreakerState::Closed {
            inner.transitions += 1;
            tracing::info!("circuit breaker recovered (closed)");
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
    }

    /// Record a failed call, opening the circuit when the threshold is
    /// reached or a HalfOpen trial fails.
    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());

        let should_open = match inner.state {
            BreakerState::HalfOpen => true,
            BreakerState::Closed => inner.failure_count >= self.config.failure_threshold,
            BreakerState::Open => false,
        };

        if should_open && inner.state != BreakerState::Open {
            inner.state = BreakerState::Open;
            inner.transitions += 1;
            tracing::error!(
                failures = inner.failure_count,
                "circuit breaker opened"
            );
        }
    }

    /// Force the breaker closed, resetting the failure count.
    ///
    /// Driven by the store's connection-reestablished event; recovers faster
    /// than waiting out the open timeout.
    pub fn force_closed(&self) {
        let mut inner = self.lock();
        if inner.state != BreakerState::Closed {
            inner.transitions += 1;
            tracing::info!("circuit breaker reset by reconnection");
        }
        inner.state = BreakerState::Closed;
        inner.failure_count = 0;
        inner.last_failure = None;
    }

    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            state: inner.state,
            failure_count: inner.failure_count,
            fast_fail_count: inner.fast_fail_count,
            transitions: inner.transitions,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // No invariant can be left half-applied by a panicking holder: every
        // critical section is a plain field update.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn breaker() -> CircuitBreaker {
        CircuitBreaker::new(BreakerConfig {
            failure_threshold: 5,
            open_timeout: Duration::from_secs(60),
        })
    }

    #[test]
    fn test_starts_closed() {
        let b = breaker();
        assert_eq!(b.state(), BreakerState::Closed);
        assert!(b.try_acquire());
    }

    #[test]
    fn test_opens_after_threshold_failures() {
        let b = breaker();
        for i in 0..5 {
            assert!(b.try_acquire(), "call {} should be attempted", i);
            b.record_failure();
        }
        assert_eq!(b.state(), BreakerState::Open);

        let snapshot = b.snapshot();
        assert!(snapshot.failure_count >= 5);
    }

    #[test]
    fn test_below_threshold_stays_closed() {
        let b = breaker();
        for _ in 0..4 {
            b.record_failure();
        }
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[test]
    fn test_success_resets_failure_count() {
        let b = breaker();
        for _ in 0..4 {
            b.record_failure();
        }
        b.record_success();
        assert_eq!(b.snapshot().failure_count, 0);
        // Needs a full fresh run of failures to open.
        for _ in 0..4 {
            b.record_failure();
        }
        assert_eq!(b.state(), BreakerState::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_rejects_until_timeout() {
        let b = breaker();
        for _ in 0..5 {
            b.record_failure();
        }
        assert_eq!(b.state(), BreakerState::Open);

        // Within the open window, calls fail fast.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!b.try_acquire());
        assert_eq!(b.state(), BreakerState::Open);

        // After the window, the next call becomes the half-open trial.
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(b.try_acquire());
        assert_eq!(b.state(), BreakerState::HalfOpen);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_success_closes_and_resets() {
        let b = breaker();
        for _ in 0..5 {
            b.record_failure();
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(b.try_acquire());

        b.record_success();
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.snapshot().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_failure_reopens() {
        let b = breaker();
        for _ in 0..5 {
            b.record_failure();
        }
        tokio::time::advance(Duration::from_secs(61)).await;
        assert!(b.try_acquire());

        b.record_failure();
        assert_eq!(b.state(), BreakerState::Open);

        // The fresh failure timestamp restarts the open window.
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(!b.try_acquire());
        tokio::time::advance(Duration::from_secs(31)).await;
        assert!(b.try_acquire());
    }

    #[tokio::test(start_paused = true)]
    async fn test_half_open_admits_exactly_one_trial() {
        let b = breaker();
        for _ in 0..5 {
            b.record_failure();
        }
        tokio::time::advance(Duration::from_secs(61)).await;

        assert!(b.try_acquire());
        // Trial in flight: everyone else is rejected.
        assert!(!b.try_acquire());
        assert!(!b.try_acquire());

        b.record_success();
        assert!(b.try_acquire());
    }

    #[test]
    fn test_force_closed_resets_from_open() {
        let b = breaker();
        for _ in 0..5 {
            b.record_failure();
        }
        assert_eq!(b.state(), BreakerState::Open);

        b.force_closed();
        assert_eq!(b.state(), BreakerState::Closed);
        assert_eq!(b.snapshot().failure_count, 0);
        assert!(b.try_acquire());
    }

    #[test]
    fn test_fast_fail_count_tracks_rejections() {
        let b = breaker();
        for _ in 0..5 {
            b.record_failure();
        }
        assert!(!b.try_acquire());
        assert!(!b.try_acquire());
        assert_eq!(b.snapshot().fast_fail_count, 2);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            /// `state == Open` implies the failure count reached the
            /// threshold at the moment the circuit opened; since successes
            /// reset the count to zero and close the circuit, an open
            /// breaker always carries `failure_count >= threshold`.
            #[test]
            fn open_implies_threshold_reached(ops in proptest::collection::vec(any::<bool>(), 0..64)) {
                let threshold = 5u32;
                let b = CircuitBreaker::new(BreakerConfig {
                    failure_threshold: threshold,
                    open_timeout: Duration::from_secs(60),
                });

                for success in ops {
                    if success {
                        b.record_success();
                    } else {
                        b.record_failure();
                    }
                    let snapshot = b.snapshot();
                    if snapshot.state == BreakerState::Open {
                        prop_assert!(snapshot.failure_count >= threshold);
                    }
                }
            }
        }
    }
}
