//! API Configuration Module
//!
//! Configuration for the environment gate, audit logging, the cache layer,
//! and CORS. Loaded from `KHATA_*` environment variables with sensible
//! defaults for development.

use std::time::Duration;

use khata_cache::BreakerConfig;
use khata_core::Environment;

use crate::constants::{
    DEFAULT_AUDIT_VERIFY_INTERVAL_SECS, DEFAULT_BREAKER_FAILURE_THRESHOLD,
    DEFAULT_BREAKER_OPEN_TIMEOUT_SECS, DEFAULT_CACHE_TTL_SECS, DEFAULT_CORS_MAX_AGE_SECS,
};

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Top-level API configuration.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Deployment environment; gates fatal-vs-warn enforcement behavior.
    pub environment: Environment,

    /// Whether audit logging is enabled. Disabling this in production
    /// aborts startup.
    pub audit_enabled: bool,

    /// Backing store URL. Absent means the in-process cache backend is used
    /// (development / tests).
    pub redis_url: Option<String>,

    /// TTL applied to cached GET responses.
    pub cache_ttl: Duration,

    /// Circuit breaker tuning for the store facade.
    pub breaker: BreakerConfig,

    /// Interval between audit-log integrity verification runs.
    pub audit_verify_interval: Duration,

    /// Allowed CORS origins (comma-separated in env var). Empty means allow
    /// all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            environment: Environment::Development,
            audit_enabled: true,
            redis_url: None,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            breaker: BreakerConfig {
                failure_threshold: DEFAULT_BREAKER_FAILURE_THRESHOLD,
                open_timeout: Duration::from_secs(DEFAULT_BREAKER_OPEN_TIMEOUT_SECS),
            },
            audit_verify_interval: Duration::from_secs(DEFAULT_AUDIT_VERIFY_INTERVAL_SECS),
            cors_origins: Vec::new(),
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `KHATA_ENVIRONMENT`: "production"/"prod" or anything else (development)
    /// - `KHATA_AUDIT_ENABLED`: "true" or "false" (default: true)
    /// - `KHATA_REDIS_URL`: backing store URL (absent = in-process backend)
    /// - `KHATA_CACHE_TTL_SECS`: cached response TTL (default: 300)
    /// - `KHATA_BREAKER_THRESHOLD`: failures before the circuit opens (default: 5)
    /// - `KHATA_BREAKER_OPEN_TIMEOUT_SECS`: open-circuit cooldown (default: 60)
    /// - `KHATA_AUDIT_VERIFY_INTERVAL_SECS`: integrity check interval (default: 3600)
    /// - `KHATA_CORS_ORIGINS`: comma-separated allowed origins (empty = allow all)
    pub fn from_env() -> Self {
        let environment = Environment::from_env();

        let audit_enabled = std::env::var("KHATA_AUDIT_ENABLED")
            .ok()
            .map(|s| s.to_lowercase() != "false")
            .unwrap_or(true);

        let redis_url = std::env::var("KHATA_REDIS_URL").ok().filter(|s| !s.is_empty());

        let cache_ttl = Duration::from_secs(
            std::env::var("KHATA_CACHE_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_CACHE_TTL_SECS),
        );

        let breaker = BreakerConfig {
            failure_threshold: std::env::var("KHATA_BREAKER_THRESHOLD")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_BREAKER_FAILURE_THRESHOLD),
            open_timeout: Duration::from_secs(
                std::env::var("KHATA_BREAKER_OPEN_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(DEFAULT_BREAKER_OPEN_TIMEOUT_SECS),
            ),
        };

        let audit_verify_interval = Duration::from_secs(
            std::env::var("KHATA_AUDIT_VERIFY_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_AUDIT_VERIFY_INTERVAL_SECS),
        );

        let cors_origins = std::env::var("KHATA_CORS_ORIGINS")
            .ok()
            .map(|s| {
                s.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Self {
            environment,
            audit_enabled,
            redis_url,
            cache_ttl,
            breaker,
            audit_verify_interval,
            cors_origins,
            cors_max_age_secs: DEFAULT_CORS_MAX_AGE_SECS,
        }
    }
}
