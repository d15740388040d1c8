//! Constants for the Khata API
//!
//! This module contains all constant values used throughout the API.
//! Centralizing constants makes them easy to find, modify, and test.

// ============================================================================
// AUTHENTICATION
// ============================================================================

/// Default JWT token expiration time in seconds (1 hour)
pub const DEFAULT_JWT_EXPIRATION_SECS: i64 = 3600;

/// Minimum required length for JWT secret keys
pub const MIN_JWT_SECRET_LENGTH: usize = 32;

// ============================================================================
// CACHING
// ============================================================================

/// Default TTL for cached GET responses (5 minutes)
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default consecutive store failures before the circuit opens
pub const DEFAULT_BREAKER_FAILURE_THRESHOLD: u32 = 5;

/// Default cooldown before an open circuit admits a recovery trial
pub const DEFAULT_BREAKER_OPEN_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// AUDIT
// ============================================================================

/// Default interval between audit-log integrity verification runs (1 hour)
pub const DEFAULT_AUDIT_VERIFY_INTERVAL_SECS: u64 = 3600;

// ============================================================================
// CORS
// ============================================================================

/// Default CORS max age in seconds (24 hours)
pub const DEFAULT_CORS_MAX_AGE_SECS: u64 = 86400;

// ============================================================================
// SERVER
// ============================================================================

/// Default bind host
pub const DEFAULT_BIND_HOST: &str = "0.0.0.0";

/// Default bind port
pub const DEFAULT_BIND_PORT: u16 = 4000;
