//! Shared application state for Axum routers.

use std::sync::Arc;

use khata_audit::AuditStore;
use khata_cache::CacheFacade;

use crate::auth::AuthConfig;
use crate::config::ApiConfig;
use crate::repo::Repo;
use crate::telemetry::AlertSink;

/// Application-wide state shared across all routes.
///
/// The cache facade and the audit store are the process-wide single
/// instances required by the reliability layer: constructed once at boot
/// and injected here rather than living in global statics.
#[derive(Clone)]
pub struct AppState {
    /// Tenant-scoped data repository.
    pub repo: Arc<Repo>,
    /// Resilient cache facade (owns the circuit breaker and the in-flight
    /// request registry).
    pub cache: CacheFacade,
    /// Append-only audit trail.
    pub audit: Arc<dyn AuditStore>,
    /// Authentication configuration (shared with the login route for token
    /// issuance).
    pub auth_config: Arc<AuthConfig>,
    /// API configuration.
    pub config: Arc<ApiConfig>,
    /// Escalation channel for production-critical failures.
    pub alerts: Arc<dyn AlertSink>,
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        repo: Arc<Repo>,
        cache: CacheFacade,
        audit: Arc<dyn AuditStore>,
        auth_config: AuthConfig,
        config: ApiConfig,
        alerts: Arc<dyn AlertSink>,
    ) -> Self {
        Self {
            repo,
            cache,
            audit,
            auth_config: Arc::new(auth_config),
            config: Arc::new(config),
            alerts,
            start_time: std::time::Instant::now(),
        }
    }
}

// Use macro to reduce boilerplate for FromRef implementations
crate::impl_from_ref!(Arc<Repo>, repo);
crate::impl_from_ref!(CacheFacade, cache);
crate::impl_from_ref!(Arc<dyn AuditStore>, audit);
crate::impl_from_ref!(Arc<AuthConfig>, auth_config);
crate::impl_from_ref!(Arc<ApiConfig>, config);
