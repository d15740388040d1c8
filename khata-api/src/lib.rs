//! Khata API - REST layer for the multi-tenant billing back office
//!
//! This crate assembles the reliability core around the route surface:
//!
//! - Route modules register every endpoint (with typed middleware tags) in
//!   a [`registry::RouteRegistry`] as they mount it.
//! - The [`enforcement`] gate validates authorization and audit coverage
//!   over that registry at startup, refusing to serve in production when a
//!   mutating route is missing its guards.
//! - Mutating routes carry the [`middleware::audit_middleware`], which
//!   persists hash-chained audit records after successful responses.
//! - GET routes carry the [`middleware::cache_middleware`], backed by the
//!   circuit-broken, single-flight cache facade from `khata-cache`.
//! - A background job re-verifies audit-log integrity on a fixed interval.

pub mod auth;
pub mod config;
pub mod constants;
pub mod enforcement;
pub mod error;
pub mod jobs;
pub mod macros;
pub mod middleware;
pub mod registry;
pub mod repo;
pub mod routes;
pub mod state;
pub mod telemetry;

// Re-export commonly used types
pub use auth::{
    authenticate, generate_jwt_token, validate_api_key, validate_jwt_token, AuthConfig,
    AuthContext, AuthMethod, Claims,
};
pub use config::ApiConfig;
pub use enforcement::{
    run_startup_gate, validate_audit_coverage, validate_authorization_coverage,
    AuditCoverageReport, AuthorizationCoverageReport, CoverageViolation,
};
pub use error::{ApiError, ApiResult, ErrorCode};
pub use registry::{MiddlewareTag, RouteDescriptor, RouteRegistry};
pub use routes::build_router;
pub use state::AppState;
pub use telemetry::{init_telemetry, AlertSink, LogAlertSink, TelemetryConfig};
