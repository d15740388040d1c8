//! Middleware modules for the Khata API
//!
//! - `correlation`: request id / correlation context injection
//! - `auth`: authentication and role checks
//! - `audit`: post-response audit logging for mutating routes
//! - `cache`: response caching with stampede protection for GET routes
//!
//! # Middleware Order
//!
//! Order matters. The stack, outermost first:
//!
//! ```ignore
//! correlation            // request context for every log line
//!   -> auth              // credentials -> AuthContext in extensions
//!     -> permission      // role check (mutating routes)
//!       -> audit         // wraps the handler, logs 2xx mutations
//!     -> cache           // GET routes only
//!       -> handler
//! ```

pub mod audit;
pub mod auth;
pub mod cache;
pub mod correlation;

pub use audit::{audit_middleware, with_audit_snapshot, AuditLayerState, AuditSnapshot};
pub use auth::{
    auth_middleware, permission_middleware, AuthExtractor, AuthMiddlewareState, PermissionState,
};
pub use cache::{cache_middleware, CacheMiddlewareState};
pub use correlation::{correlation_middleware, RequestContext, CORRELATION_ID_HEADER};
