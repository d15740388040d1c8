//! Route registry with typed middleware tags.
//!
//! Route modules record every endpoint here as they mount it, carrying an
//! explicit tag for each guard they attach. The startup enforcement gate
//! reads this registry instead of reflecting on framework internals, and
//! recognizes middleware by typed tag instead of by function-name string
//! matching (renames are compile-checked).

use axum::http::Method;

// ============================================================================
// MIDDLEWARE TAGS
// ============================================================================

/// Typed marker for a guard attached to a route.
///
/// Recording a tag is a declaration that the matching middleware layer is
/// mounted on the route; the enforcement gate holds route modules to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MiddlewareTag {
    /// Credential check (`auth_middleware`)
    Authenticate,
    /// Role/permission check (`permission_middleware`)
    RequirePermission,
    /// Admin-only check (`permission_middleware` with the admin role)
    RequireAdmin,
    /// Post-response audit logging (`audit_middleware`)
    AuditMutation,
    /// Response caching (`cache_middleware`)
    CacheResponse,
}

impl std::fmt::Display for MiddlewareTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MiddlewareTag::Authenticate => "authenticate",
            MiddlewareTag::RequirePermission => "require_permission",
            MiddlewareTag::RequireAdmin => "require_admin",
            MiddlewareTag::AuditMutation => "audit_mutation",
            MiddlewareTag::CacheResponse => "cache_response",
        };
        write!(f, "{}", name)
    }
}

// ============================================================================
// ROUTE DESCRIPTOR
// ============================================================================

/// One registered endpoint.
#[derive(Debug, Clone)]
pub struct RouteDescriptor {
    pub method: Method,
    pub path: String,
    pub middleware: Vec<MiddlewareTag>,
}

impl RouteDescriptor {
    /// Canonical `"METHOD /path"` form used in reports and logs.
    pub fn route_key(&self) -> String {
        format!("{} {}", self.method, self.path)
    }

    pub fn has_tag(&self, tag: MiddlewareTag) -> bool {
        self.middleware.contains(&tag)
    }
}

// ============================================================================
// REGISTRY
// ============================================================================

/// Registration-time record of the full route table.
#[derive(Debug, Default)]
pub struct RouteRegistry {
    routes: Vec<RouteDescriptor>,
}

impl RouteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one endpoint. Called by route modules alongside the matching
    /// `Router::route` call.
    pub fn record(&mut self, method: Method, path: &str, middleware: &[MiddlewareTag]) {
        self.routes.push(RouteDescriptor {
            method,
            path: path.to_string(),
            middleware: middleware.to_vec(),
        });
    }

    pub fn routes(&self) -> &[RouteDescriptor] {
        &self.routes
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
