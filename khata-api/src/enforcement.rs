//! Startup enforcement gate.
//!
//! Makes it structurally impossible to deploy a mutating endpoint without
//! authorization and audit middleware: the fully assembled route registry
//! is validated before the process starts serving, and in production any
//! violation (or audit logging being disabled) aborts startup with every
//! offending route named in the log.
//!
//! The checks are pure, synchronous, and safe to re-run at any time; the
//! only side effect is logging.

use std::collections::HashSet;

use axum::http::Method;
use khata_core::Environment;
use once_cell::sync::Lazy;
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::registry::{MiddlewareTag, RouteDescriptor, RouteRegistry};

// ============================================================================
// CLASSIFICATION RULES
// ============================================================================

/// Routes that are intentionally public (no auth required).
static PUBLIC_ROUTES: Lazy<HashSet<(&str, &str)>> = Lazy::new(|| {
    HashSet::from([
        ("POST", "/api/auth/register"),
        ("POST", "/api/auth/login"),
        ("POST", "/api/auth/forgot-password"),
        ("POST", "/api/auth/reset-password"),
        ("GET", "/health/ping"),
        ("GET", "/health/live"),
        ("GET", "/health/ready"),
    ])
});

/// Tags that satisfy authorization coverage.
const AUTHORIZATION_TAGS: &[MiddlewareTag] = &[
    MiddlewareTag::Authenticate,
    MiddlewareTag::RequirePermission,
    MiddlewareTag::RequireAdmin,
];

fn is_mutating(method: &Method) -> bool {
    *method == Method::POST
        || *method == Method::PUT
        || *method == Method::PATCH
        || *method == Method::DELETE
}

fn is_public(route: &RouteDescriptor) -> bool {
    PUBLIC_ROUTES.contains(&(route.method.as_str(), route.path.as_str()))
}

fn is_protected(route: &RouteDescriptor) -> bool {
    AUTHORIZATION_TAGS.iter().any(|tag| route.has_tag(*tag))
}

/// Destructive routes require audit middleware: every DELETE, and every PUT
/// addressing a specific entity (an `:id`-style path segment).
fn requires_audit(route: &RouteDescriptor) -> bool {
    if route.method == Method::DELETE {
        return true;
    }
    route.method == Method::PUT
        && route.path.split('/').any(|segment| segment.starts_with(':'))
}

// ============================================================================
// COVERAGE REPORTS
// ============================================================================

/// One route failing a coverage check.
#[derive(Debug, Clone, Serialize)]
pub struct CoverageViolation {
    pub route: String,
    pub middleware: Vec<String>,
    pub reason: String,
}

/// Authorization coverage over all mutating routes.
#[derive(Debug, Clone, Serialize)]
pub struct AuthorizationCoverageReport {
    pub total_mutating: usize,
    pub protected: usize,
    pub public_matches: Vec<String>,
    pub violations: Vec<CoverageViolation>,
    pub valid: bool,
}

/// Audit coverage over all destructive routes.
#[derive(Debug, Clone, Serialize)]
pub struct AuditCoverageReport {
    pub total_destructive: usize,
    pub audited: usize,
    pub violations: Vec<CoverageViolation>,
    pub valid: bool,
}

// ============================================================================
// VALIDATORS
// ============================================================================

/// Check that every mutating route outside the public allow-list carries
/// authorization middleware.
pub fn validate_authorization_coverage(registry: &RouteRegistry) -> AuthorizationCoverageReport {
    let mut report = AuthorizationCoverageReport {
        total_mutating: 0,
        protected: 0,
        public_matches: Vec::new(),
        violations: Vec::new(),
        valid: true,
    };

    for route in registry.routes() {
        if !is_mutating(&route.method) {
            continue;
        }
        report.total_mutating += 1;

        if is_public(route) {
            report.public_matches.push(route.route_key());
            continue;
        }

        if is_protected(route) {
            report.protected += 1;
        } else {
            report.violations.push(CoverageViolation {
                route: route.route_key(),
                middleware: route.middleware.iter().map(|t| t.to_string()).collect(),
                reason: "missing authorization middleware".to_string(),
            });
            report.valid = false;
        }
    }

    report
}

/// Check that every destructive route carries audit middleware.
pub fn validate_audit_coverage(registry: &RouteRegistry) -> AuditCoverageReport {
    let mut report = AuditCoverageReport {
        total_destructive: 0,
        audited: 0,
        violations: Vec::new(),
        valid: true,
    };

    for route in registry.routes() {
        if !requires_audit(route) {
            continue;
        }
        if is_public(route) {
            continue;
        }
        report.total_destructive += 1;

        if route.has_tag(MiddlewareTag::AuditMutation) {
            report.audited += 1;
        } else {
            report.violations.push(CoverageViolation {
                route: route.route_key(),
                middleware: route.middleware.iter().map(|t| t.to_string()).collect(),
                reason: "missing audit middleware".to_string(),
            });
            report.valid = false;
        }
    }

    report
}

// ============================================================================
// STARTUP GATE
// ============================================================================

/// Run every enforcement check against the assembled route table.
///
/// In production any violation is fatal: the returned error carries the
/// complete violation list and the caller must refuse to serve (non-zero
/// exit). Outside production, violations are logged as warnings and
/// startup continues.
pub fn run_startup_gate(
    registry: &RouteRegistry,
    environment: Environment,
    audit_enabled: bool,
) -> ApiResult<()> {
    tracing::info!(%environment, routes = registry.len(), "running startup enforcement checks");

    if !audit_enabled {
        if environment.is_production() {
            tracing::error!("audit logging is disabled in production");
            return Err(ApiError::deployment_blocked(
                "Audit logging is disabled in production. \
                 Set KHATA_AUDIT_ENABLED=true or remove the variable.",
            ));
        }
        tracing::warn!("audit logging is disabled (development mode)");
    }

    let authorization = validate_authorization_coverage(registry);
    let audit = validate_audit_coverage(registry);

    tracing::info!(
        total_mutating = authorization.total_mutating,
        protected = authorization.protected,
        public = authorization.public_matches.len(),
        total_destructive = audit.total_destructive,
        audited = audit.audited,
        "route coverage computed"
    );

    let violations: Vec<&CoverageViolation> = authorization
        .violations
        .iter()
        .chain(audit.violations.iter())
        .collect();

    if violations.is_empty() {
        tracing::info!("all mutating routes carry authorization and audit middleware");
        return Ok(());
    }

    for violation in &violations {
        tracing::error!(
            route = %violation.route,
            middleware = ?violation.middleware,
            reason = %violation.reason,
            "route coverage violation"
        );
    }

    if environment.is_production() {
        let routes: Vec<String> = violations
            .iter()
            .map(|v| format!("{} ({})", v.route, v.reason))
            .collect();
        return Err(ApiError::deployment_blocked(format!(
            "DEPLOYMENT BLOCKED: {} route coverage violations: {}",
            routes.len(),
            routes.join(", ")
        ))
        .with_details(serde_json::json!({ "violations": routes })));
    }

    tracing::warn!(
        count = violations.len(),
        "route coverage violations detected (continuing in development mode)"
    );
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
