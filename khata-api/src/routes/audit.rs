//! Audit administration routes.
//!
//! Read-only access to the audit trail for administrators: export with
//! filters, and an on-demand integrity verification (the periodic verifier
//! covers the scheduled case).

use axum::{
    extract::{Query, State},
    http::Method,
    middleware::from_fn_with_state,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, Utc};
use khata_audit::{AuditRecord, ExportFilter, VerificationReport};
use khata_core::{AuditAction, EntityKind};
use serde::Deserialize;

use crate::error::{ApiError, ApiResult};
use crate::middleware::{permission_middleware, AuthExtractor, PermissionState};
use crate::registry::{MiddlewareTag, RouteRegistry};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AuditLogQuery {
    pub action: Option<AuditAction>,
    pub entity_kind: Option<EntityKind>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

/// GET /api/audit/logs - export this tenant's audit trail, newest first.
async fn export_logs(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Query(query): Query<AuditLogQuery>,
) -> ApiResult<Json<Vec<AuditRecord>>> {
    let filter = ExportFilter {
        tenant_id: Some(auth.tenant_id),
        user_id: None,
        action: query.action,
        entity_kind: query.entity_kind,
        from: query.from,
        to: query.to,
        limit: query.limit,
    };

    let records = state
        .audit
        .export(&filter)
        .await
        .map_err(|e| ApiError::service_unavailable(format!("Audit export failed: {}", e)))?;
    Ok(Json(records))
}

/// GET /api/audit/verify - run a full integrity verification now.
async fn verify_now(State(state): State<AppState>) -> ApiResult<Json<VerificationReport>> {
    let report = state
        .audit
        .verify_integrity()
        .await
        .map_err(|e| ApiError::service_unavailable(format!("Audit verification failed: {}", e)))?;

    if !report.verified {
        tracing::error!(
            errors = report.errors.len(),
            critical = true,
            "on-demand audit verification found chain errors"
        );
    }
    Ok(Json(report))
}

pub fn create_router(state: AppState, registry: &mut RouteRegistry) -> Router {
    use MiddlewareTag::*;

    registry.record(Method::GET, "/api/audit/logs", &[Authenticate, RequireAdmin]);
    registry.record(Method::GET, "/api/audit/verify", &[Authenticate, RequireAdmin]);

    Router::new()
        .route("/api/audit/logs", get(export_logs))
        .route("/api/audit/verify", get(verify_now))
        .layer(from_fn_with_state(
            PermissionState::role("admin"),
            permission_middleware,
        ))
        .with_state(state)
}
