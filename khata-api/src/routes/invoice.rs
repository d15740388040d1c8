//! Invoice routes.
//!
//! Demonstrates the full guard stack: cached reads, authenticated writes,
//! role-checked and audited destructive operations. Every route is recorded
//! in the [`RouteRegistry`] with the tags matching its mounted layers; the
//! startup gate holds the module to that declaration.

use axum::{
    extract::{Path, State},
    http::{Method, StatusCode},
    middleware::from_fn_with_state,
    response::{IntoResponse, Response},
    routing::{delete, get, post, put},
    Json, Router,
};
use chrono::Utc;
use khata_core::{new_entity_id, AuditAction, EntityId};
use serde::Deserialize;
use serde_json::json;

use crate::error::{ApiError, ApiResult};
use crate::middleware::{
    audit_middleware, cache_middleware, permission_middleware, with_audit_snapshot, AuditLayerState,
    AuthExtractor, CacheMiddlewareState, PermissionState,
};
use crate::registry::{MiddlewareTag, RouteRegistry};
use crate::repo::Invoice;
use crate::state::AppState;

// ============================================================================
// REQUEST TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateInvoiceRequest {
    pub invoice_number: String,
    pub customer_id: EntityId,
    pub total: f64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateInvoiceRequest {
    pub invoice_number: Option<String>,
    pub total: Option<f64>,
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn list_invoices(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
) -> Json<Vec<Invoice>> {
    let mut invoices = state.repo.invoices.list(auth.tenant_id);
    invoices.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Json(invoices)
}

async fn get_invoice(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<EntityId>,
) -> ApiResult<Json<Invoice>> {
    state
        .repo
        .invoices
        .get(auth.tenant_id, id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Invoice not found"))
}

async fn create_invoice(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Json(req): Json<CreateInvoiceRequest>,
) -> ApiResult<(StatusCode, Json<Invoice>)> {
    if req.invoice_number.trim().is_empty() {
        return Err(ApiError::missing_field("invoice_number"));
    }
    if req.total < 0.0 {
        return Err(ApiError::invalid_input("total must not be negative"));
    }

    let now = Utc::now();
    let invoice = Invoice {
        invoice_id: new_entity_id(),
        tenant_id: auth.tenant_id,
        invoice_number: req.invoice_number,
        customer_id: req.customer_id,
        total: req.total,
        created_at: now,
        updated_at: now,
    };
    state
        .repo
        .invoices
        .insert(auth.tenant_id, invoice.invoice_id, invoice.clone());

    // Cached lists for this tenant are now stale.
    state.cache.invalidate_tenant(auth.tenant_id, "*").await;

    Ok((StatusCode::CREATED, Json(invoice)))
}

/// Update an invoice, attaching before/after snapshots for the audit layer.
async fn update_invoice(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<EntityId>,
    Json(req): Json<UpdateInvoiceRequest>,
) -> ApiResult<Response> {
    let before = state
        .repo
        .invoices
        .get(auth.tenant_id, id)
        .ok_or_else(|| ApiError::not_found("Invoice not found"))?;

    let mut after = before.clone();
    if let Some(invoice_number) = req.invoice_number {
        after.invoice_number = invoice_number;
    }
    if let Some(total) = req.total {
        if total < 0.0 {
            return Err(ApiError::invalid_input("total must not be negative"));
        }
        after.total = total;
    }
    after.updated_at = Utc::now();

    state.repo.invoices.insert(auth.tenant_id, id, after.clone());
    state.cache.invalidate_tenant(auth.tenant_id, "*").await;

    let response = Json(after.clone()).into_response();
    Ok(with_audit_snapshot(
        response,
        serde_json::to_value(&before).ok(),
        serde_json::to_value(&after).ok(),
    ))
}

/// Delete an invoice, attaching the deleted entity as the before snapshot.
async fn delete_invoice(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<EntityId>,
) -> ApiResult<Response> {
    let deleted = state
        .repo
        .invoices
        .remove(auth.tenant_id, id)
        .ok_or_else(|| ApiError::not_found("Invoice not found"))?;

    state.cache.invalidate_tenant(auth.tenant_id, "*").await;

    let response = Json(json!({"deleted": true, "invoice_id": id})).into_response();
    Ok(with_audit_snapshot(
        response,
        serde_json::to_value(&deleted).ok(),
        None,
    ))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router(state: AppState, registry: &mut RouteRegistry) -> Router {
    use MiddlewareTag::*;

    registry.record(Method::GET, "/api/invoices", &[Authenticate, CacheResponse]);
    registry.record(Method::GET, "/api/invoices/:id", &[Authenticate, CacheResponse]);
    registry.record(Method::POST, "/api/invoices", &[Authenticate]);
    registry.record(
        Method::PUT,
        "/api/invoices/:id",
        &[Authenticate, RequirePermission, AuditMutation],
    );
    registry.record(
        Method::DELETE,
        "/api/invoices/:id",
        &[Authenticate, RequirePermission, AuditMutation],
    );

    let cache_state = CacheMiddlewareState::new(state.cache.clone(), state.config.cache_ttl);
    let audit_state = AuditLayerState {
        store: state.audit.clone(),
        environment: state.config.environment,
        enabled: state.config.audit_enabled,
        alerts: state.alerts.clone(),
        action: AuditAction::DeleteInvoice,
    };

    let reads = Router::new()
        .route("/api/invoices", get(list_invoices))
        .route("/api/invoices/:id", get(get_invoice))
        .layer(from_fn_with_state(cache_state, cache_middleware));

    let creates = Router::new().route("/api/invoices", post(create_invoice));

    let updates = Router::new()
        .route("/api/invoices/:id", put(update_invoice))
        .layer(from_fn_with_state(
            audit_state.for_action(AuditAction::UpdateInvoice),
            audit_middleware,
        ))
        .layer(from_fn_with_state(
            PermissionState::role("manager"),
            permission_middleware,
        ));

    let deletes = Router::new()
        .route("/api/invoices/:id", delete(delete_invoice))
        .layer(from_fn_with_state(audit_state, audit_middleware))
        .layer(from_fn_with_state(
            PermissionState::role("manager"),
            permission_middleware,
        ));

    Router::new()
        .merge(reads)
        .merge(creates)
        .merge(updates)
        .merge(deletes)
        .with_state(state)
}
