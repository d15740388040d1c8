//! Audit middleware for mutating routes.
//!
//! Wraps a specific mutating route with `(action)` context. After the inner
//! handler completes with a 2xx status, an audit record is persisted
//! asynchronously from request-scoped context plus the before/after
//! snapshots the handler attached to its response. Persistence failures are
//! logged as critical (and alerted in production) but never alter the
//! response already produced - audit logging is best-effort relative to the
//! primary operation, deliberately asymmetric with the startup gate's
//! fail-closed policy. Non-2xx responses are never audited.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use khata_audit::{AuditStore, NewAuditRecord};
use khata_core::{AuditAction, EntityId, Environment};
use serde_json::Value;
use uuid::Uuid;

use crate::auth::AuthContext;
use crate::middleware::correlation::RequestContext;
use crate::telemetry::AlertSink;

// ============================================================================
// SNAPSHOTS
// ============================================================================

/// Before/after entity snapshots, attached to the response by the handler
/// that performed the mutation.
#[derive(Debug, Clone, Default)]
pub struct AuditSnapshot {
    pub before: Option<Value>,
    pub after: Option<Value>,
}

/// Attach audit snapshots to a response. Convenience for handlers.
pub fn with_audit_snapshot(
    mut response: Response,
    before: Option<Value>,
    after: Option<Value>,
) -> Response {
    response
        .extensions_mut()
        .insert(AuditSnapshot { before, after });
    response
}

// ============================================================================
// MIDDLEWARE STATE
// ============================================================================

/// Per-route audit middleware state: the shared persistence pieces plus the
/// action this route performs.
#[derive(Clone)]
pub struct AuditLayerState {
    pub store: Arc<dyn AuditStore>,
    pub environment: Environment,
    pub enabled: bool,
    pub alerts: Arc<dyn AlertSink>,
    pub action: AuditAction,
}

impl AuditLayerState {
    pub fn for_action(&self, action: AuditAction) -> Self {
        Self {
            action,
            ..self.clone()
        }
    }
}

// ============================================================================
// MIDDLEWARE
// ============================================================================

/// Audit-log a mutating route.
pub async fn audit_middleware(
    State(state): State<AuditLayerState>,
    request: Request,
    next: Next,
) -> Response {
    // Capture request-scoped context before handing the request off.
    let auth = request.extensions().get::<AuthContext>().cloned();
    let context = request.extensions().get::<RequestContext>().cloned();
    let entity_id = entity_id_from_path(request.uri().path());
    let method = request.method().to_string();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    if !state.enabled || !response.status().is_success() {
        return response;
    }

    let Some(auth) = auth else {
        // The enforcement gate guarantees auth middleware on audited
        // routes; reaching here means a mis-assembled router.
        tracing::error!(%method, %path, "audit middleware ran without auth context");
        return response;
    };

    let snapshot = response
        .extensions()
        .get::<AuditSnapshot>()
        .cloned()
        .unwrap_or_default();

    let record = NewAuditRecord {
        tenant_id: auth.tenant_id,
        user_id: auth.user_id,
        action: state.action,
        entity_kind: state.action.entity_kind(),
        entity_id,
        before: snapshot.before,
        after: snapshot.after,
        ip_address: context
            .as_ref()
            .map(|c| c.client_ip.clone())
            .unwrap_or_else(|| "unknown".to_string()),
        user_agent: context.as_ref().and_then(|c| c.user_agent.clone()),
        metadata: serde_json::json!({
            "correlationId": context.as_ref().map(|c| c.correlation_id.clone()),
            "method": method,
            "path": path,
        }),
    };

    // Persist off the response path: the client's response is already
    // decided and must not be affected.
    let store = Arc::clone(&state.store);
    let alerts = Arc::clone(&state.alerts);
    let environment = state.environment;
    let action = state.action;
    tokio::spawn(async move {
        match store.append(record).await {
            Ok(record_id) => {
                tracing::debug!(%record_id, %action, "audit record appended");
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    %action,
                    critical = true,
                    "audit logging failed"
                );
                if environment.is_production() {
                    alerts.critical(
                        "audit-middleware",
                        &format!("audit logging failed for {}: {}", action, e),
                    );
                }
            }
        }
    });

    response
}

/// Pull the addressed entity id out of the request path (the trailing
/// `/:id` segment on destructive routes). Falls back to the nil UUID for
/// routes that do not address a single entity.
fn entity_id_from_path(path: &str) -> EntityId {
    path.rsplit('/')
        .find_map(|segment| segment.parse::<Uuid>().ok())
        .unwrap_or(Uuid::nil())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthMethod;
    use crate::telemetry::LogAlertSink;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        response::IntoResponse,
        routing::delete,
        Json, Router,
    };
    use khata_audit::InMemoryAuditStore;
    use khata_core::new_entity_id;
    use serde_json::json;
    use tower::ServiceExt;

    fn layer_state(store: Arc<InMemoryAuditStore>, action: AuditAction) -> AuditLayerState {
        AuditLayerState {
            store,
            environment: Environment::Development,
            enabled: true,
            alerts: Arc::new(LogAlertSink),
            action,
        }
    }

    /// Test middleware standing in for auth_middleware.
    async fn inject_auth(mut request: Request, next: Next) -> Response {
        request.extensions_mut().insert(AuthContext {
            user_id: new_entity_id(),
            tenant_id: new_entity_id(),
            roles: vec!["admin".to_string()],
            auth_method: AuthMethod::Jwt,
        });
        request.extensions_mut().insert(RequestContext {
            correlation_id: "test-correlation".to_string(),
            client_ip: "198.51.100.9".to_string(),
            user_agent: Some("tests/1.0".to_string()),
        });
        next.run(request).await
    }

    async fn drain_spawned_appends(store: &InMemoryAuditStore, expected: usize) {
        for _ in 0..100 {
            if store.len().await >= expected {
                return;
            }
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_successful_delete_is_audited() {
        let store = Arc::new(InMemoryAuditStore::new());
        let target = new_entity_id();

        async fn handler() -> Response {
            let response = Json(json!({"deleted": true})).into_response();
            with_audit_snapshot(response, Some(json!({"invoiceNumber": "INV-7"})), None)
        }

        let app = Router::new()
            .route("/api/invoices/:id", delete(handler))
            .layer(middleware::from_fn_with_state(
                layer_state(store.clone(), AuditAction::DeleteInvoice),
                audit_middleware,
            ))
            .layer(middleware::from_fn(inject_auth));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("DELETE")
                    .uri(format!("/api/invoices/{}", target))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        drain_spawned_appends(&store, 1).await;
        let records = store.all().await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, AuditAction::DeleteInvoice);
        assert_eq!(records[0].entity_id, target);
        assert_eq!(records[0].before, Some(json!({"invoiceNumber": "INV-7"})));
        assert_eq!(records[0].ip_address, "198.51.100.9");
        assert_eq!(records[0].metadata["correlationId"], "test-correlation");
    }

    #[tokio::test]
    async fn test_failed_request_is_not_audited() {
        let store = Arc::new(InMemoryAuditStore::new());

        async fn handler() -> Response {
            crate::error::ApiError::not_found("Invoice not found").into_response()
        }

        let app = Router::new()
            .route("/api/invoices/:id", delete(handler))
            .layer(middleware::from_fn_with_state(
                layer_state(store.clone(), AuditAction::DeleteInvoice),
                audit_middleware,
            ))
            .layer(middleware::from_fn(inject_auth));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("DELETE")
                    .uri(format!("/api/invoices/{}", new_entity_id()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        // Give any stray spawn a chance to land, then confirm none did.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_disabled_audit_skips_logging() {
        let store = Arc::new(InMemoryAuditStore::new());
        let mut state = layer_state(store.clone(), AuditAction::DeleteItem);
        state.enabled = false;

        async fn handler() -> Json<Value> {
            Json(json!({"deleted": true}))
        }

        let app = Router::new()
            .route("/api/items/:id", delete(handler))
            .layer(middleware::from_fn_with_state(state, audit_middleware))
            .layer(middleware::from_fn(inject_auth));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .method("DELETE")
                    .uri(format!("/api/items/{}", new_entity_id()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert!(store.is_empty().await);
    }

    #[test]
    fn test_entity_id_from_path() {
        let id = new_entity_id();
        assert_eq!(entity_id_from_path(&format!("/api/invoices/{}", id)), id);
        assert_eq!(entity_id_from_path("/api/invoices"), Uuid::nil());
    }
}
