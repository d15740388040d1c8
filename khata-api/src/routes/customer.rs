//! Customer routes.

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
use crate::repo::Customer;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateCustomerRequest {
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateCustomerRequest {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

async fn list_customers(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
) -> Json<Vec<Customer>> {
    let mut customers = state.repo.customers.list(auth.tenant_id);
    customers.sort_by(|a, b| a.name.cmp(&b.name));
    Json(customers)
}

async fn get_customer(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<EntityId>,
) -> ApiResult<Json<Customer>> {
    state
        .repo
        .customers
        .get(auth.tenant_id, id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Customer not found"))
}

async fn create_customer(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Json(req): Json<CreateCustomerRequest>,
) -> ApiResult<(StatusCode, Json<Customer>)> {
    if req.name.trim().is_empty() {
        return Err(ApiError::missing_field("name"));
    }

    let now = Utc::now();
    let customer = Customer {
        customer_id: new_entity_id(),
        tenant_id: auth.tenant_id,
        name: req.name,
        phone: req.phone,
        email: req.email,
        created_at: now,
        updated_at: now,
    };
    state
        .repo
        .customers
        .insert(auth.tenant_id, customer.customer_id, customer.clone());
    state.cache.invalidate_tenant(auth.tenant_id, "*").await;

    Ok((StatusCode::CREATED, Json(customer)))
}

async fn update_customer(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<EntityId>,
    Json(req): Json<UpdateCustomerRequest>,
) -> ApiResult<Response> {
    let before = state
        .repo
        .customers
        .get(auth.tenant_id, id)
        .ok_or_else(|| ApiError::not_found("Customer not found"))?;

    let mut after = before.clone();
    if let Some(name) = req.name {
        after.name = name;
    }
    if req.phone.is_some() {
        after.phone = req.phone;
    }
    if req.email.is_some() {
        after.email = req.email;
    }
    after.updated_at = Utc::now();

    state.repo.customers.insert(auth.tenant_id, id, after.clone());
    state.cache.invalidate_tenant(auth.tenant_id, "*").await;

    let response = Json(after.clone()).into_response();
    Ok(with_audit_snapshot(
        response,
        serde_json::to_value(&before).ok(),
        serde_json::to_value(&after).ok(),
    ))
}

async fn delete_customer(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<EntityId>,
) -> ApiResult<Response> {
    let deleted = state
        .repo
        .customers
        .remove(auth.tenant_id, id)
        .ok_or_else(|| ApiError::not_found("Customer not found"))?;

    state.cache.invalidate_tenant(auth.tenant_id, "*").await;

    let response = Json(json!({"deleted": true, "customer_id": id})).into_response();
    Ok(with_audit_snapshot(
        response,
        serde_json::to_value(&deleted).ok(),
        None,
    ))
}

pub fn create_router(state: AppState, registry: &mut RouteRegistry) -> Router {
    use MiddlewareTag::*;

    registry.record(Method::GET, "/api/customers", &[Authenticate, CacheResponse]);
    registry.record(Method::GET, "/api/customers/:id", &[Authenticate, CacheResponse]);
    registry.record(Method::POST, "/api/customers", &[Authenticate]);
    registry.record(
        Method::PUT,
        "/api/customers/:id",
        &[Authenticate, RequirePermission, AuditMutation],
    );
    registry.record(
        Method::DELETE,
        "/api/customers/:id",
        &[Authenticate, RequirePermission, AuditMutation],
    );

    let cache_state = CacheMiddlewareState::new(state.cache.clone(), state.config.cache_ttl);
    let audit_state = AuditLayerState {
        store: state.audit.clone(),
        environment: state.config.environment,
        enabled: state.config.audit_enabled,
        alerts: state.alerts.clone(),
        action: AuditAction::DeleteCustomer,
    };

    let reads = Router::new()
        .route("/api/customers", get(list_customers))
        .route("/api/customers/:id", get(get_customer))
        .layer(from_fn_with_state(cache_state, cache_middleware));

    let creates = Router::new().route("/api/customers", post(create_customer));

    let updates = Router::new()
        .route("/api/customers/:id", put(update_customer))
        .layer(from_fn_with_state(
            audit_state.for_action(AuditAction::UpdateCustomer),
            audit_middleware,
        ))
        .layer(from_fn_with_state(
            PermissionState::role("manager"),
            permission_middleware,
        ));

    let deletes = Router::new()
        .route("/api/customers/:id", delete(delete_customer))
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
