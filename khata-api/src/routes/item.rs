//! Inventory item routes.

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
use crate::repo::Item;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub name: String,
    pub sku: String,
    pub price: f64,
    pub stock_quantity: i64,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub name: Option<String>,
    pub price: Option<f64>,
    pub stock_quantity: Option<i64>,
}

async fn list_items(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
) -> Json<Vec<Item>> {
    let mut items = state.repo.items.list(auth.tenant_id);
    items.sort_by(|a, b| a.sku.cmp(&b.sku));
    Json(items)
}

async fn get_item(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<EntityId>,
) -> ApiResult<Json<Item>> {
    state
        .repo
        .items
        .get(auth.tenant_id, id)
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Item not found"))
}

async fn create_item(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Json(req): Json<CreateItemRequest>,
) -> ApiResult<(StatusCode, Json<Item>)> {
    if req.name.trim().is_empty() {
        return Err(ApiError::missing_field("name"));
    }
    if req.sku.trim().is_empty() {
        return Err(ApiError::missing_field("sku"));
    }
    if req.price < 0.0 {
        return Err(ApiError::invalid_input("price must not be negative"));
    }

    // SKUs are unique within a tenant.
    let duplicate = state
        .repo
        .items
        .list(auth.tenant_id)
        .into_iter()
        .any(|existing| existing.sku == req.sku);
    if duplicate {
        return Err(ApiError::already_exists(format!(
            "Item with SKU '{}' already exists",
            req.sku
        )));
    }

    let now = Utc::now();
    let item = Item {
        item_id: new_entity_id(),
        tenant_id: auth.tenant_id,
        name: req.name,
        sku: req.sku,
        price: req.price,
        stock_quantity: req.stock_quantity,
        created_at: now,
        updated_at: now,
    };
    state.repo.items.insert(auth.tenant_id, item.item_id, item.clone());
    state.cache.invalidate_tenant(auth.tenant_id, "*").await;

    Ok((StatusCode::CREATED, Json(item)))
}

async fn update_item(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<EntityId>,
    Json(req): Json<UpdateItemRequest>,
) -> ApiResult<Response> {
    let before = state
        .repo
        .items
        .get(auth.tenant_id, id)
        .ok_or_else(|| ApiError::not_found("Item not found"))?;

    let mut after = before.clone();
    if let Some(name) = req.name {
        after.name = name;
    }
    if let Some(price) = req.price {
        if price < 0.0 {
            return Err(ApiError::invalid_input("price must not be negative"));
        }
        after.price = price;
    }
    if let Some(stock_quantity) = req.stock_quantity {
        after.stock_quantity = stock_quantity;
    }
    after.updated_at = Utc::now();

    state.repo.items.insert(auth.tenant_id, id, after.clone());
    state.cache.invalidate_tenant(auth.tenant_id, "*").await;

    let response = Json(after.clone()).into_response();
    Ok(with_audit_snapshot(
        response,
        serde_json::to_value(&before).ok(),
        serde_json::to_value(&after).ok(),
    ))
}

async fn delete_item(
    State(state): State<AppState>,
    AuthExtractor(auth): AuthExtractor,
    Path(id): Path<EntityId>,
) -> ApiResult<Response> {
    let deleted = state
        .repo
        .items
        .remove(auth.tenant_id, id)
        .ok_or_else(|| ApiError::not_found("Item not found"))?;

    state.cache.invalidate_tenant(auth.tenant_id, "*").await;

    let response = Json(json!({"deleted": true, "item_id": id})).into_response();
    Ok(with_audit_snapshot(
        response,
        serde_json::to_value(&deleted).ok(),
        None,
    ))
}

pub fn create_router(state: AppState, registry: &mut RouteRegistry) -> Router {
    use MiddlewareTag::*;

    registry.record(Method::GET, "/api/items", &[Authenticate, CacheResponse]);
    registry.record(Method::GET, "/api/items/:id", &[Authenticate, CacheResponse]);
    registry.record(Method::POST, "/api/items", &[Authenticate]);
    registry.record(
        Method::PUT,
        "/api/items/:id",
        &[Authenticate, RequirePermission, AuditMutation],
    );
    registry.record(
        Method::DELETE,
        "/api/items/:id",
        &[Authenticate, RequirePermission, AuditMutation],
    );

    let cache_state = CacheMiddlewareState::new(state.cache.clone(), state.config.cache_ttl);
    let audit_state = AuditLayerState {
        store: state.audit.clone(),
        environment: state.config.environment,
        enabled: state.config.audit_enabled,
        alerts: state.alerts.clone(),
        action: AuditAction::DeleteItem,
    };

    let reads = Router::new()
        .route("/api/items", get(list_items))
        .route("/api/items/:id", get(get_item))
        .layer(from_fn_with_state(cache_state, cache_middleware));

    let creates = Router::new().route("/api/items", post(create_item));

    let updates = Router::new()
        .route("/api/items/:id", put(update_item))
        .layer(from_fn_with_state(
            audit_state.for_action(AuditAction::UpdateItem),
            audit_middleware,
        ))
        .layer(from_fn_with_state(
            PermissionState::role("manager"),
            permission_middleware,
        ));

    let deletes = Router::new()
        .route("/api/items/:id", delete(delete_item))
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
