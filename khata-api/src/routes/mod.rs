//! REST API Routes Module
//!
//! Route modules organized by entity, plus public auth, audit admin, and
//! health endpoints. Every module registers its routes (with typed
//! middleware tags) in the [`RouteRegistry`] while mounting them, so the
//! startup enforcement gate validates exactly the table that will serve
//! traffic.

pub mod audit;
pub mod auth;
pub mod customer;
pub mod health;
pub mod invoice;
pub mod item;

use std::time::Duration;

use axum::{
    http::{header, header::HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    Router,
};
use tower_http::cors::{Any, CorsLayer};

use crate::config::ApiConfig;
use crate::error::ApiResult;
use crate::middleware::{auth_middleware, correlation_middleware, AuthMiddlewareState};
use crate::registry::RouteRegistry;
use crate::state::AppState;

// ============================================================================
// ROUTER ASSEMBLY
// ============================================================================

/// Build the complete application router and its route registry.
///
/// # Middleware Order (outer to inner)
/// 1. CORS (outermost) - handles preflight requests
/// 2. Correlation - request context for every log line
/// 3. Auth (protected routes only) - validates credentials
/// 4. Per-route layers (permission, audit, cache)
///
/// In production, validates the auth configuration before assembling
/// anything. The caller is expected to run the enforcement gate over the
/// returned registry before serving.
pub fn build_router(state: AppState) -> ApiResult<(Router, RouteRegistry)> {
    if state.config.environment.is_production() {
        state.auth_config.validate_for_production()?;
    }

    let mut registry = RouteRegistry::new();
    let auth_state = AuthMiddlewareState::new(state.auth_config.clone());

    // Protected API routes (auth required)
    let protected = Router::new()
        .merge(invoice::create_router(state.clone(), &mut registry))
        .merge(customer::create_router(state.clone(), &mut registry))
        .merge(item::create_router(state.clone(), &mut registry))
        .merge(audit::create_router(state.clone(), &mut registry))
        .layer(from_fn_with_state(auth_state, auth_middleware));

    let cors = build_cors_layer(&state.config);

    let router = Router::new()
        .merge(protected)
        // Public auth routes (on the enforcement allow-list)
        .merge(auth::create_router(state.clone(), &mut registry))
        // Health checks (no auth required)
        .merge(health::create_router(state, &mut registry))
        .layer(from_fn(correlation_middleware))
        .layer(cors);

    Ok((router, registry))
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// In development mode (empty origins), allows all origins.
/// In production mode, only allows configured origins.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
            HeaderName::from_static("x-api-key"),
            HeaderName::from_static("x-tenant-id"),
            HeaderName::from_static("x-correlation-id"),
        ])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: development mode - allowing all origins");
        cors.allow_origin(Any).allow_headers(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: production mode");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}
