//! Public authentication routes.
//!
//! These are the only mutating routes on the enforcement gate's public
//! allow-list: onboarding, token issuance, and the password-reset stubs
//! (credential recovery itself is delegated to the identity provider).

use axum::{
    extract::State,
    http::{Method, StatusCode},
    routing::post,
    Json, Router,
};
use chrono::Utc;
use khata_core::{new_entity_id, TenantId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::auth::{generate_jwt_token, validate_api_key};
use crate::error::{ApiError, ApiResult};
use crate::registry::RouteRegistry;
use crate::repo::User;
use crate::state::AppState;

// ============================================================================
// REQUEST / RESPONSE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub shop_name: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub api_key: String,
    pub tenant_id: TenantId,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// POST /api/auth/register - provision a tenant and its first (admin) user.
async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<RegisterResponse>)> {
    if req.shop_name.trim().is_empty() {
        return Err(ApiError::missing_field("shop_name"));
    }
    if !req.email.contains('@') {
        return Err(ApiError::invalid_input("email is not valid"));
    }

    let tenant_id = new_entity_id();
    let user_id = new_entity_id();
    let roles = vec!["admin".to_string()];

    state.repo.users.insert(
        tenant_id,
        user_id,
        User {
            user_id,
            tenant_id,
            email: req.email,
            shop_name: req.shop_name,
            roles: roles.clone(),
            created_at: Utc::now(),
        },
    );

    let token = generate_jwt_token(&state.auth_config, user_id, tenant_id, roles)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            user_id,
            tenant_id,
            token,
        }),
    ))
}

/// POST /api/auth/login - exchange an API key for a short-lived JWT.
async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let context = validate_api_key(
        &state.auth_config,
        &req.api_key,
        Some(&req.tenant_id.to_string()),
    )?;

    let token = generate_jwt_token(
        &state.auth_config,
        context.user_id,
        context.tenant_id,
        context.roles,
    )?;

    Ok(Json(LoginResponse {
        user_id: context.user_id,
        tenant_id: context.tenant_id,
        token,
    }))
}

/// POST /api/auth/forgot-password - always responds the same, whether or not
/// the account exists.
async fn forgot_password(
    Json(req): Json<ForgotPasswordRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if !req.email.contains('@') {
        return Err(ApiError::invalid_input("email is not valid"));
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"message": "If the account exists, a reset link has been sent"})),
    ))
}

/// POST /api/auth/reset-password - accepts a reset token issued out of band.
async fn reset_password(
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<(StatusCode, Json<serde_json::Value>)> {
    if req.token.trim().is_empty() {
        return Err(ApiError::missing_field("token"));
    }
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({"message": "Password reset request received"})),
    ))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn create_router(state: AppState, registry: &mut RouteRegistry) -> Router {
    // Intentionally public: these appear on the enforcement allow-list.
    registry.record(Method::POST, "/api/auth/register", &[]);
    registry.record(Method::POST, "/api/auth/login", &[]);
    registry.record(Method::POST, "/api/auth/forgot-password", &[]);
    registry.record(Method::POST, "/api/auth/reset-password", &[]);

    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/forgot-password", post(forgot_password))
        .route("/api/auth/reset-password", post(reset_password))
        .with_state(state)
}
