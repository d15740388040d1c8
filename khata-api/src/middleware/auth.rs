//! Authentication and role-check middleware.
//!
//! `auth_middleware` validates credentials and injects [`AuthContext`] into
//! request extensions; `permission_middleware` gates a route on a required
//! role. The [`AuthExtractor`] gives handlers typed access to the context.

use std::sync::Arc;

use axum::{
    async_trait,
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::Response,
};

use crate::auth::{authenticate, AuthConfig, AuthContext};
use crate::error::ApiError;

// ============================================================================
// MIDDLEWARE STATE
// ============================================================================

/// Shared state for the authentication middleware.
#[derive(Debug, Clone)]
pub struct AuthMiddlewareState {
    pub auth_config: Arc<AuthConfig>,
}

impl AuthMiddlewareState {
    pub fn new(auth_config: Arc<AuthConfig>) -> Self {
        Self { auth_config }
    }
}

// ============================================================================
// AUTH MIDDLEWARE
// ============================================================================

/// Validate request credentials and inject [`AuthContext`].
///
/// Returns 401 for missing/invalid credentials and 400 for a malformed
/// tenant header (via [`ApiError`]'s response mapping).
pub async fn auth_middleware(
    State(state): State<AuthMiddlewareState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let api_key_header = request
        .headers()
        .get("x-api-key")
        .and_then(|h| h.to_str().ok());

    let auth_header = request
        .headers()
        .get("authorization")
        .and_then(|h| h.to_str().ok());

    let tenant_id_header = request
        .headers()
        .get("x-tenant-id")
        .and_then(|h| h.to_str().ok());

    let auth_context = authenticate(
        &state.auth_config,
        api_key_header,
        auth_header,
        tenant_id_header,
    )?;

    request.extensions_mut().insert(auth_context);
    Ok(next.run(request).await)
}

// ============================================================================
// PERMISSION MIDDLEWARE
// ============================================================================

/// Role requirement for a route.
#[derive(Debug, Clone)]
pub struct PermissionState {
    pub required_role: String,
}

impl PermissionState {
    pub fn role(role: &str) -> Self {
        Self {
            required_role: role.to_string(),
        }
    }
}

/// Require the authenticated user to hold a role.
///
/// `admin` passes every check. Must run inside `auth_middleware`.
pub async fn permission_middleware(
    State(state): State<PermissionState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = request
        .extensions()
        .get::<AuthContext>()
        .cloned()
        .ok_or_else(|| {
            ApiError::internal_error(
                "AuthContext not found in request extensions. \
                 Ensure auth_middleware is applied to this route.",
            )
        })?;

    if auth.has_role("admin") || auth.has_role(&state.required_role) {
        Ok(next.run(request).await)
    } else {
        tracing::warn!(
            user_id = %auth.user_id,
            required_role = %state.required_role,
            "permission denied"
        );
        Err(ApiError::forbidden(format!(
            "Requires the '{}' role",
            state.required_role
        )))
    }
}

// ============================================================================
// TYPED EXTRACTOR
// ============================================================================

/// Typed Axum extractor for the authentication context.
///
/// Requires `auth_middleware` on the route; without it the extractor
/// returns a 500 so the missing layer is caught loudly in development.
#[derive(Debug, Clone)]
pub struct AuthExtractor(pub AuthContext);

#[async_trait]
impl<S> FromRequestParts<S> for AuthExtractor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(AuthExtractor)
            .ok_or_else(|| {
                ApiError::internal_error(
                    "AuthContext not found in request extensions. \
                     Ensure auth_middleware is applied to this route.",
                )
            })
    }
}

impl std::ops::Deref for AuthExtractor {
    type Target = AuthContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::generate_jwt_token;
    use axum::{
        body::Body,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use khata_core::new_entity_id;
    use tower::ServiceExt;
    use uuid::Uuid;

    fn test_auth_config() -> AuthConfig {
        let mut config = AuthConfig::default();
        config.jwt_secret = "middleware_test_secret_long_enough!!".to_string();
        config.add_api_key("test_key_123".to_string());
        config
    }

    fn test_app(config: AuthConfig) -> Router {
        let state = AuthMiddlewareState::new(Arc::new(config));
        Router::new()
            .route("/protected", get(|| async { "Protected resource" }))
            .layer(middleware::from_fn_with_state(state, auth_middleware))
    }

    #[tokio::test]
    async fn test_valid_api_key_passes() {
        let app = test_app(test_auth_config());
        let tenant_id = Uuid::now_v7();

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/protected")
                    .header("x-api-key", "test_key_123")
                    .header("x-tenant-id", tenant_id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_invalid_api_key_rejected() {
        let app = test_app(test_auth_config());
        let tenant_id = Uuid::now_v7();

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/protected")
                    .header("x-api-key", "wrong_key")
                    .header("x-tenant-id", tenant_id.to_string())
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_missing_credentials_rejected() {
        let app = test_app(test_auth_config());

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/protected")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_valid_jwt_passes_and_injects_context() {
        let config = test_auth_config();
        let user_id = new_entity_id();
        let tenant_id = new_entity_id();
        let token =
            generate_jwt_token(&config, user_id, tenant_id, vec!["manager".to_string()]).unwrap();

        async fn handler(AuthExtractor(auth): AuthExtractor) -> String {
            format!("{}:{}", auth.user_id, auth.tenant_id)
        }

        let state = AuthMiddlewareState::new(Arc::new(config));
        let app = Router::new()
            .route("/protected", get(handler))
            .layer(middleware::from_fn_with_state(state, auth_middleware));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/protected")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body_str = String::from_utf8(body.to_vec()).unwrap();
        assert_eq!(body_str, format!("{}:{}", user_id, tenant_id));
    }

    #[tokio::test]
    async fn test_permission_middleware_enforces_role() {
        let config = test_auth_config();
        let token = generate_jwt_token(
            &config,
            new_entity_id(),
            new_entity_id(),
            vec!["clerk".to_string()],
        )
        .unwrap();

        let auth_state = AuthMiddlewareState::new(Arc::new(config));
        let app = Router::new()
            .route("/managers-only", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                PermissionState::role("manager"),
                permission_middleware,
            ))
            .layer(middleware::from_fn_with_state(auth_state, auth_middleware));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/managers-only")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_admin_passes_any_permission_check() {
        let config = test_auth_config();
        let token = generate_jwt_token(
            &config,
            new_entity_id(),
            new_entity_id(),
            vec!["admin".to_string()],
        )
        .unwrap();

        let auth_state = AuthMiddlewareState::new(Arc::new(config));
        let app = Router::new()
            .route("/managers-only", get(|| async { "ok" }))
            .layer(middleware::from_fn_with_state(
                PermissionState::role("manager"),
                permission_middleware,
            ))
            .layer(middleware::from_fn_with_state(auth_state, auth_middleware));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/managers-only")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_extractor_without_middleware_is_500() {
        async fn handler(AuthExtractor(_auth): AuthExtractor) -> String {
            "unreachable".to_string()
        }

        let app = Router::new().route("/unprotected", get(handler));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/unprotected")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
