//! Response-cache middleware for GET routes.
//!
//! The cache key is derived from the authenticated tenant and the full
//! request path + query. A hit short-circuits with the cached JSON body; a
//! miss runs the handler exactly once per key via the facade's
//! single-flight `get_or_fetch`, capturing the JSON response for caching.
//! The middleware bypasses entirely (falls through to the handler) when the
//! store is disconnected or the circuit breaker is open.
//!
//! Responses that are not cacheable (non-2xx, non-JSON) are handed back to
//! the caller untouched; concurrent waiters joined on such an outcome
//! receive the shared failure as a retryable error.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::CONTENT_TYPE, Method},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use khata_cache::{CacheFacade, FetchError};
use khata_core::TenantId;
use serde_json::Value;

use crate::auth::AuthContext;
use crate::error::ApiError;

// ============================================================================
// MIDDLEWARE STATE
// ============================================================================

/// Shared state for the cache middleware.
#[derive(Clone)]
pub struct CacheMiddlewareState {
    pub cache: CacheFacade,
    pub ttl: Duration,
}

impl CacheMiddlewareState {
    pub fn new(cache: CacheFacade, ttl: Duration) -> Self {
        Self { cache, ttl }
    }
}

/// Deterministic cache key: tenant identity plus full path and query.
fn cache_key(tenant_id: TenantId, uri: &axum::http::Uri) -> String {
    let path_and_query = uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or_else(|| uri.path());
    format!("cache:{}:{}", tenant_id, path_and_query)
}

type PassthroughSlot = Arc<Mutex<Option<Response>>>;

fn take_passthrough(slot: &PassthroughSlot) -> Option<Response> {
    slot.lock().unwrap_or_else(PoisonError::into_inner).take()
}

// ============================================================================
// MIDDLEWARE
// ============================================================================

/// Cache GET responses per tenant with stampede protection.
pub async fn cache_middleware(
    State(state): State<CacheMiddlewareState>,
    request: Request,
    next: Next,
) -> Response {
    if request.method() != Method::GET {
        return next.run(request).await;
    }

    if !state.cache.is_available() {
        tracing::debug!(path = %request.uri().path(), "cache unavailable, bypassing");
        return next.run(request).await;
    }

    let Some(auth) = request.extensions().get::<AuthContext>().cloned() else {
        return next.run(request).await;
    };

    let key = cache_key(auth.tenant_id, request.uri());

    // Non-cacheable responses produced by the winning handler are routed
    // back to it through this slot, since `get_or_fetch` can only share a
    // JSON value (or an error) between waiters.
    let passthrough: PassthroughSlot = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&passthrough);
    let fetch_key = key.clone();

    let result = state
        .cache
        .get_or_fetch(&key, state.ttl, move || async move {
            let response = next.run(request).await;
            capture_json_body(response, &fetch_key, &slot).await
        })
        .await;

    match result {
        Ok(value) => Json(value).into_response(),
        Err(error) => {
            if let Some(response) = take_passthrough(&passthrough) {
                // This caller ran the handler; return its real response.
                response
            } else {
                // Joined waiter: the winner's response was not shareable.
                tracing::debug!(key, error = %error, "shared fetch failed for joined caller");
                ApiError::service_unavailable("Upstream fetch failed, retry the request")
                    .into_response()
            }
        }
    }
}

/// Capture a 2xx JSON body as a cacheable value; stash anything else in the
/// passthrough slot.
async fn capture_json_body(
    response: Response,
    key: &str,
    slot: &PassthroughSlot,
) -> Result<Value, FetchError> {
    let status = response.status();
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/json"))
        .unwrap_or(false);

    if !status.is_success() || !is_json {
        *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(response);
        return Err(FetchError::failed(key, "response is not cacheable"));
    }

    let (parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            return Err(FetchError::failed(key, format!("failed to read body: {}", e)));
        }
    };

    match serde_json::from_slice::<Value>(&bytes) {
        Ok(value) => Ok(value),
        Err(e) => {
            let response = Response::from_parts(parts, Body::from(bytes));
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(response);
            Err(FetchError::failed(key, format!("body is not valid JSON: {}", e)))
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthMethod;
    use axum::{
        body::Body as AxumBody,
        http::{Request as HttpRequest, StatusCode},
        middleware,
        routing::get,
        Router,
    };
    use khata_cache::{CacheConfig, InMemoryBackend};
    use khata_core::new_entity_id;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::ServiceExt;

    fn auth_injector(tenant_id: TenantId) -> impl Clone + Fn(Request, Next) -> futures_util::future::BoxFuture<'static, Response> {
        move |mut request: Request, next: Next| {
            let tenant_id = tenant_id;
            Box::pin(async move {
                request.extensions_mut().insert(AuthContext {
                    user_id: new_entity_id(),
                    tenant_id,
                    roles: vec!["clerk".to_string()],
                    auth_method: AuthMethod::Jwt,
                });
                next.run(request).await
            })
        }
    }

    struct TestHarness {
        router: Router,
        backend: Arc<InMemoryBackend>,
        hits: Arc<AtomicUsize>,
    }

    fn harness(tenant_id: TenantId, json_handler: bool) -> TestHarness {
        let backend = Arc::new(InMemoryBackend::new());
        let cache = CacheFacade::new(backend.clone(), CacheConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));

        let handler_hits = Arc::clone(&hits);
        let handler = move || {
            let handler_hits = Arc::clone(&handler_hits);
            async move {
                let count = handler_hits.fetch_add(1, Ordering::SeqCst) + 1;
                if json_handler {
                    Json(json!({"invocation": count})).into_response()
                } else {
                    format!("plain text {}", count).into_response()
                }
            }
        };

        let router = Router::new()
            .route("/api/reports/sales", get(handler))
            .layer(middleware::from_fn_with_state(
                CacheMiddlewareState::new(cache, Duration::from_secs(300)),
                cache_middleware,
            ))
            .layer(middleware::from_fn(auth_injector(tenant_id)));

        TestHarness {
            router,
            backend,
            hits,
        }
    }

    async fn get_report(router: &Router) -> (StatusCode, Vec<u8>) {
        let response = router
            .clone()
            .oneshot(
                HttpRequest::builder()
                    .uri("/api/reports/sales")
                    .body(AxumBody::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_second_get_is_served_from_cache() {
        let h = harness(new_entity_id(), true);

        let (status, first) = get_report(&h.router).await;
        assert_eq!(status, StatusCode::OK);
        let (_, second) = get_report(&h.router).await;

        // Same body both times, handler invoked once.
        assert_eq!(first, second);
        assert_eq!(h.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_bypasses_when_store_disconnected() {
        let h = harness(new_entity_id(), true);
        h.backend.set_connected(false);

        get_report(&h.router).await;
        get_report(&h.router).await;

        // No caching: the handler ran for every request.
        assert_eq!(h.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_non_json_response_passes_through_uncached() {
        let h = harness(new_entity_id(), false);

        let (status, first) = get_report(&h.router).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first, b"plain text 1");

        let (_, second) = get_report(&h.router).await;
        assert_eq!(second, b"plain text 2");
        assert_eq!(h.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_keys_are_tenant_scoped() {
        let backend = Arc::new(InMemoryBackend::new());
        let cache = CacheFacade::new(backend.clone(), CacheConfig::default());
        let hits = Arc::new(AtomicUsize::new(0));

        let handler_hits = Arc::clone(&hits);
        let handler = move || {
            let handler_hits = Arc::clone(&handler_hits);
            async move {
                handler_hits.fetch_add(1, Ordering::SeqCst);
                Json(json!({"rows": []})).into_response()
            }
        };

        let build = |tenant: TenantId| {
            Router::new()
                .route("/api/reports/sales", get(handler.clone()))
                .layer(middleware::from_fn_with_state(
                    CacheMiddlewareState::new(cache.clone(), Duration::from_secs(300)),
                    cache_middleware,
                ))
                .layer(middleware::from_fn(auth_injector(tenant)))
        };

        let tenant_a = build(new_entity_id());
        let tenant_b = build(new_entity_id());

        get_report(&tenant_a).await;
        get_report(&tenant_b).await;

        // Different tenants never share an entry.
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_cache_key_includes_query() {
        let tenant = new_entity_id();
        let uri: axum::http::Uri = "/api/reports/sales?from=2026-07-01&to=2026-07-31"
            .parse()
            .unwrap();
        let key = cache_key(tenant, &uri);
        assert_eq!(
            key,
            format!("cache:{}:/api/reports/sales?from=2026-07-01&to=2026-07-31", tenant)
        );
    }
}
