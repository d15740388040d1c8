//! Correlation / request context middleware.
//!
//! Assigns (or propagates) a correlation id per request and collects the
//! client address details the audit layer needs. The context travels as an
//! explicit request extension and a tracing span field; global logging
//! state is never mutated.

use axum::{
    extract::Request,
    http::HeaderValue,
    middleware::Next,
    response::Response,
};
use tracing::Instrument;
use uuid::Uuid;

/// Header used to propagate correlation ids end to end.
pub const CORRELATION_ID_HEADER: &str = "x-correlation-id";

/// Request-scoped context available to downstream middleware and handlers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub correlation_id: String,
    pub client_ip: String,
    pub user_agent: Option<String>,
}

/// Inject [`RequestContext`], run the rest of the stack inside a request
/// span, and echo the correlation id on the response.
pub async fn correlation_middleware(mut request: Request, next: Next) -> Response {
    let correlation_id = request
        .headers()
        .get(CORRELATION_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string())
        .unwrap_or_else(|| Uuid::now_v7().to_string());

    // Behind a proxy the peer address is useless; trust the forwarding
    // header's first hop.
    let client_ip = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let user_agent = request
        .headers()
        .get(axum::http::header::USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    let context = RequestContext {
        correlation_id: correlation_id.clone(),
        client_ip,
        user_agent,
    };
    request.extensions_mut().insert(context);

    let span = tracing::info_span!(
        "request",
        method = %request.method(),
        path = %request.uri().path(),
        correlation_id = %correlation_id,
    );

    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&correlation_id) {
        response.headers_mut().insert(CORRELATION_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request as HttpRequest, middleware, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        async fn handler(request: Request) -> String {
            let context = request
                .extensions()
                .get::<RequestContext>()
                .expect("context must be injected");
            context.correlation_id.clone()
        }

        Router::new()
            .route("/", get(handler))
            .layer(middleware::from_fn(correlation_middleware))
    }

    #[tokio::test]
    async fn test_generates_correlation_id_when_absent() {
        let response = app()
            .oneshot(HttpRequest::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert!(response.headers().contains_key(CORRELATION_ID_HEADER));
    }

    #[tokio::test]
    async fn test_propagates_existing_correlation_id() {
        let response = app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header(CORRELATION_ID_HEADER, "req-42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(
            response.headers().get(CORRELATION_ID_HEADER).unwrap(),
            "req-42"
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"req-42");
    }

    #[tokio::test]
    async fn test_client_ip_from_forwarded_header() {
        async fn handler(request: Request) -> String {
            request
                .extensions()
                .get::<RequestContext>()
                .unwrap()
                .client_ip
                .clone()
        }
        let app = Router::new()
            .route("/", get(handler))
            .layer(middleware::from_fn(correlation_middleware));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/")
                    .header("x-forwarded-for", "203.0.113.7, 10.0.0.1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        assert_eq!(&body[..], b"203.0.113.7");
    }
}
