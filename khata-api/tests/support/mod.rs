//! Shared setup for integration tests: a fully assembled app over
//! in-memory backends, with handles kept for inspection.

#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use khata_api::auth::generate_jwt_token;
use khata_api::config::ApiConfig;
use khata_api::repo::Repo;
use khata_api::routes::build_router;
use khata_api::state::AppState;
use khata_api::telemetry::LogAlertSink;
use khata_api::{AuthConfig, RouteRegistry};
use khata_audit::InMemoryAuditStore;
use khata_cache::{CacheConfig, CacheFacade, InMemoryBackend, StoreBackend};
use khata_core::{new_entity_id, TenantId};
use serde_json::Value;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub registry: RouteRegistry,
    pub state: AppState,
    pub audit: Arc<InMemoryAuditStore>,
    pub backend: Arc<InMemoryBackend>,
    pub auth_config: AuthConfig,
}

/// Assemble the real router over in-memory infrastructure.
///
/// Must be called within a Tokio runtime (the cache facade spawns its
/// reconnect listener).
pub fn build_test_app() -> TestApp {
    let mut auth_config = AuthConfig::default();
    auth_config.jwt_secret = "integration_test_secret_long_enough!".to_string();
    auth_config.add_api_key("itest_key_123".to_string());

    let backend = Arc::new(InMemoryBackend::new());
    let cache = CacheFacade::new(
        backend.clone() as Arc<dyn StoreBackend>,
        CacheConfig::default(),
    );
    let audit = Arc::new(InMemoryAuditStore::new());

    let state = AppState::new(
        Arc::new(Repo::new()),
        cache,
        audit.clone(),
        auth_config.clone(),
        ApiConfig::default(),
        Arc::new(LogAlertSink),
    );

    let (router, registry) = build_router(state.clone()).expect("router must assemble");

    TestApp {
        router,
        registry,
        state,
        audit,
        backend,
        auth_config,
    }
}

impl TestApp {
    /// JWT for an admin user in the given tenant.
    pub fn admin_token(&self, tenant_id: TenantId) -> String {
        generate_jwt_token(
            &self.auth_config,
            new_entity_id(),
            tenant_id,
            vec!["admin".to_string()],
        )
        .expect("token generation must succeed")
    }

    /// JWT for a clerk (no mutation permissions) in the given tenant.
    pub fn clerk_token(&self, tenant_id: TenantId) -> String {
        generate_jwt_token(
            &self.auth_config,
            new_entity_id(),
            tenant_id,
            vec!["clerk".to_string()],
        )
        .expect("token generation must succeed")
    }

    /// Send one request through the router, returning status and parsed
    /// JSON body (or `Value::Null` for empty / non-JSON bodies).
    pub async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {}", token));
        }

        let request = match body {
            Some(value) => builder
                .header("content-type", "application/json")
                .body(Body::from(value.to_string())),
            None => builder.body(Body::empty()),
        }
        .expect("request must build");

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router must respond");

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body must be readable");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    /// Wait for spawned audit appends to land.
    pub async fn wait_for_audit_records(&self, expected: usize) {
        for _ in 0..200 {
            if self.audit.len().await >= expected {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!(
            "expected {} audit records, found {}",
            expected,
            self.audit.len().await
        );
    }
}
