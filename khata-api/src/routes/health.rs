//! Health Check Endpoints
//!
//! - /health/ping - simple liveness check
//! - /health/live - process alive check
//! - /health/ready - readiness with cache-layer detail
//!
//! No authentication required. The cache layer is optional infrastructure:
//! a disconnected store or an open breaker degrades the status without
//! making the service unready.

use axum::{extract::State, http::Method, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};

use crate::registry::RouteRegistry;
use crate::state::AppState;

// ============================================================================
// TYPES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HealthDetails>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDetails {
    pub cache: CacheHealth,
    pub version: String,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheHealth {
    pub available: bool,
    pub breaker_state: String,
    pub hits: u64,
    pub misses: u64,
    pub breaker_rejections: u64,
}

// ============================================================================
// HANDLERS
// ============================================================================

/// GET /health/ping - simple pong response
async fn ping() -> impl IntoResponse {
    (StatusCode::OK, "pong")
}

/// GET /health/live - process liveness check
async fn liveness() -> impl IntoResponse {
    let response = HealthResponse {
        status: HealthStatus::Healthy,
        message: Some("Process is alive".to_string()),
        details: None,
    };
    (StatusCode::OK, Json(response))
}

/// GET /health/ready - readiness with cache-layer detail
async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let breaker = state.cache.breaker_snapshot();
    let metrics = state.cache.metrics_snapshot();
    let available = state.cache.is_available();

    let status = if available {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
    };

    let response = HealthResponse {
        status,
        message: None,
        details: Some(HealthDetails {
            cache: CacheHealth {
                available,
                breaker_state: breaker.state.to_string(),
                hits: metrics.hits,
                misses: metrics.misses,
                breaker_rejections: metrics.breaker_rejections,
            },
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: state.start_time.elapsed().as_secs(),
        }),
    };

    (StatusCode::OK, Json(response))
}

// ============================================================================
// ROUTER
// ============================================================================

/// Create health check router (no auth required)
pub fn create_router(state: AppState, registry: &mut RouteRegistry) -> Router {
    registry.record(Method::GET, "/health/ping", &[]);
    registry.record(Method::GET, "/health/live", &[]);
    registry.record(Method::GET, "/health/ready", &[]);

    Router::new()
        .route("/health/ping", get(ping))
        .route("/health/live", get(liveness))
        .route("/health/ready", get(readiness))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_serialization() {
        let response = HealthResponse {
            status: HealthStatus::Healthy,
            message: Some("All systems operational".to_string()),
            details: None,
        };

        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"status\":\"healthy\""));
        assert!(!json.contains("details"));
    }

    #[test]
    fn test_cache_health_structure() {
        let details = HealthDetails {
            cache: CacheHealth {
                available: false,
                breaker_state: "open".to_string(),
                hits: 10,
                misses: 4,
                breaker_rejections: 2,
            },
            version: "0.3.0".to_string(),
            uptime_seconds: 120,
        };

        let json = serde_json::to_string(&details).unwrap();
        assert!(json.contains("\"breaker_state\":\"open\""));
        assert!(json.contains("\"uptime_seconds\":120"));
    }
}
