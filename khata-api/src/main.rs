//! Khata API Server Entry Point
//!
//! Bootstraps configuration, connects the backing store, assembles the
//! router, runs the startup enforcement gate, spawns the audit integrity
//! verifier, and serves. A gate failure in production terminates the
//! process with a non-zero status after the violation list has been
//! logged.

use std::net::SocketAddr;
use std::sync::Arc;

use khata_api::config::ApiConfig;
use khata_api::constants::{DEFAULT_BIND_HOST, DEFAULT_BIND_PORT};
use khata_api::error::{ApiError, ApiResult};
use khata_api::jobs::{audit_verify_task, AuditVerifyConfig};
use khata_api::routes::build_router;
use khata_api::state::AppState;
use khata_api::telemetry::{init_telemetry, LogAlertSink, TelemetryConfig};
use khata_api::{enforcement, AuthConfig};
use khata_audit::InMemoryAuditStore;
use khata_cache::{
    CacheConfig, CacheFacade, InMemoryBackend, RedisBackend, RedisConfig, StoreBackend,
};
use tokio::sync::watch;

#[tokio::main]
async fn main() {
    init_telemetry(&TelemetryConfig::from_env());

    if let Err(e) = run().await {
        tracing::error!(error = %e, details = ?e.details, "fatal startup error");
        std::process::exit(1);
    }
}

async fn run() -> ApiResult<()> {
    let config = ApiConfig::from_env();
    let auth_config = AuthConfig::from_env();

    // Backing store: Redis when configured, in-process otherwise.
    let backend: Arc<dyn StoreBackend> = match &config.redis_url {
        Some(url) => {
            let redis = RedisBackend::connect(RedisConfig::new(url.clone()))
                .await
                .map_err(|e| {
                    ApiError::service_unavailable(format!("Failed to connect to Redis: {}", e))
                })?;
            Arc::new(redis)
        }
        None => {
            tracing::warn!("KHATA_REDIS_URL not set; using in-process cache backend");
            Arc::new(InMemoryBackend::new())
        }
    };

    let cache = CacheFacade::new(
        backend,
        CacheConfig::default()
            .with_default_ttl(config.cache_ttl)
            .with_breaker(config.breaker.clone()),
    );

    let audit_store = Arc::new(InMemoryAuditStore::new());
    let alerts = Arc::new(LogAlertSink);

    let state = AppState::new(
        Arc::new(khata_api::repo::Repo::new()),
        cache,
        audit_store.clone(),
        auth_config,
        config.clone(),
        alerts.clone(),
    );

    let (app, registry) = build_router(state.clone())?;

    // Fail closed: in production an incomplete route table never serves.
    enforcement::run_startup_gate(&registry, config.environment, config.audit_enabled)?;

    // Periodic audit-log integrity verification.
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let verifier = tokio::spawn(audit_verify_task(
        audit_store,
        config.environment,
        alerts,
        AuditVerifyConfig {
            check_interval: config.audit_verify_interval,
        },
        shutdown_rx,
    ));

    let addr = resolve_bind_addr()?;
    tracing::info!(%addr, environment = %config.environment, "starting Khata API server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ApiError::internal_error(format!("Failed to bind {}: {}", addr, e)))?;

    let server = axum::serve(listener, app);
    tokio::select! {
        result = server => {
            result.map_err(|e| ApiError::internal_error(format!("Server error: {}", e)))?;
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
        }
    }

    let _ = shutdown_tx.send(true);
    let _ = verifier.await;
    Ok(())
}

fn resolve_bind_addr() -> ApiResult<SocketAddr> {
    let host = std::env::var("KHATA_API_BIND").unwrap_or_else(|_| DEFAULT_BIND_HOST.to_string());
    let port_str = std::env::var("PORT")
        .ok()
        .or_else(|| std::env::var("KHATA_API_PORT").ok())
        .unwrap_or_else(|| DEFAULT_BIND_PORT.to_string());
    let port = port_str
        .parse::<u16>()
        .map_err(|_| ApiError::invalid_input(format!("Invalid port value: {}", port_str)))?;

    let addr = format!("{}:{}", host, port);
    addr.parse::<SocketAddr>()
        .map_err(|e| ApiError::invalid_input(format!("Invalid bind address {}: {}", addr, e)))
}
