//! Structured logging and critical alerting.
//!
//! Logging uses `tracing` with an env-filter; correlation ids travel as
//! explicit span fields set by the correlation middleware, never through
//! mutated global loggers. The [`AlertSink`] trait is the seam where
//! production-critical failures (audit persistence, integrity checks) are
//! handed to an external pager; the default sink emits a distinguished log
//! event.

use tracing_subscriber::EnvFilter;

// ============================================================================
// LOGGING
// ============================================================================

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    /// Filter directive, e.g. `info` or `khata_api=debug,info`.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Load from `KHATA_LOG` (filter) and `KHATA_LOG_JSON` ("true" enables
    /// JSON output).
    pub fn from_env() -> Self {
        let filter = std::env::var("KHATA_LOG").unwrap_or_else(|_| "info".to_string());
        let json = std::env::var("KHATA_LOG_JSON")
            .ok()
            .map(|s| s.to_lowercase() == "true")
            .unwrap_or(false);
        Self { filter, json }
    }
}

/// Install the global tracing subscriber. Call once at startup.
pub fn init_telemetry(config: &TelemetryConfig) {
    let filter = EnvFilter::try_new(&config.filter)
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if config.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

// ============================================================================
// CRITICAL ALERTS
// ============================================================================

/// Escalation channel for production-critical failures.
///
/// Wired to a monitoring/paging integration in deployment; the API core
/// only raises the signal.
pub trait AlertSink: Send + Sync + 'static {
    fn critical(&self, source: &str, detail: &str);
}

/// Default sink: emits a distinguished error event for log-based alerting.
#[derive(Debug, Default, Clone)]
pub struct LogAlertSink;

impl AlertSink for LogAlertSink {
    fn critical(&self, source: &str, detail: &str) {
        tracing::error!(alert = true, source, detail, "critical alert raised");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_telemetry_config_defaults() {
        let config = TelemetryConfig::default();
        assert_eq!(config.filter, "info");
        assert!(!config.json);
    }

    #[test]
    fn test_log_alert_sink_does_not_panic() {
        LogAlertSink.critical("unit-test", "detail");
    }
}
