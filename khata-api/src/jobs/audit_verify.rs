//! Audit Log Integrity Verification Task
//!
//! Periodically re-verifies the hash chain over the persisted audit trail
//! to detect tampering or gaps. The task runs once immediately at startup
//! and then on a fixed interval (default 60 minutes).
//!
//! A failed verification is recovered locally - the verifier keeps its
//! schedule - but is logged as critical and, in production, raised through
//! the [`AlertSink`] so an external pager can pick it up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use khata_audit::AuditStore;
use khata_core::Environment;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};

use crate::constants::DEFAULT_AUDIT_VERIFY_INTERVAL_SECS;
use crate::telemetry::AlertSink;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the audit integrity verification task.
#[derive(Debug, Clone)]
pub struct AuditVerifyConfig {
    /// How often to verify the chain (default: 60 minutes)
    pub check_interval: Duration,
}

impl Default for AuditVerifyConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(DEFAULT_AUDIT_VERIFY_INTERVAL_SECS),
        }
    }
}

impl AuditVerifyConfig {
    /// Create AuditVerifyConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `KHATA_AUDIT_VERIFY_INTERVAL_SECS`: interval between runs (default: 3600)
    pub fn from_env() -> Self {
        let check_interval = Duration::from_secs(
            std::env::var("KHATA_AUDIT_VERIFY_INTERVAL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(DEFAULT_AUDIT_VERIFY_INTERVAL_SECS),
        );
        Self { check_interval }
    }

    /// Configuration for development/testing with a short interval.
    pub fn development() -> Self {
        Self {
            check_interval: Duration::from_secs(60),
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Counters tracking verifier activity.
#[derive(Debug, Default)]
pub struct AuditVerifyMetrics {
    /// Verification cycles completed since startup
    pub cycles: AtomicU64,
    /// Cycles that found the chain broken
    pub failures: AtomicU64,
    /// Cycles that errored before producing a report
    pub errors: AtomicU64,
    /// Records covered by the most recent successful verification
    pub last_total: AtomicU64,
}

impl AuditVerifyMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> AuditVerifySnapshot {
        AuditVerifySnapshot {
            cycles: self.cycles.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            last_total: self.last_total.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of verifier metrics at a point in time.
#[derive(Debug, Clone, Copy)]
pub struct AuditVerifySnapshot {
    pub cycles: u64,
    pub failures: u64,
    pub errors: u64,
    pub last_total: u64,
}

// ============================================================================
// BACKGROUND TASK
// ============================================================================

/// Background task that periodically verifies audit-log integrity.
///
/// Runs until the shutdown signal is received. The first interval tick
/// completes immediately, so one verification always happens at startup.
///
/// # Arguments
///
/// * `store` - Audit store exposing `verify_integrity`
/// * `environment` - Gates critical alerting
/// * `alerts` - Escalation channel for production failures
/// * `config` - Check interval
/// * `shutdown_rx` - Watch receiver for the shutdown signal
///
/// # Returns
///
/// Metrics collected during the task's lifetime.
pub async fn audit_verify_task(
    store: Arc<dyn AuditStore>,
    environment: Environment,
    alerts: Arc<dyn AlertSink>,
    config: AuditVerifyConfig,
    mut shutdown_rx: watch::Receiver<bool>,
) -> Arc<AuditVerifyMetrics> {
    let metrics = Arc::new(AuditVerifyMetrics::new());

    let mut ticker = interval(config.check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    tracing::info!(
        check_interval_secs = config.check_interval.as_secs(),
        "audit integrity verification scheduled"
    );

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => {
                if *shutdown_rx.borrow() {
                    tracing::info!("audit integrity verifier shutting down");
                    break;
                }
            }

            _ = ticker.tick() => {
                run_verification(&store, environment, &alerts, &metrics).await;
            }
        }
    }

    let snapshot = metrics.snapshot();
    tracing::info!(
        cycles = snapshot.cycles,
        failures = snapshot.failures,
        errors = snapshot.errors,
        "audit integrity verifier completed"
    );

    metrics
}

/// Perform one verification cycle.
async fn run_verification(
    store: &Arc<dyn AuditStore>,
    environment: Environment,
    alerts: &Arc<dyn AlertSink>,
    metrics: &AuditVerifyMetrics,
) {
    metrics.cycles.fetch_add(1, Ordering::Relaxed);
    tracing::debug!("running audit log integrity verification");

    match store.verify_integrity().await {
        Ok(report) if report.verified => {
            metrics.last_total.store(report.total_records, Ordering::Relaxed);
            tracing::info!(
                total_records = report.total_records,
                "audit log integrity verified"
            );
        }
        Ok(report) => {
            metrics.failures.fetch_add(1, Ordering::Relaxed);
            for error in &report.errors {
                tracing::error!(
                    record_id = %error.record_id,
                    expected = ?error.expected,
                    actual = ?error.actual,
                    detail = %error.detail,
                    "audit chain error"
                );
            }
            tracing::error!(
                errors = report.errors.len(),
                total_records = report.total_records,
                critical = true,
                "audit log integrity check failed"
            );
            if environment.is_production() {
                alerts.critical(
                    "audit-integrity",
                    &format!(
                        "audit log integrity check failed with {} errors across {} records",
                        report.errors.len(),
                        report.total_records
                    ),
                );
            }
        }
        Err(e) => {
            metrics.errors.fetch_add(1, Ordering::Relaxed);
            tracing::error!(error = %e, "audit integrity verification error");
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use khata_audit::{
        AuditError, AuditRecord, ChainError, ExportFilter, NewAuditRecord, VerificationReport,
    };
    use khata_core::new_entity_id;
    use std::sync::Mutex;

    /// Store whose verification outcome is scripted by the test.
    struct ScriptedStore {
        verified: bool,
    }

    #[async_trait]
    impl AuditStore for ScriptedStore {
        async fn append(&self, _record: NewAuditRecord) -> Result<khata_core::EntityId, AuditError> {
            Ok(new_entity_id())
        }

        async fn verify_integrity(&self) -> Result<VerificationReport, AuditError> {
            if self.verified {
                Ok(VerificationReport {
                    verified: true,
                    total_records: 12,
                    errors: vec![],
                })
            } else {
                Ok(VerificationReport {
                    verified: false,
                    total_records: 12,
                    errors: vec![ChainError {
                        record_id: new_entity_id(),
                        expected: Some("aa".repeat(32)),
                        actual: Some("bb".repeat(32)),
                        detail: "hash chain broken - possible tampering or gap".to_string(),
                    }],
                })
            }
        }

        async fn export(&self, _filter: &ExportFilter) -> Result<Vec<AuditRecord>, AuditError> {
            Ok(vec![])
        }
    }

    #[derive(Default)]
    struct RecordingAlertSink {
        raised: Mutex<Vec<String>>,
    }

    impl AlertSink for RecordingAlertSink {
        fn critical(&self, source: &str, detail: &str) {
            self.raised
                .lock()
                .unwrap()
                .push(format!("{}: {}", source, detail));
        }
    }

    #[tokio::test]
    async fn test_config_default_interval() {
        let config = AuditVerifyConfig::default();
        assert_eq!(config.check_interval, Duration::from_secs(3600));
        assert_eq!(
            AuditVerifyConfig::development().check_interval,
            Duration::from_secs(60)
        );
    }

    #[tokio::test]
    async fn test_successful_verification_updates_metrics() {
        let store: Arc<dyn AuditStore> = Arc::new(ScriptedStore { verified: true });
        let alerts: Arc<dyn AlertSink> = Arc::new(RecordingAlertSink::default());
        let metrics = AuditVerifyMetrics::new();

        run_verification(&store, Environment::Production, &alerts, &metrics).await;

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.cycles, 1);
        assert_eq!(snapshot.failures, 0);
        assert_eq!(snapshot.last_total, 12);
    }

    #[tokio::test]
    async fn test_failed_verification_alerts_in_production() {
        let store: Arc<dyn AuditStore> = Arc::new(ScriptedStore { verified: false });
        let sink = Arc::new(RecordingAlertSink::default());
        let alerts: Arc<dyn AlertSink> = sink.clone();
        let metrics = AuditVerifyMetrics::new();

        run_verification(&store, Environment::Production, &alerts, &metrics).await;

        assert_eq!(metrics.snapshot().failures, 1);
        let raised = sink.raised.lock().unwrap();
        assert_eq!(raised.len(), 1);
        assert!(raised[0].starts_with("audit-integrity:"));
    }

    #[tokio::test]
    async fn test_failed_verification_does_not_alert_in_development() {
        let store: Arc<dyn AuditStore> = Arc::new(ScriptedStore { verified: false });
        let sink = Arc::new(RecordingAlertSink::default());
        let alerts: Arc<dyn AlertSink> = sink.clone();
        let metrics = AuditVerifyMetrics::new();

        run_verification(&store, Environment::Development, &alerts, &metrics).await;

        assert_eq!(metrics.snapshot().failures, 1);
        assert!(sink.raised.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_runs_immediately_then_on_interval() {
        let store: Arc<dyn AuditStore> = Arc::new(ScriptedStore { verified: true });
        let alerts: Arc<dyn AlertSink> = Arc::new(RecordingAlertSink::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(audit_verify_task(
            store,
            Environment::Development,
            alerts,
            AuditVerifyConfig {
                check_interval: Duration::from_secs(3600),
            },
            shutdown_rx,
        ));

        // First tick fires immediately.
        tokio::time::advance(Duration::from_millis(10)).await;
        tokio::task::yield_now().await;

        // Two more hourly cycles.
        tokio::time::advance(Duration::from_secs(3600)).await;
        tokio::task::yield_now().await;
        tokio::time::advance(Duration::from_secs(3600)).await;
        tokio::task::yield_now().await;

        shutdown_tx.send(true).unwrap();
        let metrics = handle.await.unwrap();
        assert!(metrics.snapshot().cycles >= 3);
        assert_eq!(metrics.snapshot().failures, 0);
    }

    #[tokio::test]
    async fn test_task_shuts_down_on_signal() {
        let store: Arc<dyn AuditStore> = Arc::new(ScriptedStore { verified: true });
        let alerts: Arc<dyn AlertSink> = Arc::new(RecordingAlertSink::default());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let handle = tokio::spawn(audit_verify_task(
            store,
            Environment::Development,
            alerts,
            AuditVerifyConfig::development(),
            shutdown_rx,
        ));

        shutdown_tx.send(true).unwrap();
        let metrics = handle.await.unwrap();
        // At most the immediate startup cycle ran.
        assert!(metrics.snapshot().cycles <= 1);
    }
}
