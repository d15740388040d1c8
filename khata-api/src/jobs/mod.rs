//! Background Jobs for the Khata API
//!
//! This module contains background tasks that run periodically:
//!
//! - `audit_verify`: re-verifies the audit-log hash chain
//!
//! # Usage
//!
//! Background jobs are spawned during server startup:
//!
//! ```ignore
//! use khata_api::jobs::{audit_verify_task, AuditVerifyConfig};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! tokio::spawn(audit_verify_task(
//!     store, environment, alerts, AuditVerifyConfig::default(), shutdown_rx,
//! ));
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod audit_verify;

// Re-export commonly used types
pub use audit_verify::{audit_verify_task, AuditVerifyConfig, AuditVerifyMetrics};
