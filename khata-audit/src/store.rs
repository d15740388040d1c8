//! Audit persistence contract.

use async_trait::async_trait;
use khata_core::{AuditAction, EntityId, EntityKind, TenantId, Timestamp, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{AuditRecord, NewAuditRecord};

/// Default cap on exported records.
pub const DEFAULT_EXPORT_LIMIT: usize = 10_000;

// ============================================================================
// ERRORS
// ============================================================================

/// Errors surfaced by audit stores.
#[derive(Debug, Clone, Error)]
pub enum AuditError {
    /// The persistence layer could not be reached or failed the operation.
    #[error("audit store unavailable: {reason}")]
    Unavailable { reason: String },
}

impl AuditError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        AuditError::Unavailable {
            reason: reason.into(),
        }
    }
}

// ============================================================================
// VERIFICATION REPORT
// ============================================================================

/// One detected break in the hash chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainError {
    pub record_id: EntityId,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub detail: String,
}

/// Outcome of a full-chain verification pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationReport {
    pub verified: bool,
    pub total_records: u64,
    pub errors: Vec<ChainError>,
}

// ============================================================================
// EXPORT FILTER
// ============================================================================

/// Read-only export filter. All criteria are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct ExportFilter {
    pub tenant_id: Option<TenantId>,
    pub user_id: Option<UserId>,
    pub action: Option<AuditAction>,
    pub entity_kind: Option<EntityKind>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    /// Cap on returned records; `None` uses [`DEFAULT_EXPORT_LIMIT`].
    pub limit: Option<usize>,
}

impl ExportFilter {
    pub fn matches(&self, record: &AuditRecord) -> bool {
        if let Some(tenant_id) = self.tenant_id {
            if record.tenant_id != tenant_id {
                return false;
            }
        }
        if let Some(user_id) = self.user_id {
            if record.user_id != user_id {
                return false;
            }
        }
        if let Some(action) = self.action {
            if record.action != action {
                return false;
            }
        }
        if let Some(entity_kind) = self.entity_kind {
            if record.entity_kind != entity_kind {
                return false;
            }
        }
        if let Some(from) = self.from {
            if record.created_at < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if record.created_at > to {
                return false;
            }
        }
        true
    }
}

// ============================================================================
// STORE TRAIT
// ============================================================================

/// Append-only audit persistence.
///
/// Deliberately exposes no update or delete: records are immutable once
/// appended. Retention-driven archival, if any, is an administrative
/// operation outside this contract.
#[async_trait]
pub trait AuditStore: Send + Sync + 'static {
    /// Append one record to the chain, returning its id.
    async fn append(&self, record: NewAuditRecord) -> Result<EntityId, AuditError>;

    /// Verify the full hash chain in creation order.
    async fn verify_integrity(&self) -> Result<VerificationReport, AuditError>;

    /// Export records matching a filter, newest first.
    async fn export(&self, filter: &ExportFilter) -> Result<Vec<AuditRecord>, AuditError>;
}
