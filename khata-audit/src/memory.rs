//! In-memory audit store.
//!
//! Reference implementation of [`AuditStore`] used by tests and single-node
//! deployments. Appends are serialized through an async RwLock so chain
//! linkage is race-free under concurrent request handlers.

use async_trait::async_trait;
use khata_core::EntityId;
use tokio::sync::RwLock;

use crate::record::{verify_chain, AuditRecord, NewAuditRecord};
use crate::store::{AuditError, AuditStore, ExportFilter, VerificationReport, DEFAULT_EXPORT_LIMIT};

/// Append-only, hash-chained audit store kept in process memory.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records appended so far.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Snapshot of the whole trail in creation order.
    pub async fn all(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, record: NewAuditRecord) -> Result<EntityId, AuditError> {
        // Hold the write lock across tip read + push so two concurrent
        // appends cannot link to the same predecessor.
        let mut records = self.records.write().await;
        let tip = records.last().map(|r| r.record_hash.clone());
        let sealed = AuditRecord::seal(record, tip);
        let record_id = sealed.record_id;
        records.push(sealed);
        Ok(record_id)
    }

    async fn verify_integrity(&self) -> Result<VerificationReport, AuditError> {
        let records = self.records.read().await;
        Ok(verify_chain(&records))
    }

    async fn export(&self, filter: &ExportFilter) -> Result<Vec<AuditRecord>, AuditError> {
        let records = self.records.read().await;
        let limit = filter.limit.unwrap_or(DEFAULT_EXPORT_LIMIT);
        // Newest first.
        Ok(records
            .iter()
            .rev()
            .filter(|r| filter.matches(r))
            .take(limit)
            .cloned()
            .collect())
    }
}
