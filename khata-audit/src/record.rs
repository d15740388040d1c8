//! Audit record types and hash chaining.

use chrono::{Months, Utc};
use khata_core::{new_entity_id, AuditAction, EntityId, EntityKind, Timestamp, UserId};
use khata_core::{sha256_hex, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::store::{ChainError, VerificationReport};

/// Default retention horizon: 7 years (compliance standard for financial
/// records).
pub const RETENTION_MONTHS: u32 = 84;

// ============================================================================
// TYPES
// ============================================================================

/// Input for appending one audit record. The store fills in identity,
/// timestamps, chain hashes, and retention.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAuditRecord {
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub action: AuditAction,
    pub entity_kind: EntityKind,
    pub entity_id: EntityId,
    /// Snapshot before the change (for updates) or the deleted entity.
    pub before: Option<Value>,
    /// Snapshot after the change (updates only).
    pub after: Option<Value>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    /// Request-scoped context: correlation id, method, path.
    pub metadata: Value,
}

/// A sealed, immutable audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub record_id: EntityId,
    pub tenant_id: TenantId,
    pub user_id: UserId,
    pub action: AuditAction,
    pub entity_kind: EntityKind,
    pub entity_id: EntityId,
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub ip_address: String,
    pub user_agent: Option<String>,
    pub metadata: Value,
    pub created_at: Timestamp,
    /// Hash of the predecessor record; `None` only for the first record.
    pub previous_hash: Option<String>,
    /// SHA-256 over this record's chained fields.
    pub record_hash: String,
    pub retention_until: Timestamp,
}

impl AuditRecord {
    /// Seal a new record onto the chain whose tip has `previous_hash`.
    pub fn seal(new: NewAuditRecord, previous_hash: Option<String>) -> Self {
        let created_at = Utc::now();
        let record_hash = chain_hash(
            new.user_id,
            new.action,
            new.entity_kind,
            new.entity_id,
            created_at,
            previous_hash.as_deref(),
        );
        Self {
            record_id: new_entity_id(),
            tenant_id: new.tenant_id,
            user_id: new.user_id,
            action: new.action,
            entity_kind: new.entity_kind,
            entity_id: new.entity_id,
            before: new.before,
            after: new.after,
            ip_address: new.ip_address,
            user_agent: new.user_agent,
            metadata: new.metadata,
            created_at,
            previous_hash,
            record_hash,
            retention_until: created_at
                .checked_add_months(Months::new(RETENTION_MONTHS))
                .unwrap_or(created_at),
        }
    }

    /// Recompute this record's hash from its chained fields.
    pub fn expected_hash(&self) -> String {
        chain_hash(
            self.user_id,
            self.action,
            self.entity_kind,
            self.entity_id,
            self.created_at,
            self.previous_hash.as_deref(),
        )
    }
}

// ============================================================================
// HASH CHAIN
// ============================================================================

/// Hash of one record's chained fields.
///
/// The payload is serialized through `serde_json`, which orders map keys
/// deterministically, so the digest is stable across processes.
pub fn chain_hash(
    user_id: UserId,
    action: AuditAction,
    entity_kind: EntityKind,
    entity_id: EntityId,
    created_at: Timestamp,
    previous_hash: Option<&str>,
) -> String {
    let payload = serde_json::json!({
        "userId": user_id,
        "action": action,
        "entityKind": entity_kind.to_string(),
        "entityId": entity_id,
        "timestamp": created_at.to_rfc3339(),
        "previousHash": previous_hash,
    });
    sha256_hex(payload.to_string().as_bytes())
}

/// Walk a chain in creation order and report every break.
///
/// Detects both broken linkage (a record whose `previous_hash` does not
/// match its predecessor) and in-place tampering (a record whose stored
/// hash no longer matches its own fields).
pub fn verify_chain(records: &[AuditRecord]) -> VerificationReport {
    let mut errors = Vec::new();

    for (i, record) in records.iter().enumerate() {
        let expected = record.expected_hash();
        if record.record_hash != expected {
            errors.push(ChainError {
                record_id: record.record_id,
                expected: Some(expected),
                actual: Some(record.record_hash.clone()),
                detail: "record hash does not match record fields - possible tampering".to_string(),
            });
        }

        if i > 0 {
            let predecessor = &records[i - 1];
            if record.previous_hash.as_deref() != Some(predecessor.record_hash.as_str()) {
                errors.push(ChainError {
                    record_id: record.record_id,
                    expected: Some(predecessor.record_hash.clone()),
                    actual: record.previous_hash.clone(),
                    detail: "hash chain broken - possible tampering or gap".to_string(),
                });
            }
        }
    }

    VerificationReport {
        verified: errors.is_empty(),
        total_records: records.len() as u64,
        errors,
    }
}
