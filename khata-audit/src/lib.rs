//! Khata Audit - Append-Only Audit Trail
//!
//! Persistence contract and reference implementation for the audit log that
//! every destructive back-office operation must leave behind.
//!
//! Records are immutable after creation: the [`AuditStore`] trait exposes no
//! update or delete. Integrity is protected by a SHA-256 hash chain - each
//! record carries the hash of its predecessor, so removal or tampering
//! anywhere in the trail is detectable by [`AuditStore::verify_integrity`].

pub mod memory;
pub mod record;
pub mod store;

pub use memory::InMemoryAuditStore;
pub use record::{chain_hash, verify_chain, AuditRecord, NewAuditRecord, RETENTION_MONTHS};
pub use store::{AuditError, AuditStore, ChainError, ExportFilter, VerificationReport};
