//! Khata Core - Shared Data Types
//!
//! Pure data structures with no behavior. All other crates depend on this.
//! This crate contains ONLY data types - no business logic and no I/O.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 for timestamp-sortable IDs.
/// UUIDv7 embeds a Unix timestamp, making IDs naturally sortable by creation time.
pub type EntityId = Uuid;

/// Tenant (shop/organization) identifier.
pub type TenantId = Uuid;

/// User identifier.
pub type UserId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId (timestamp-sortable).
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Compute the lowercase hex SHA-256 digest of content.
pub fn sha256_hex(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

// ============================================================================
// ENVIRONMENT
// ============================================================================

/// Deployment environment. Gates fatal-vs-warn behavior in the startup
/// enforcement checks and critical alerting in the audit subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    /// Read the environment from `KHATA_ENVIRONMENT`.
    ///
    /// Accepts `production`/`prod` for production; anything else (including
    /// an unset variable) is treated as development.
    pub fn from_env() -> Self {
        match std::env::var("KHATA_ENVIRONMENT") {
            Ok(v) if matches!(v.to_lowercase().as_str(), "production" | "prod") => {
                Environment::Production
            }
            _ => Environment::Development,
        }
    }

    pub fn is_production(self) -> bool {
        self == Environment::Production
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Production => write!(f, "production"),
        }
    }
}

// ============================================================================
// AUDIT ENUMS
// ============================================================================

/// Kinds of entities the back office audits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityKind {
    Invoice,
    Customer,
    Item,
    Return,
    Payment,
    User,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Audited actions. One variant per destructive or sensitive operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    DeleteInvoice,
    DeleteCustomer,
    DeleteItem,
    DeleteReturn,
    DeletePayment,
    UpdateInvoice,
    UpdateCustomer,
    UpdateItem,
    UpdateReturn,
    UpdatePayment,
    ForceLogout,
    PasswordReset,
    UserRoleChange,
}

impl AuditAction {
    /// The entity kind this action applies to.
    pub fn entity_kind(self) -> EntityKind {
        match self {
            AuditAction::DeleteInvoice | AuditAction::UpdateInvoice => EntityKind::Invoice,
            AuditAction::DeleteCustomer | AuditAction::UpdateCustomer => EntityKind::Customer,
            AuditAction::DeleteItem | AuditAction::UpdateItem => EntityKind::Item,
            AuditAction::DeleteReturn | AuditAction::UpdateReturn => EntityKind::Return,
            AuditAction::DeletePayment | AuditAction::UpdatePayment => EntityKind::Payment,
            AuditAction::ForceLogout
            | AuditAction::PasswordReset
            | AuditAction::UserRoleChange => EntityKind::User,
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // SCREAMING_SNAKE_CASE, matching the serialized form
        let s = serde_json::to_string(self).map_err(|_| std::fmt::Error)?;
        write!(f, "{}", s.trim_matches('"'))
    }
}

// ============================================================================
// ERRORS
// ============================================================================

/// Validation errors shared across crates.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}
