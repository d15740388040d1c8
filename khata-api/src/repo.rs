//! In-memory, tenant-scoped repository.
//!
//! Stands in for the external database collaborator behind the route
//! handlers. Every read and write is keyed by `(tenant, entity)` so one
//! tenant can never observe another's rows.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use khata_core::{EntityId, TenantId, UserId};
use serde::{Deserialize, Serialize};

// ============================================================================
// ENTITIES
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    pub invoice_id: EntityId,
    pub tenant_id: TenantId,
    pub invoice_number: String,
    pub customer_id: EntityId,
    pub total: f64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: EntityId,
    pub tenant_id: TenantId,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub item_id: EntityId,
    pub tenant_id: TenantId,
    pub name: String,
    pub sku: String,
    pub price: f64,
    pub stock_quantity: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub user_id: UserId,
    pub tenant_id: TenantId,
    pub email: String,
    pub shop_name: String,
    pub roles: Vec<String>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// COLLECTIONS
// ============================================================================

/// Concurrent, tenant-scoped collection of one entity type.
#[derive(Debug)]
pub struct Collection<T> {
    entries: DashMap<(TenantId, EntityId), T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<T: Clone> Collection<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant_id: TenantId, entity_id: EntityId, value: T) {
        self.entries.insert((tenant_id, entity_id), value);
    }

    pub fn get(&self, tenant_id: TenantId, entity_id: EntityId) -> Option<T> {
        self.entries.get(&(tenant_id, entity_id)).map(|e| e.clone())
    }

    pub fn remove(&self, tenant_id: TenantId, entity_id: EntityId) -> Option<T> {
        self.entries.remove(&(tenant_id, entity_id)).map(|(_, v)| v)
    }

    pub fn list(&self, tenant_id: TenantId) -> Vec<T> {
        self.entries
            .iter()
            .filter(|e| e.key().0 == tenant_id)
            .map(|e| e.value().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Aggregate repository handed to route handlers through `AppState`.
#[derive(Debug, Default)]
pub struct Repo {
    pub invoices: Collection<Invoice>,
    pub customers: Collection<Customer>,
    pub items: Collection<Item>,
    pub users: Collection<User>,
}

impl Repo {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use khata_core::new_entity_id;

    fn customer(tenant_id: TenantId) -> Customer {
        Customer {
            customer_id: new_entity_id(),
            tenant_id,
            name: "Sharma General Store".to_string(),
            phone: Some("+91 98xxxxxx01".to_string()),
            email: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_insert_get_remove() {
        let repo = Repo::new();
        let tenant = new_entity_id();
        let c = customer(tenant);
        let id = c.customer_id;

        repo.customers.insert(tenant, id, c.clone());
        assert_eq!(repo.customers.get(tenant, id).unwrap().name, c.name);

        let removed = repo.customers.remove(tenant, id).unwrap();
        assert_eq!(removed.customer_id, id);
        assert!(repo.customers.get(tenant, id).is_none());
    }

    #[test]
    fn test_list_is_tenant_scoped() {
        let repo = Repo::new();
        let tenant_a = new_entity_id();
        let tenant_b = new_entity_id();

        for _ in 0..3 {
            let c = customer(tenant_a);
            repo.customers.insert(tenant_a, c.customer_id, c);
        }
        let c = customer(tenant_b);
        repo.customers.insert(tenant_b, c.customer_id, c);

        assert_eq!(repo.customers.list(tenant_a).len(), 3);
        assert_eq!(repo.customers.list(tenant_b).len(), 1);
    }

    #[test]
    fn test_cross_tenant_get_misses() {
        let repo = Repo::new();
        let tenant_a = new_entity_id();
        let tenant_b = new_entity_id();
        let c = customer(tenant_a);
        let id = c.customer_id;
        repo.customers.insert(tenant_a, id, c);

        assert!(repo.customers.get(tenant_b, id).is_none());
    }
}
