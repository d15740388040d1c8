//! In-memory store backend.
//!
//! Used by tests and by cache-less development mode (no `KHATA_REDIS_URL`).
//! Honors TTLs lazily on read and supports `*` globs in `keys`, matching
//! the subset of Redis semantics the facade relies on.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::Instant;

use crate::backend::{ConnectionState, StoreBackend, StoreError};

#[derive(Debug)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

/// Process-local [`StoreBackend`] backed by a `HashMap`.
#[derive(Debug)]
pub struct InMemoryBackend {
    entries: Mutex<HashMap<String, Entry>>,
    connected: watch::Sender<ConnectionState>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        let (connected, _) = watch::channel(ConnectionState::Connected);
        Self {
            entries: Mutex::new(HashMap::new()),
            connected,
        }
    }

    /// Flip the simulated connection state, publishing the transition to
    /// subscribers. Lets tests and dev tooling exercise disconnect handling.
    pub fn set_connected(&self, up: bool) {
        let state = if up {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        };
        self.connected.send_replace(state);
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.lock()
            .values()
            .filter(|e| e.expires_at.map(|at| at > now).unwrap_or(true))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_connected(&self) -> Result<(), StoreError> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(StoreError::Disconnected)
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StoreBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.ensure_connected()?;
        let mut entries = self.lock();
        match entries.get(key) {
            Some(entry) => {
                if entry.expires_at.map(|at| at <= Instant::now()).unwrap_or(false) {
                    entries.remove(key);
                    Ok(None)
                } else {
                    Ok(Some(entry.value.clone()))
                }
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StoreError> {
        self.ensure_connected()?;
        self.lock().insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: Some(Instant::now() + ttl),
            },
        );
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.ensure_connected()?;
        let mut entries = self.lock();
        let mut removed = 0u64;
        for key in keys {
            if entries.remove(key).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.ensure_connected()?;
        let now = Instant::now();
        Ok(self
            .lock()
            .iter()
            .filter(|(_, e)| e.expires_at.map(|at| at > now).unwrap_or(true))
            .map(|(k, _)| k)
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect())
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow() == ConnectionState::Connected
    }

    fn connection_events(&self) -> watch::Receiver<ConnectionState> {
        self.connected.subscribe()
    }
}

/// Match a key against a glob pattern supporting `*` wildcards.
fn glob_match(pattern: &str, key: &str) -> bool {
    let segments: Vec<&str> = pattern.split('*').collect();
    if segments.len() == 1 {
        return pattern == key;
    }

    let mut rest = key;
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(segment) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == segments.len() - 1 {
            return rest.ends_with(segment);
        } else {
            match rest.find(segment) {
                Some(pos) => rest = &rest[pos + segment.len()..],
                None => return false,
            }
        }
    }
    true
}
