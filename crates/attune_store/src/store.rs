//! The keyed-store seam the repository sits on.
//!
//! Named sub-stores hold opaque record bytes. Backends translate their
//! native failures into the contractual codes so the retry layer can
//! classify them.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use thiserror::Error;

/// Sub-store holding encrypted state-check records.
pub const STATE_CHECKS: &str = "state_checks";
/// Sub-store holding the single active baseline.
pub const FACIAL_BASELINE: &str = "facial_baseline";
/// Sub-store for repository metadata: schema version, key salt, wrapped key.
pub const KEYVAL: &str = "keyval";

/// Contractual error codes every backend must map onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreCode {
    /// The store is full. Never retried.
    QuotaExceeded,
    /// The backend's on-disk version is incompatible.
    VersionError,
    /// A transient transaction failure; retryable.
    TransactionAborted,
    NotFound,
}

#[derive(Debug, Error)]
#[error("{code:?}: {message}")]
pub struct KeyedStoreError {
    pub code: StoreCode,
    pub message: String,
}

impl KeyedStoreError {
    pub fn new(code: StoreCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn aborted(message: impl Into<String>) -> Self {
        Self::new(StoreCode::TransactionAborted, message)
    }

    pub fn quota(message: impl Into<String>) -> Self {
        Self::new(StoreCode::QuotaExceeded, message)
    }
}

/// A local keyed store with named sub-stores.
///
/// `open` re-establishes the connection and is called (and retried) before
/// every repository operation; backends with a persistent pool treat it as a
/// health check.
#[async_trait]
pub trait KeyedStore: Send + Sync {
    async fn open(&self) -> Result<(), KeyedStoreError>;
    async fn put(&self, store: &str, key: &str, value: Vec<u8>) -> Result<(), KeyedStoreError>;
    async fn get(&self, store: &str, key: &str) -> Result<Option<Vec<u8>>, KeyedStoreError>;
    /// All records in a sub-store, in unspecified order.
    async fn get_all(&self, store: &str) -> Result<Vec<Vec<u8>>, KeyedStoreError>;
    async fn delete(&self, store: &str, key: &str) -> Result<(), KeyedStoreError>;
}

/// In-memory backend for tests and ephemeral sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    stores: Mutex<HashMap<String, BTreeMap<String, Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyedStore for MemoryStore {
    async fn open(&self) -> Result<(), KeyedStoreError> {
        Ok(())
    }

    async fn put(&self, store: &str, key: &str, value: Vec<u8>) -> Result<(), KeyedStoreError> {
        let mut stores = self.stores.lock().expect("memory store poisoned");
        stores
            .entry(store.to_string())
            .or_default()
            .insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, store: &str, key: &str) -> Result<Option<Vec<u8>>, KeyedStoreError> {
        let stores = self.stores.lock().expect("memory store poisoned");
        Ok(stores.get(store).and_then(|s| s.get(key).cloned()))
    }

    async fn get_all(&self, store: &str) -> Result<Vec<Vec<u8>>, KeyedStoreError> {
        let stores = self.stores.lock().expect("memory store poisoned");
        Ok(stores
            .get(store)
            .map(|s| s.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn delete(&self, store: &str, key: &str) -> Result<(), KeyedStoreError> {
        let mut stores = self.stores.lock().expect("memory store poisoned");
        if let Some(s) = stores.get_mut(store) {
            s.remove(key);
        }
        Ok(())
    }
}
