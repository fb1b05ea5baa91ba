/*
[INPUT]:  Synchronous get/set/remove calls over string keys
[OUTPUT]: In-memory store and a probing wrapper that never throws
[POS]:    Storage layer - key/value contract and graceful degradation
[UPDATE]: When the key/value contract or degradation policy changes
*/

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tracing::warn;

use crate::error::Result;

const PROBE_KEY: &str = "__walletgate_probe__";

/// Synchronous key/value storage, shaped like the browser's `localStorage`.
pub trait KeyValueStore: Send + Sync {
    fn get_item(&self, key: &str) -> Result<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> Result<()>;
    fn remove_item(&self, key: &str) -> Result<()>;
    /// All keys currently stored
    fn keys(&self) -> Result<Vec<String>>;
}

/// Process-local store, useful for tests and ephemeral sessions
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    data: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get_item(&self, key: &str) -> Result<Option<String>> {
        let guard = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.get(key).cloned())
    }

    fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        guard.remove(key);
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        let guard = self.data.read().unwrap_or_else(PoisonError::into_inner);
        Ok(guard.keys().cloned().collect())
    }
}

/// Wrapper that probes the backend once and then never fails.
///
/// An unavailable backend turns every read into a miss and every write into
/// a no-op.
#[derive(Clone)]
pub struct GuardedStore {
    backend: Option<Arc<dyn KeyValueStore>>,
}

impl GuardedStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        if probe(backend.as_ref()) {
            Self {
                backend: Some(backend),
            }
        } else {
            warn!("persistent storage unavailable; running without persistence");
            Self::unavailable()
        }
    }

    /// Store with no backend at all
    pub fn unavailable() -> Self {
        Self { backend: None }
    }

    /// In-memory backend
    pub fn memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn is_available(&self) -> bool {
        self.backend.is_some()
    }

    pub fn get(&self, key: &str) -> Option<String> {
        let backend = self.backend.as_ref()?;
        match backend.get_item(key) {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "storage read failed");
                None
            }
        }
    }

    /// Returns whether the value was persisted
    pub fn set(&self, key: &str, value: &str) -> bool {
        let Some(backend) = self.backend.as_ref() else {
            return false;
        };
        match backend.set_item(key, value) {
            Ok(()) => true,
            Err(err) => {
                warn!(key, error = %err, "storage write failed");
                false
            }
        }
    }

    pub fn remove(&self, key: &str) {
        if let Some(backend) = self.backend.as_ref()
            && let Err(err) = backend.remove_item(key)
        {
            warn!(key, error = %err, "storage remove failed");
        }
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        let Some(backend) = self.backend.as_ref() else {
            return Vec::new();
        };
        match backend.keys() {
            Ok(keys) => keys.into_iter().filter(|key| key.starts_with(prefix)).collect(),
            Err(err) => {
                warn!(error = %err, "storage key listing failed");
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for GuardedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedStore")
            .field("available", &self.is_available())
            .finish()
    }
}

fn probe(backend: &dyn KeyValueStore) -> bool {
    let written = backend.set_item(PROBE_KEY, PROBE_KEY).is_ok();
    let read_back = written
        && matches!(backend.get_item(PROBE_KEY), Ok(Some(ref value)) if value == PROBE_KEY);
    let removed = backend.remove_item(PROBE_KEY).is_ok();
    read_back && removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConnectError;

    struct BrokenStore;

    impl KeyValueStore for BrokenStore {
        fn get_item(&self, _key: &str) -> Result<Option<String>> {
            Err(ConnectError::Storage("disabled".into()))
        }
        fn set_item(&self, _key: &str, _value: &str) -> Result<()> {
            Err(ConnectError::Storage("quota exceeded".into()))
        }
        fn remove_item(&self, _key: &str) -> Result<()> {
            Err(ConnectError::Storage("disabled".into()))
        }
        fn keys(&self) -> Result<Vec<String>> {
            Err(ConnectError::Storage("disabled".into()))
        }
    }

    #[test]
    fn test_memory_store_basic() {
        let store = MemoryStore::new();
        store.set_item("a", "1").unwrap();
        assert_eq!(store.get_item("a").unwrap(), Some("1".to_string()));
        store.remove_item("a").unwrap();
        assert!(store.get_item("a").unwrap().is_none());
    }

    #[test]
    fn test_probe_leaves_no_trace() {
        let backend = MemoryStore::new();
        let guarded = GuardedStore::new(Arc::new(backend.clone()));
        assert!(guarded.is_available());
        assert!(backend.is_empty());
    }

    #[test]
    fn test_broken_backend_degrades() {
        let guarded = GuardedStore::new(Arc::new(BrokenStore));
        assert!(!guarded.is_available());
        assert!(!guarded.set("key", "value"));
        assert!(guarded.get("key").is_none());
        guarded.remove("key");
        assert!(guarded.keys_with_prefix("").is_empty());
    }
}
