//! In-process storage backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use super::PluginStorage;
use crate::error::StorageResult;

/// [`PluginStorage`] kept in a sorted in-memory map.
///
/// Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, Value>>,
}

impl MemoryStorage {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[async_trait]
impl PluginStorage for MemoryStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.read().contains_key(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.write().remove(key).is_some())
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        Ok(self.entries.read().keys().cloned().collect())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.entries.write().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_basic_operations() {
        let store = MemoryStorage::new();
        assert_eq!(store.get("k").await.unwrap(), None);

        store.set("k", json!({ "n": 1 })).await.unwrap();
        assert!(store.has("k").await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), Some(json!({ "n": 1 })));

        assert!(store.delete("k").await.unwrap());
        assert!(!store.delete("k").await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_keys_are_sorted_and_clear_empties() {
        let store = MemoryStorage::new();
        store.set("b", json!(2)).await.unwrap();
        store.set("a", json!(1)).await.unwrap();
        assert_eq!(store.keys().await.unwrap(), ["a", "b"]);

        store.clear().await.unwrap();
        assert_eq!(store.len(), 0);
    }
}
