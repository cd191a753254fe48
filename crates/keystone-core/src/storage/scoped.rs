//! Per-plugin storage namespaces.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::PluginStorage;
use crate::error::{StorageError, StorageResult};

/// Separator between the namespace parts of a backend key.
const SEPARATOR: char = ':';

/// Returns `true` if `plugin_id` yields a namespace that cannot overlap
/// another plugin's.
pub fn is_valid_namespace(plugin_id: &str) -> bool {
    !plugin_id.is_empty() && !plugin_id.contains(SEPARATOR)
}

/// A [`PluginStorage`] view that confines one plugin to its own key prefix.
///
/// Every key is stored in the shared backend as `plugin:<id>:<key>`.
/// [`keys`](PluginStorage::keys) returns this plugin's keys with the prefix
/// stripped and [`clear`](PluginStorage::clear) leaves other plugins' data
/// untouched.
#[derive(Clone)]
pub struct ScopedStorage {
    plugin_id: String,
    prefix: String,
    backend: Arc<dyn PluginStorage>,
}

impl ScopedStorage {
    /// Wraps `backend` for `plugin_id`.
    ///
    /// # Errors
    ///
    /// [`StorageError::InvalidNamespace`] for an empty id or one containing
    /// `':'`.
    pub fn new(plugin_id: impl Into<String>, backend: Arc<dyn PluginStorage>) -> StorageResult<Self> {
        let plugin_id = plugin_id.into();
        if !is_valid_namespace(&plugin_id) {
            return Err(StorageError::InvalidNamespace(plugin_id));
        }
        Ok(Self {
            prefix: format!("plugin:{plugin_id}:"),
            plugin_id,
            backend,
        })
    }

    /// The owning plugin id.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    /// The key prefix applied to every operation.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The shared, unscoped backend.
    pub fn backend(&self) -> &Arc<dyn PluginStorage> {
        &self.backend
    }

    fn scoped(&self, key: &str) -> String {
        format!("{}{key}", self.prefix)
    }
}

#[async_trait]
impl PluginStorage for ScopedStorage {
    async fn get(&self, key: &str) -> StorageResult<Option<Value>> {
        self.backend.get(&self.scoped(key)).await
    }

    async fn set(&self, key: &str, value: Value) -> StorageResult<()> {
        self.backend.set(&self.scoped(key), value).await
    }

    async fn has(&self, key: &str) -> StorageResult<bool> {
        self.backend.has(&self.scoped(key)).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        self.backend.delete(&self.scoped(key)).await
    }

    async fn keys(&self) -> StorageResult<Vec<String>> {
        let keys = self.backend.keys().await?;
        Ok(keys
            .into_iter()
            .filter_map(|k| k.strip_prefix(&self.prefix).map(str::to_string))
            .collect())
    }

    async fn clear(&self) -> StorageResult<()> {
        for key in self.backend.keys().await? {
            if key.starts_with(&self.prefix) {
                self.backend.delete(&key).await?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for ScopedStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedStorage")
            .field("plugin_id", &self.plugin_id)
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

/// Builds [`ScopedStorage`] views over a shared backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageFactory;

impl StorageFactory {
    /// Returns the namespace of `plugin_id` inside `backend`.
    ///
    /// Fails with [`StorageError::InvalidNamespace`] for ids that are empty or
    /// contain `':'`.
    pub fn create_scoped(plugin_id: &str, backend: Arc<dyn PluginStorage>) -> StorageResult<ScopedStorage> {
        ScopedStorage::new(plugin_id, backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStorage, StorageExt};
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    fn shared() -> Arc<dyn PluginStorage> {
        Arc::new(MemoryStorage::new())
    }

    #[tokio::test]
    async fn test_keys_are_prefixed_in_backend() {
        let backend = shared();
        let store = StorageFactory::create_scoped("audit", backend.clone()).unwrap();

        store.set("cursor", json!(3)).await.unwrap();
        assert_eq!(backend.keys().await.unwrap(), ["plugin:audit:cursor"]);
        assert_eq!(store.keys().await.unwrap(), ["cursor"]);
    }

    #[tokio::test]
    async fn test_plugins_do_not_collide() {
        let backend = shared();
        let a = StorageFactory::create_scoped("a", backend.clone()).unwrap();
        let b = StorageFactory::create_scoped("b", backend.clone()).unwrap();

        a.set("k", json!("from a")).await.unwrap();
        b.set("k", json!("from b")).await.unwrap();

        assert_eq!(a.get("k").await.unwrap(), Some(json!("from a")));
        assert_eq!(b.get("k").await.unwrap(), Some(json!("from b")));
        assert!(!a.has("other").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_only_touches_own_namespace() {
        let backend = shared();
        let a = StorageFactory::create_scoped("a", backend.clone()).unwrap();
        let b = StorageFactory::create_scoped("b", backend.clone()).unwrap();
        a.set("x", json!(1)).await.unwrap();
        a.set("y", json!(2)).await.unwrap();
        b.set("x", json!(3)).await.unwrap();

        a.clear().await.unwrap();

        assert!(a.keys().await.unwrap().is_empty());
        assert_eq!(b.keys().await.unwrap(), ["x"]);
        assert!(!a.delete("x").await.unwrap());
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Cursor {
        offset: u64,
        table: String,
    }

    #[tokio::test]
    async fn test_typed_access() {
        let store = StorageFactory::create_scoped("sync", shared()).unwrap();
        let cursor = Cursor {
            offset: 42,
            table: "accounts".into(),
        };

        store.set_as("cursor", &cursor).await.unwrap();
        assert_eq!(store.get_as::<Cursor>("cursor").await.unwrap(), Some(cursor));
        assert_eq!(store.get_as::<Cursor>("absent").await.unwrap(), None);

        store.set("bad", json!("not a cursor")).await.unwrap();
        let err = store.get_as::<Cursor>("bad").await.unwrap_err();
        assert!(matches!(err, crate::error::StorageError::Serialization { ref key, .. } if key == "bad"));
    }

    #[tokio::test]
    async fn test_nested_namespace_rejected() {
        let backend = shared();
        let outer = StorageFactory::create_scoped("a", backend.clone()).unwrap();

        let err = StorageFactory::create_scoped("a:b", backend.clone()).unwrap_err();
        assert!(matches!(err, StorageError::InvalidNamespace(ref id) if id == "a:b"));
        assert!(matches!(
            StorageFactory::create_scoped("", backend.clone()),
            Err(StorageError::InvalidNamespace(_))
        ));
        assert!(outer.keys().await.unwrap().is_empty());
    }
}
