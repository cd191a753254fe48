//! Plugin key-value storage.
//!
//! All plugins of one kernel share a single [`PluginStorage`] backend. Each
//! plugin only ever sees a [`ScopedStorage`] view that prefixes its keys with
//! `plugin:<id>:`, so two plugins writing the same logical key never collide.
//!
//! | Type | Role |
//! |------|------|
//! | [`PluginStorage`] | Async backend trait over JSON values |
//! | [`MemoryStorage`] | Default in-process backend |
//! | [`ScopedStorage`] | Per-plugin prefixing view |
//! | [`StorageFactory`] | Builds scoped views |
//! | [`StorageExt`] | Typed `get_as` / `set_as` helpers |
//!
//! ```rust,ignore
//! let backend: Arc<dyn PluginStorage> = Arc::new(MemoryStorage::new());
//! let audit = StorageFactory::create_scoped("audit", backend.clone())?;
//!
//! audit.set_as("last_seen", &42_u64).await?;
//! assert_eq!(backend.keys().await?, ["plugin:audit:last_seen"]);
//! ```

mod memory;
mod scoped;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{StorageError, StorageResult};

pub use memory::MemoryStorage;
pub use scoped::{ScopedStorage, StorageFactory, is_valid_namespace};

/// Asynchronous key → JSON value store.
///
/// Backends must be shareable across tasks; the kernel holds one instance
/// behind `Arc<dyn PluginStorage>`.
#[async_trait]
pub trait PluginStorage: Send + Sync + 'static {
    /// Returns the value stored under `key`.
    async fn get(&self, key: &str) -> StorageResult<Option<Value>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Value) -> StorageResult<()>;

    /// Returns `true` if `key` holds a value.
    async fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Removes `key`; returns `true` if something was removed.
    async fn delete(&self, key: &str) -> StorageResult<bool>;

    /// All keys currently stored, sorted.
    async fn keys(&self) -> StorageResult<Vec<String>>;

    /// Removes every key.
    async fn clear(&self) -> StorageResult<()>;
}

/// Typed access on top of any [`PluginStorage`].
#[async_trait]
pub trait StorageExt: PluginStorage {
    /// Reads `key` and deserializes it into `T`.
    async fn get_as<T>(&self, key: &str) -> StorageResult<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.get(key).await? {
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|source| StorageError::Serialization {
                    key: key.to_string(),
                    source,
                }),
            None => Ok(None),
        }
    }

    /// Serializes `value` and stores it under `key`.
    async fn set_as<T>(&self, key: &str, value: &T) -> StorageResult<()>
    where
        T: Serialize + Sync,
    {
        let value = serde_json::to_value(value).map_err(|source| StorageError::Serialization {
            key: key.to_string(),
            source,
        })?;
        self.set(key, value).await
    }
}

impl<S: PluginStorage + ?Sized> StorageExt for S {}
