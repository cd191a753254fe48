//! Shared service registry.
//!
//! The [`ServiceRegistry`] is the dependency-injection container shared by
//! every plugin of one kernel. Values are stored type-erased as
//! [`ServiceArc`] and recovered with a typed downcast.
//!
//! # Overwrite policy
//!
//! Service names are unique at any instant; the last writer wins.
//! [`register`](ServiceRegistry::register) replaces an existing entry and logs
//! a warning, which supports plugins that supersede a placeholder registered
//! earlier. Callers that replace on purpose use
//! [`register_with`](ServiceRegistry::register_with) with
//! [`RegisterOptions::overwrite`] to make the intent explicit.
//!
//! ```rust,ignore
//! let registry = ServiceRegistry::new();
//! registry.register("mailer", NoopMailer);
//! registry.register_with("mailer", SmtpMailer::new(cfg), RegisterOptions::overwrite());
//!
//! let mailer: Arc<SmtpMailer> = registry.get("mailer")?;
//! ```

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::{ServiceError, ServiceResult};

/// Type-erased service value as stored in the registry.
pub type ServiceArc = Arc<dyn Any + Send + Sync>;

// ─── RegisterOptions ──────────────────────────────────────────────────────────

/// Options accepted by [`ServiceRegistry::register_with`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegisterOptions {
    /// Replace an existing entry without logging a warning.
    pub overwrite: bool,
}

impl RegisterOptions {
    /// Options for an intentional replacement of an existing service.
    pub const fn overwrite() -> Self {
        Self { overwrite: true }
    }
}

// ─── ServiceRegistry ──────────────────────────────────────────────────────────

/// Name → instance map shared by all plugins.
///
/// The lock is held only for the synchronous map operation, never across an
/// `.await`, so service lookups are safe from inside any hook or handler.
#[derive(Default)]
pub struct ServiceRegistry {
    services: RwLock<HashMap<String, ServiceArc>>,
}

impl ServiceRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `value` under `name`, replacing (with a warning) any
    /// previous entry.
    pub fn register<T>(&self, name: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.register_arc(name, Arc::new(value), RegisterOptions::default());
    }

    /// Registers `value` under `name` with explicit options.
    pub fn register_with<T>(&self, name: impl Into<String>, value: T, options: RegisterOptions)
    where
        T: Any + Send + Sync,
    {
        self.register_arc(name, Arc::new(value), options);
    }

    /// Registers an already shared value.
    ///
    /// Useful when the registering plugin keeps its own handle to the service.
    pub fn register_arc(&self, name: impl Into<String>, value: ServiceArc, options: RegisterOptions) {
        let name = name.into();
        let previous = self.services.write().insert(name.clone(), value);

        match (previous.is_some(), options.overwrite) {
            (true, false) => warn!(
                service = %name,
                "Service already registered, overwriting previous instance"
            ),
            (true, true) => debug!(service = %name, "Service explicitly overridden"),
            (false, _) => debug!(service = %name, "Service registered"),
        }
    }

    /// Returns the service registered under `name` as `Arc<T>`.
    ///
    /// # Errors
    ///
    /// - [`ServiceError::NotFound`] when nothing is registered under `name`.
    /// - [`ServiceError::TypeMismatch`] when the stored value is not a `T`.
    pub fn get<T>(&self, name: &str) -> ServiceResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        let raw = self.get_raw(name)?;
        raw.downcast::<T>().map_err(|_| ServiceError::TypeMismatch {
            name: name.to_string(),
            expected: type_name::<T>(),
        })
    }

    /// Returns the untyped service registered under `name`.
    pub fn get_raw(&self, name: &str) -> ServiceResult<ServiceArc> {
        self.services
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ServiceError::NotFound(name.to_string()))
    }

    /// Returns `true` if a service is registered under `name`.
    pub fn has(&self, name: &str) -> bool {
        self.services.read().contains_key(name)
    }

    /// Removes the service registered under `name`.
    ///
    /// Returns `true` if an entry was removed.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.services.write().remove(name).is_some();
        if removed {
            debug!(service = %name, "Service unregistered");
        }
        removed
    }

    /// Returns all registered service names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.services.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Returns the number of registered services.
    pub fn len(&self) -> usize {
        self.services.read().len()
    }

    /// Returns `true` if no service is registered.
    pub fn is_empty(&self) -> bool {
        self.services.read().is_empty()
    }
}

impl std::fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("services", &self.list())
            .finish()
    }
}
