//! Per-plugin view over the kernel's shared state.
//!
//! One [`SharedContext`] exists per kernel and owns the single
//! [`ServiceRegistry`], the single [`EventBus`] and the storage backend. Each
//! plugin receives a [`PluginContext`]: a cheap, cloneable handle onto that
//! shared state plus the plugin's own storage namespace, logger and
//! configuration section.
//!
//! ```rust,ignore
//! async fn init(&self, ctx: &PluginContext) -> Result<(), BoxError> {
//!     let cfg: AuditConfig = ctx.config()?;
//!     ctx.register_service("audit.log", AuditLog::new(cfg.retention));
//!
//!     ctx.hook("data:created", |event| async move {
//!         info!(record = ?event.arg(0), "created");
//!         Ok(())
//!     });
//!
//!     ctx.storage().set_as("installed_at", &now()).await?;
//!     Ok(())
//! }
//! ```

use std::any::Any;
use std::future::Future;
use std::sync::{Arc, Weak};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use keystone_core::{
    BoxError, EventBus, HookEvent, PluginLogger, PluginStorage, RegisterOptions, ScopedStorage,
    ServiceArc, ServiceRegistry, ServiceResult, TriggerReport,
};

use crate::kernel::{Kernel, KernelInner};

// ─── SharedContext ────────────────────────────────────────────────────────────

/// State shared by every plugin of one kernel.
pub(crate) struct SharedContext {
    pub(crate) services: ServiceRegistry,
    pub(crate) events: EventBus,
    pub(crate) storage: Arc<dyn PluginStorage>,
}

impl SharedContext {
    pub(crate) fn new(storage: Arc<dyn PluginStorage>) -> Self {
        Self {
            services: ServiceRegistry::new(),
            events: EventBus::new(),
            storage,
        }
    }
}

// ─── PluginContext ────────────────────────────────────────────────────────────

/// The context handed to a plugin's lifecycle hooks.
///
/// Cloning is cheap; every clone refers to the same shared registry and bus.
#[derive(Clone)]
pub struct PluginContext {
    plugin_id: String,
    shared: Arc<SharedContext>,
    storage: ScopedStorage,
    logger: PluginLogger,
    config: Arc<Value>,
    kernel: Weak<KernelInner>,
}

impl PluginContext {
    pub(crate) fn new(
        plugin_id: &str,
        shared: Arc<SharedContext>,
        storage: ScopedStorage,
        config: Value,
        kernel: Weak<KernelInner>,
    ) -> Self {
        Self {
            plugin_id: plugin_id.to_string(),
            storage,
            logger: PluginLogger::new(plugin_id),
            config: Arc::new(config),
            shared,
            kernel,
        }
    }

    /// Id of the plugin this context belongs to.
    pub fn plugin_id(&self) -> &str {
        &self.plugin_id
    }

    pub fn logger(&self) -> &PluginLogger {
        &self.logger
    }

    /// This plugin's storage namespace (`plugin:<id>:`).
    pub fn storage(&self) -> &ScopedStorage {
        &self.storage
    }

    /// Deserializes this plugin's configuration section into `T`.
    ///
    /// An absent section is an empty object, so structs marked
    /// `#[serde(default)]` always deserialize.
    pub fn config<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        T::deserialize(self.config.as_ref())
    }

    /// The raw configuration section.
    pub fn config_value(&self) -> &Value {
        &self.config
    }

    // ─── Services ────────────────────────────────────────────────────────────

    /// Publishes `value` under `name` in the shared registry.
    ///
    /// An existing entry is replaced with a warning.
    pub fn register_service<T>(&self, name: impl Into<String>, value: T)
    where
        T: Any + Send + Sync,
    {
        self.register_service_arc(name, Arc::new(value), RegisterOptions::default());
    }

    /// Publishes `value` with explicit options, e.g. an intentional override.
    pub fn register_service_with<T>(&self, name: impl Into<String>, value: T, options: RegisterOptions)
    where
        T: Any + Send + Sync,
    {
        self.register_service_arc(name, Arc::new(value), options);
    }

    /// Publishes an already shared value.
    pub fn register_service_arc(&self, name: impl Into<String>, value: ServiceArc, options: RegisterOptions) {
        let name = name.into();
        debug!(plugin = %self.plugin_id, service = %name, "Plugin publishing service");
        self.shared.services.register_arc(name, value, options);
    }

    /// Looks up a service by name and type.
    pub fn get_service<T>(&self, name: &str) -> ServiceResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.shared.services.get(name)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.shared.services.has(name)
    }

    /// The shared registry.
    pub fn services(&self) -> &ServiceRegistry {
        &self.shared.services
    }

    // ─── Events ──────────────────────────────────────────────────────────────

    /// Appends a handler for `event` on the shared bus.
    pub fn hook<F, Fut>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(Arc<HookEvent>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        let event = event.into();
        debug!(plugin = %self.plugin_id, event = %event, "Plugin hooking event");
        self.shared.events.hook(event, handler);
    }

    /// Triggers `event` on the shared bus.
    pub async fn trigger(&self, event: &str, args: Vec<Value>) -> TriggerReport {
        self.shared.events.trigger(event, args).await
    }

    /// The shared bus.
    pub fn events(&self) -> &EventBus {
        &self.shared.events
    }

    /// The owning kernel, or `None` once it has been dropped.
    pub fn kernel(&self) -> Option<Kernel> {
        self.kernel.upgrade().map(Kernel::from_inner)
    }
}

impl std::fmt::Debug for PluginContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginContext")
            .field("plugin_id", &self.plugin_id)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
