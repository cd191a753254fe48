//! The kernel: plugin registration, bootstrap and shutdown.
//!
//! [`Kernel`] owns every registered plugin and drives it through
//!
//! ```text
//! Registered ──init──► Initialized ──start──► Started ──destroy──► Destroyed
//!      └──────────────────────┴─────── failure ─────────┴────────► Error
//! ```
//!
//! # Bootstrap
//!
//! 1. `kernel:init` is triggered.
//! 2. The dependency graph is resolved; a structural fault aborts before any
//!    plugin hook runs.
//! 3. `init` runs for every plugin in resolved order, each after re-checking
//!    that its dependencies are initialized.
//! 4. `start` runs for every plugin in the same order, then `plugin:started`
//!    is triggered for it.
//! 5. `kernel:ready` is triggered.
//!
//! A failing `init` or `start` aborts bootstrap and marks the plugin
//! [`PluginState::Error`].
//!
//! # Shutdown
//!
//! `kernel:shutdown` is triggered, then `destroy` runs for every plugin whose
//! `init` completed, in exact reverse bootstrap order. A plugin whose `start`
//! failed is still destroyed. Failures are logged, recorded on
//! the plugin and returned in the [`ShutdownReport`]; they never stop the
//! remaining plugins from being destroyed.
//!
//! ```rust,ignore
//! let kernel = Kernel::builder()
//!     .hook_timeout(Duration::from_secs(10))
//!     .plugin_config("audit", json!({ "retention_days": 30 }))
//!     .build();
//!
//! kernel.use_plugin(Db).use_plugin(Objects).use_plugin(Audit);
//! kernel.bootstrap().await?;
//! // …
//! let report = kernel.shutdown().await;
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tracing::{Instrument, Level, debug, error, info, span, warn};

use keystone_core::{
    BoxError, DependencyNode, DependencyResolver, EventBus, MemoryStorage, PluginStorage,
    ServiceRegistry, ServiceResult, StorageFactory, describe_panic,
};

use crate::context::{PluginContext, SharedContext};
use crate::error::{KernelError, KernelResult, LifecyclePhase, PluginError, PluginErrorKind};
use crate::events;
use crate::plugin::{Plugin, PluginCapability, PluginDescriptor, PluginState};

// =============================================================================
// Configuration
// =============================================================================

/// Tunables applied to every plugin of a kernel.
#[derive(Debug, Clone, Default)]
pub struct KernelConfig {
    /// Upper bound for a single lifecycle hook. `None` waits indefinitely.
    pub hook_timeout: Option<Duration>,
    /// Per-plugin configuration sections, keyed by plugin id.
    pub plugins: HashMap<String, Value>,
}

impl KernelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = Some(timeout);
        self
    }

    pub fn plugin_config(mut self, id: impl Into<String>, section: Value) -> Self {
        self.plugins.insert(id.into(), section);
        self
    }
}

/// Overall progress of a kernel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KernelStatus {
    #[default]
    Created,
    Bootstrapping,
    Running,
    /// Bootstrap aborted; `shutdown` may still clean up.
    Failed,
    ShuttingDown,
    Stopped,
}

impl std::fmt::Display for KernelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Created => "created",
            Self::Bootstrapping => "bootstrapping",
            Self::Running => "running",
            Self::Failed => "failed",
            Self::ShuttingDown => "shutting down",
            Self::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Outcome of [`Kernel::shutdown`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Plugins destroyed successfully, in destroy order.
    pub destroyed: Vec<String>,
    /// Contained `destroy` failures, in destroy order.
    pub errors: Vec<PluginError>,
}

impl ShutdownReport {
    /// Returns `true` if every `destroy` succeeded.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

// =============================================================================
// Internal state
// =============================================================================

struct PluginEntry {
    descriptor: PluginDescriptor,
    plugin: Arc<dyn Plugin>,
    context: PluginContext,
    state: PluginState,
    /// Set once `init` succeeds; survives a later move to `Error`.
    initialized: bool,
    error: Option<String>,
}

#[derive(Default)]
struct Registry {
    status: KernelStatus,
    entries: Vec<PluginEntry>,
    index: HashMap<String, usize>,
    /// Resolved bootstrap order plus late activations.
    order: Vec<String>,
}

impl Registry {
    fn entry(&self, id: &str) -> Option<&PluginEntry> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    fn entry_mut(&mut self, id: &str) -> Option<&mut PluginEntry> {
        self.index.get(id).map(|&i| &mut self.entries[i])
    }
}

/// Everything a hook invocation needs, cloned out of the registry so no lock
/// is held while the hook runs.
struct HookTarget {
    plugin: Arc<dyn Plugin>,
    context: PluginContext,
    descriptor: PluginDescriptor,
    state: PluginState,
    initialized: bool,
}

pub(crate) struct KernelInner {
    config: KernelConfig,
    shared: Arc<SharedContext>,
    registry: RwLock<Registry>,
}

// =============================================================================
// Kernel
// =============================================================================

/// Plugin orchestrator.
///
/// `Kernel` is a cheap handle: clones share the same plugins and state.
#[derive(Clone)]
pub struct Kernel {
    inner: Arc<KernelInner>,
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

impl Kernel {
    /// Creates a kernel with default configuration and in-memory storage.
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Creates a kernel with `config` and in-memory storage.
    pub fn with_config(config: KernelConfig) -> Self {
        Self::builder().config(config).build()
    }

    pub fn builder() -> KernelBuilder {
        KernelBuilder::default()
    }

    pub(crate) fn from_inner(inner: Arc<KernelInner>) -> Self {
        Self { inner }
    }

    // ─── Registration ────────────────────────────────────────────────────────

    /// Registers `plugin`. Chainable.
    ///
    /// - An id that is already registered is ignored with a warning.
    /// - An empty id, or one containing `':'`, is ignored with an error.
    /// - After `bootstrap` the plugin is accepted but stays
    ///   [`PluginState::Registered`] until [`activate`](Self::activate).
    pub fn use_plugin<P: Plugin>(&self, plugin: P) -> &Self {
        self.use_plugin_arc(Arc::new(plugin))
    }

    /// Registers an already shared plugin.
    pub fn use_plugin_arc(&self, plugin: Arc<dyn Plugin>) -> &Self {
        let descriptor = PluginDescriptor::of(plugin.as_ref());
        let id = descriptor.id.clone();

        let storage = match StorageFactory::create_scoped(&id, Arc::clone(&self.inner.shared.storage)) {
            Ok(storage) => storage,
            Err(e) => {
                error!(plugin = %id, error = %e, "Invalid plugin id; plugin ignored");
                return self;
            }
        };

        let mut registry = self.inner.registry.write();
        if registry.index.contains_key(&id) {
            warn!(plugin = %id, "Plugin already registered; duplicate ignored");
            return self;
        }
        if registry.status != KernelStatus::Created {
            warn!(
                plugin = %id,
                status = %registry.status,
                "Plugin registered after bootstrap; call `activate` to start it"
            );
        }

        let config = self
            .inner
            .config
            .plugins
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()));
        let context = PluginContext::new(
            &id,
            Arc::clone(&self.inner.shared),
            storage,
            config,
            Arc::downgrade(&self.inner),
        );

        info!(
            plugin       = %id,
            version      = descriptor.version.as_deref().unwrap_or("-"),
            dependencies = ?descriptor.dependencies,
            "Plugin registered"
        );

        let position = registry.entries.len();
        registry.index.insert(id, position);
        registry.entries.push(PluginEntry {
            descriptor,
            plugin,
            context,
            state: PluginState::Registered,
            initialized: false,
            error: None,
        });
        drop(registry);
        self
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Resolves dependencies, then initializes and starts every plugin.
    ///
    /// # Errors
    ///
    /// - [`KernelError::AlreadyBootstrapped`] on any call after the first.
    /// - [`KernelError::Dependency`] for a malformed graph; no hook has run.
    /// - [`KernelError::Plugin`] when an `init` or `start` hook fails.
    /// - [`KernelError::UnsatisfiedDependency`] if a dependency is unexpectedly
    ///   not initialized.
    pub async fn bootstrap(&self) -> KernelResult<()> {
        {
            let mut registry = self.inner.registry.write();
            if registry.status != KernelStatus::Created {
                warn!(status = %registry.status, "Kernel bootstrap requested twice");
                return Err(KernelError::AlreadyBootstrapped);
            }
            registry.status = KernelStatus::Bootstrapping;
        }

        let started = Instant::now();
        info!(plugins = self.plugin_count(), "Bootstrapping kernel");
        self.trigger_lifecycle(events::KERNEL_INIT).await;

        let result = self.run_bootstrap().await;
        self.set_status(if result.is_ok() {
            KernelStatus::Running
        } else {
            KernelStatus::Failed
        });

        match &result {
            Ok(()) => {
                info!(
                    plugins    = self.plugin_count(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Kernel ready"
                );
                self.trigger_lifecycle(events::KERNEL_READY).await;
            }
            Err(e) => error!(error = %e, "Kernel bootstrap failed"),
        }
        result
    }

    async fn run_bootstrap(&self) -> KernelResult<()> {
        let nodes: Vec<DependencyNode> = self
            .inner
            .registry
            .read()
            .entries
            .iter()
            .map(|e| DependencyNode::new(e.descriptor.id.clone(), e.descriptor.dependencies.clone()))
            .collect();

        let order = DependencyResolver::resolve(&nodes)?;
        info!(order = ?order, "Bootstrap order resolved");
        self.inner.registry.write().order = order.clone();

        for id in &order {
            self.init_plugin(id).await?;
        }
        for id in &order {
            self.start_plugin(id).await?;
        }
        Ok(())
    }

    /// Initializes and starts a plugin registered after bootstrap.
    ///
    /// The plugin is appended to the bootstrap order, so shutdown destroys it
    /// before everything that was running when it was activated. Activating a
    /// plugin that is already started is a no-op.
    ///
    /// # Errors
    ///
    /// - [`KernelError::NotRunning`] unless bootstrap succeeded.
    /// - [`KernelError::UnknownPlugin`] for an unregistered id.
    /// - [`KernelError::InvalidState`] for a plugin that failed or was destroyed.
    /// - [`KernelError::UnsatisfiedDependency`] / [`KernelError::Plugin`] as in
    ///   bootstrap.
    pub async fn activate(&self, id: &str) -> KernelResult<()> {
        {
            let mut registry = self.inner.registry.write();
            if registry.status != KernelStatus::Running {
                return Err(KernelError::NotRunning);
            }
            let Some(entry) = registry.entry(id) else {
                return Err(KernelError::UnknownPlugin(id.to_string()));
            };
            match entry.state {
                PluginState::Registered => {}
                PluginState::Started => {
                    debug!(plugin = %id, "Plugin already active");
                    return Ok(());
                }
                state => {
                    return Err(KernelError::InvalidState {
                        plugin: id.to_string(),
                        state,
                    });
                }
            }
            registry.order.push(id.to_string());
        }

        info!(plugin = %id, "Activating late plugin");
        self.init_plugin(id).await?;
        self.start_plugin(id).await
    }

    /// Destroys every plugin whose `init` completed, in reverse bootstrap order.
    ///
    /// Never fails; `destroy` errors are collected in the returned report.
    /// Calling it again after completion returns an empty report.
    pub async fn shutdown(&self) -> ShutdownReport {
        let order = {
            let mut registry = self.inner.registry.write();
            if matches!(
                registry.status,
                KernelStatus::ShuttingDown | KernelStatus::Stopped
            ) {
                debug!("Kernel already shut down");
                return ShutdownReport::default();
            }
            registry.status = KernelStatus::ShuttingDown;
            registry.order.clone()
        };

        info!(plugins = order.len(), "Shutting down kernel");
        self.trigger_lifecycle(events::KERNEL_SHUTDOWN).await;

        let mut report = ShutdownReport::default();
        for id in order.iter().rev() {
            let Some(target) = self.hook_target(id) else {
                continue;
            };
            if !target.initialized {
                debug!(plugin = %id, state = %target.state, "Plugin not initialized; nothing to destroy");
                continue;
            }

            if target.descriptor.capabilities.contains(PluginCapability::Destroy) {
                let span = span!(Level::DEBUG, "lifecycle", plugin = %id, phase = "destroy");
                let outcome = self
                    .guarded(id, LifecyclePhase::Destroy, target.plugin.destroy())
                    .instrument(span)
                    .await;
                if let Err(err) = outcome {
                    error!(
                        plugin = %id,
                        error  = %err.kind,
                        "Plugin destroy failed; continuing shutdown"
                    );
                    self.record_failure(&err);
                    report.errors.push(err);
                    continue;
                }
            }

            self.set_plugin_state(id, PluginState::Destroyed);
            info!(plugin = %id, "Plugin destroyed");
            report.destroyed.push(id.clone());
        }

        self.set_status(KernelStatus::Stopped);
        info!(
            destroyed = report.destroyed.len(),
            failed    = report.errors.len(),
            "Kernel shut down"
        );
        report
    }

    async fn init_plugin(&self, id: &str) -> KernelResult<()> {
        let target = self
            .hook_target(id)
            .ok_or_else(|| KernelError::UnknownPlugin(id.to_string()))?;

        if let Err(e) = self.check_dependencies(&target.descriptor) {
            error!(plugin = %id, error = %e, "Plugin dependencies not satisfied");
            self.mark_error(id, e.to_string());
            return Err(e);
        }

        if target.descriptor.capabilities.contains(PluginCapability::Init) {
            let span = span!(Level::DEBUG, "lifecycle", plugin = %id, phase = "init");
            self.guarded(id, LifecyclePhase::Init, target.plugin.init(&target.context))
                .instrument(span)
                .await
                .map_err(|e| self.fail(e))?;
        } else {
            debug!(plugin = %id, "Plugin has no init hook");
        }

        if let Some(entry) = self.inner.registry.write().entry_mut(id) {
            entry.state = PluginState::Initialized;
            entry.initialized = true;
        }
        info!(plugin = %id, "Plugin initialized");
        Ok(())
    }

    async fn start_plugin(&self, id: &str) -> KernelResult<()> {
        let target = self
            .hook_target(id)
            .ok_or_else(|| KernelError::UnknownPlugin(id.to_string()))?;

        if target.state != PluginState::Initialized {
            return Err(KernelError::InvalidState {
                plugin: id.to_string(),
                state: target.state,
            });
        }

        if target.descriptor.capabilities.contains(PluginCapability::Start) {
            let span = span!(Level::DEBUG, "lifecycle", plugin = %id, phase = "start");
            self.guarded(id, LifecyclePhase::Start, target.plugin.start(&target.context))
                .instrument(span)
                .await
                .map_err(|e| self.fail(e))?;
        } else {
            debug!(plugin = %id, "Plugin has no start hook");
        }

        self.set_plugin_state(id, PluginState::Started);
        info!(plugin = %id, "Plugin started");
        self.inner
            .shared
            .events
            .trigger(events::PLUGIN_STARTED, vec![Value::String(id.to_string())])
            .await;
        Ok(())
    }

    /// Runs one lifecycle hook, converting errors, panics and timeouts into
    /// a [`PluginError`].
    async fn guarded<F>(&self, id: &str, phase: LifecyclePhase, hook: F) -> Result<(), PluginError>
    where
        F: Future<Output = Result<(), BoxError>> + Send,
    {
        let caught = AssertUnwindSafe(hook).catch_unwind();
        let outcome = match self.inner.config.hook_timeout {
            Some(limit) => tokio::time::timeout(limit, caught)
                .await
                .map_err(|_| PluginError::new(id, phase, PluginErrorKind::TimedOut(limit)))?,
            None => caught.await,
        };

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(PluginError::new(id, phase, PluginErrorKind::Failed(e.to_string()))),
            Err(panic) => Err(PluginError::new(
                id,
                phase,
                PluginErrorKind::Panicked(describe_panic(&*panic)),
            )),
        }
    }

    fn check_dependencies(&self, descriptor: &PluginDescriptor) -> KernelResult<()> {
        let registry = self.inner.registry.read();
        for dep in &descriptor.dependencies {
            let ready = registry
                .entry(dep)
                .is_some_and(|e| e.state.is_initialized());
            if !ready {
                return Err(KernelError::UnsatisfiedDependency {
                    plugin: descriptor.id.clone(),
                    dependency: dep.clone(),
                });
            }
        }
        Ok(())
    }

    async fn trigger_lifecycle(&self, event: &str) {
        let report = self.inner.shared.events.trigger(event, Vec::new()).await;
        if !report.is_ok() {
            warn!(
                event  = %event,
                failed = report.errors.len(),
                "Lifecycle event handlers failed"
            );
        }
    }

    /// Marks the plugin failed and converts the error for propagation.
    fn fail(&self, err: PluginError) -> KernelError {
        error!(
            plugin = %err.plugin,
            phase  = %err.phase,
            error  = %err.kind,
            "Plugin lifecycle hook failed"
        );
        self.record_failure(&err);
        KernelError::Plugin(err)
    }

    fn record_failure(&self, err: &PluginError) {
        self.mark_error(&err.plugin, err.kind.to_string());
    }

    fn mark_error(&self, id: &str, message: String) {
        if let Some(entry) = self.inner.registry.write().entry_mut(id) {
            entry.state = PluginState::Error;
            entry.error = Some(message);
        }
    }

    fn set_plugin_state(&self, id: &str, state: PluginState) {
        if let Some(entry) = self.inner.registry.write().entry_mut(id) {
            entry.state = state;
        }
    }

    fn set_status(&self, status: KernelStatus) {
        self.inner.registry.write().status = status;
    }

    fn hook_target(&self, id: &str) -> Option<HookTarget> {
        self.inner.registry.read().entry(id).map(|e| HookTarget {
            plugin: Arc::clone(&e.plugin),
            context: e.context.clone(),
            descriptor: e.descriptor.clone(),
            state: e.state,
            initialized: e.initialized,
        })
    }

    // ─── Services ────────────────────────────────────────────────────────────

    /// Looks up a service in the shared registry.
    pub fn get_service<T>(&self, name: &str) -> ServiceResult<Arc<T>>
    where
        T: Any + Send + Sync,
    {
        self.inner.shared.services.get(name)
    }

    pub fn has_service(&self, name: &str) -> bool {
        self.inner.shared.services.has(name)
    }

    // ─── Introspection ───────────────────────────────────────────────────────

    pub fn status(&self) -> KernelStatus {
        self.inner.registry.read().status
    }

    /// Returns `true` once bootstrap has completed successfully and shutdown
    /// has not begun.
    pub fn is_bootstrapped(&self) -> bool {
        self.status() == KernelStatus::Running
    }

    pub fn plugin_state(&self, id: &str) -> Option<PluginState> {
        self.inner.registry.read().entry(id).map(|e| e.state)
    }

    /// The last failure message recorded for `id`, if any.
    pub fn plugin_error(&self, id: &str) -> Option<String> {
        self.inner
            .registry
            .read()
            .entry(id)
            .and_then(|e| e.error.clone())
    }

    pub fn descriptor(&self, id: &str) -> Option<PluginDescriptor> {
        self.inner.registry.read().entry(id).map(|e| e.descriptor.clone())
    }

    /// Registered ids in registration order.
    pub fn plugin_ids(&self) -> Vec<String> {
        self.inner
            .registry
            .read()
            .entries
            .iter()
            .map(|e| e.descriptor.id.clone())
            .collect()
    }

    pub fn plugin_count(&self) -> usize {
        self.inner.registry.read().entries.len()
    }

    /// The resolved order, followed by late activations. Empty before
    /// bootstrap.
    pub fn bootstrap_order(&self) -> Vec<String> {
        self.inner.registry.read().order.clone()
    }

    pub fn config(&self) -> &KernelConfig {
        &self.inner.config
    }

    /// The shared service registry.
    pub fn services(&self) -> &ServiceRegistry {
        &self.inner.shared.services
    }

    /// The shared event bus.
    pub fn events(&self) -> &EventBus {
        &self.inner.shared.events
    }

    /// The unscoped storage backend behind every plugin namespace.
    pub fn storage_backend(&self) -> Arc<dyn PluginStorage> {
        Arc::clone(&self.inner.shared.storage)
    }
}

impl std::fmt::Debug for Kernel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kernel")
            .field("status", &self.status())
            .field("plugins", &self.plugin_ids())
            .field("config", &self.inner.config)
            .finish()
    }
}

// =============================================================================
// KernelBuilder
// =============================================================================

/// Builder for [`Kernel`].
#[derive(Default)]
pub struct KernelBuilder {
    config: KernelConfig,
    storage: Option<Arc<dyn PluginStorage>>,
}

impl KernelBuilder {
    /// Replaces the whole configuration.
    pub fn config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn hook_timeout(mut self, timeout: Duration) -> Self {
        self.config.hook_timeout = Some(timeout);
        self
    }

    pub fn plugin_config(mut self, id: impl Into<String>, section: Value) -> Self {
        self.config.plugins.insert(id.into(), section);
        self
    }

    /// Uses `backend` instead of the default [`MemoryStorage`].
    pub fn storage(mut self, backend: Arc<dyn PluginStorage>) -> Self {
        self.storage = Some(backend);
        self
    }

    pub fn build(self) -> Kernel {
        let storage = self
            .storage
            .unwrap_or_else(|| Arc::new(MemoryStorage::new()));
        Kernel::from_inner(Arc::new(KernelInner {
            config: self.config,
            shared: Arc::new(SharedContext::new(storage)),
            registry: RwLock::new(Registry::default()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use keystone_core::{DependencyError, HookEvent, ServiceError, StorageExt};
    use parking_lot::Mutex;
    use serde_json::json;

    use super::*;
    use crate::plugin::FnPlugin;

    type Journal = Arc<Mutex<Vec<String>>>;

    /// Test plugin that records every hook into a shared journal.
    #[derive(Clone, Default)]
    struct Scripted {
        id: &'static str,
        deps: Vec<&'static str>,
        journal: Journal,
        fail_init: bool,
        fail_start: bool,
        panic_start: bool,
        fail_destroy: bool,
        init_delay: Option<Duration>,
        service: Option<(&'static str, &'static str)>,
    }

    impl Scripted {
        fn new(id: &'static str, journal: &Journal) -> Self {
            Self {
                id,
                journal: Arc::clone(journal),
                ..Default::default()
            }
        }

        fn deps(mut self, deps: &[&'static str]) -> Self {
            self.deps = deps.to_vec();
            self
        }

        fn record(&self, hook: &str) {
            self.journal.lock().push(format!("{hook}:{}", self.id));
        }
    }

    #[async_trait]
    impl Plugin for Scripted {
        fn name(&self) -> &str {
            self.id
        }

        fn dependencies(&self) -> Vec<String> {
            self.deps.iter().map(|d| d.to_string()).collect()
        }

        async fn init(&self, ctx: &PluginContext) -> Result<(), BoxError> {
            if let Some(delay) = self.init_delay {
                tokio::time::sleep(delay).await;
            }
            self.record("init");
            if let Some((name, value)) = self.service {
                ctx.register_service(name, value.to_string());
            }
            if self.fail_init {
                return Err(format!("{} cannot connect", self.id).into());
            }
            Ok(())
        }

        async fn start(&self, _ctx: &PluginContext) -> Result<(), BoxError> {
            self.record("start");
            if self.fail_start {
                return Err(format!("{} lost its listener", self.id).into());
            }
            if self.panic_start {
                panic!("{} blew up", self.id);
            }
            Ok(())
        }

        async fn destroy(&self) -> Result<(), BoxError> {
            self.record("destroy");
            if self.fail_destroy {
                return Err("resource busy".into());
            }
            Ok(())
        }
    }

    fn journal() -> Journal {
        Arc::new(Mutex::new(Vec::new()))
    }

    fn entries(journal: &Journal, hook: &str) -> Vec<String> {
        journal
            .lock()
            .iter()
            .filter_map(|e| e.strip_prefix(&format!("{hook}:")).map(str::to_string))
            .collect()
    }

    // ─── Ordering ────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_dependency_initialized_first() {
        let log = journal();
        let kernel = Kernel::new();
        kernel
            .use_plugin(Scripted::new("b", &log).deps(&["a"]))
            .use_plugin(Scripted::new("a", &log));

        kernel.bootstrap().await.unwrap();
        assert_eq!(entries(&log, "init"), ["a", "b"]);
        assert_eq!(kernel.bootstrap_order(), ["a", "b"]);
    }

    #[tokio::test]
    async fn test_reverse_registration_inits_all_before_any_start() {
        let log = journal();
        let kernel = Kernel::new();
        kernel
            .use_plugin(Scripted::new("ui", &log).deps(&["objects"]))
            .use_plugin(Scripted::new("objects", &log).deps(&["db"]))
            .use_plugin(Scripted::new("db", &log));

        kernel.bootstrap().await.unwrap();

        assert_eq!(
            *log.lock(),
            [
                "init:db",
                "init:objects",
                "init:ui",
                "start:db",
                "start:objects",
                "start:ui"
            ]
        );
        for id in ["db", "objects", "ui"] {
            assert_eq!(kernel.plugin_state(id), Some(PluginState::Started));
        }
        assert!(kernel.is_bootstrapped());
    }

    #[tokio::test]
    async fn test_diamond_graph() {
        let log = journal();
        let kernel = Kernel::new();
        kernel
            .use_plugin(Scripted::new("d", &log).deps(&["b", "c"]))
            .use_plugin(Scripted::new("c", &log).deps(&["a"]))
            .use_plugin(Scripted::new("b", &log).deps(&["a"]))
            .use_plugin(Scripted::new("a", &log));

        kernel.bootstrap().await.unwrap();
        let order = entries(&log, "init");
        assert_eq!(order.first().map(String::as_str), Some("a"));
        assert_eq!(order.last().map(String::as_str), Some("d"));
    }

    #[tokio::test]
    async fn test_independent_plugins_keep_registration_order() {
        let log = journal();
        let kernel = Kernel::new();
        for id in ["zeta", "alpha", "mid"] {
            kernel.use_plugin(Scripted::new(id, &log));
        }

        kernel.bootstrap().await.unwrap();
        assert_eq!(entries(&log, "init"), ["zeta", "alpha", "mid"]);
    }

    // ─── Structural failures ────────────────────────────────────────────────

    #[tokio::test]
    async fn test_cycle_aborts_before_any_hook() {
        let log = journal();
        let kernel = Kernel::new();
        kernel
            .use_plugin(Scripted::new("free", &log))
            .use_plugin(Scripted::new("a", &log).deps(&["b"]))
            .use_plugin(Scripted::new("b", &log).deps(&["a"]));

        let err = kernel.bootstrap().await.unwrap_err();
        assert!(matches!(
            err,
            KernelError::Dependency(DependencyError::Circular { .. })
        ));
        assert!(err.to_string().starts_with("circular dependency"));
        assert!(log.lock().is_empty());
        assert_eq!(kernel.status(), KernelStatus::Failed);
        assert_eq!(kernel.plugin_state("free"), Some(PluginState::Registered));
    }

    #[tokio::test]
    async fn test_self_dependency_rejected() {
        let log = journal();
        let kernel = Kernel::new();
        kernel.use_plugin(Scripted::new("a", &log).deps(&["a"]));

        let err = kernel.bootstrap().await.unwrap_err();
        assert_eq!(
            err,
            KernelError::Dependency(DependencyError::SelfDependency { plugin: "a".into() })
        );
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_missing_dependency_names_both_ids() {
        let log = journal();
        let kernel = Kernel::new();
        kernel.use_plugin(Scripted::new("a", &log).deps(&["x"]));

        let err = kernel.bootstrap().await.unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("missing dependency"));
        assert!(message.contains("'a'") && message.contains("'x'"));
        assert!(log.lock().is_empty());
    }

    // ─── Hook failures ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_init_failure_is_fatal() {
        let log = journal();
        let kernel = Kernel::new();
        kernel
            .use_plugin(Scripted::new("db", &log))
            .use_plugin(Scripted {
                fail_init: true,
                ..Scripted::new("cache", &log).deps(&["db"])
            })
            .use_plugin(Scripted::new("ui", &log).deps(&["cache"]));

        let err = kernel.bootstrap().await.unwrap_err();
        let KernelError::Plugin(plugin_err) = &err else {
            panic!("expected plugin error, got {err:?}");
        };
        assert_eq!(plugin_err.plugin, "cache");
        assert_eq!(plugin_err.phase, LifecyclePhase::Init);
        assert_eq!(
            plugin_err.kind,
            PluginErrorKind::Failed("cache cannot connect".into())
        );

        assert_eq!(entries(&log, "init"), ["db", "cache"]);
        assert!(entries(&log, "start").is_empty());
        assert_eq!(kernel.plugin_state("cache"), Some(PluginState::Error));
        assert_eq!(kernel.plugin_error("cache").as_deref(), Some("cache cannot connect"));
        assert_eq!(kernel.plugin_state("ui"), Some(PluginState::Registered));
        assert!(!kernel.is_bootstrapped());
    }

    #[tokio::test]
    async fn test_panicking_start_is_reported() {
        let log = journal();
        let kernel = Kernel::new();
        kernel.use_plugin(Scripted {
            panic_start: true,
            ..Scripted::new("jobs", &log)
        });

        let err = kernel.bootstrap().await.unwrap_err();
        let KernelError::Plugin(plugin_err) = err else {
            panic!("expected plugin error");
        };
        assert_eq!(plugin_err.phase, LifecyclePhase::Start);
        assert_eq!(
            plugin_err.kind,
            PluginErrorKind::Panicked("jobs blew up".into())
        );
        assert_eq!(kernel.plugin_state("jobs"), Some(PluginState::Error));
    }

    #[tokio::test]
    async fn test_hook_timeout() {
        let log = journal();
        let kernel = Kernel::builder()
            .hook_timeout(Duration::from_millis(20))
            .build();
        kernel.use_plugin(Scripted {
            init_delay: Some(Duration::from_secs(5)),
            ..Scripted::new("slow", &log)
        });

        let err = kernel.bootstrap().await.unwrap_err();
        assert_eq!(
            err,
            KernelError::Plugin(PluginError::new(
                "slow",
                LifecyclePhase::Init,
                PluginErrorKind::TimedOut(Duration::from_millis(20)),
            ))
        );
        assert!(log.lock().is_empty());
    }

    #[tokio::test]
    async fn test_second_bootstrap_rejected() {
        let kernel = Kernel::new();
        kernel.bootstrap().await.unwrap();
        assert_eq!(
            kernel.bootstrap().await.unwrap_err(),
            KernelError::AlreadyBootstrapped
        );
    }

    #[tokio::test]
    async fn test_hooks_outside_capabilities_are_skipped() {
        let kernel = Kernel::new();
        kernel.use_plugin(FnPlugin::new("metadata-only"));

        kernel.bootstrap().await.unwrap();
        assert_eq!(kernel.plugin_state("metadata-only"), Some(PluginState::Started));

        let report = kernel.shutdown().await;
        assert_eq!(report.destroyed, ["metadata-only"]);
    }

    // ─── Registration ───────────────────────────────────────────────────────

    #[test]
    fn test_duplicate_and_invalid_ids_ignored() {
        let log = journal();
        let kernel = Kernel::new();
        kernel
            .use_plugin(Scripted::new("a", &log))
            .use_plugin(Scripted::new("a", &log).deps(&["zzz"]))
            .use_plugin(Scripted::new("", &log))
            .use_plugin(Scripted::new("bad:id", &log));

        assert_eq!(kernel.plugin_ids(), ["a"]);
        assert!(kernel.descriptor("a").unwrap().dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_late_registration_requires_activate() {
        let log = journal();
        let kernel = Kernel::new();
        kernel.use_plugin(Scripted::new("core", &log));
        kernel.bootstrap().await.unwrap();

        kernel.use_plugin(Scripted::new("late", &log).deps(&["core"]));
        assert_eq!(kernel.plugin_state("late"), Some(PluginState::Registered));
        assert!(entries(&log, "init").iter().all(|id| id != "late"));

        kernel.activate("late").await.unwrap();
        assert_eq!(kernel.plugin_state("late"), Some(PluginState::Started));
        assert_eq!(kernel.bootstrap_order(), ["core", "late"]);
        kernel.activate("late").await.unwrap();

        kernel.shutdown().await;
        assert_eq!(entries(&log, "destroy"), ["late", "core"]);
    }

    #[tokio::test]
    async fn test_activate_checks_dependencies() {
        let log = journal();
        let kernel = Kernel::new();
        assert_eq!(
            kernel.activate("x").await.unwrap_err(),
            KernelError::NotRunning
        );
        kernel.bootstrap().await.unwrap();

        assert_eq!(
            kernel.activate("ghost").await.unwrap_err(),
            KernelError::UnknownPlugin("ghost".into())
        );

        kernel.use_plugin(Scripted::new("orphan", &log).deps(&["absent"]));
        assert_eq!(
            kernel.activate("orphan").await.unwrap_err(),
            KernelError::UnsatisfiedDependency {
                plugin: "orphan".into(),
                dependency: "absent".into(),
            }
        );
        assert_eq!(kernel.plugin_state("orphan"), Some(PluginState::Error));
        assert!(log.lock().is_empty());
    }

    // ─── Services, events, storage ──────────────────────────────────────────

    #[tokio::test]
    async fn test_missing_service_before_and_after_bootstrap() {
        let log = journal();
        let kernel = Kernel::new();
        kernel.use_plugin(Scripted {
            service: Some(("mailer", "smtp")),
            ..Scripted::new("mail", &log)
        });

        assert!(!kernel.has_service("mailer"));
        assert_eq!(
            kernel.get_service::<String>("mailer").unwrap_err(),
            ServiceError::NotFound("mailer".into())
        );

        kernel.bootstrap().await.unwrap();
        assert!(kernel.has_service("mailer"));
        assert!(!kernel.has_service("missing"));
        assert_eq!(*kernel.get_service::<String>("mailer").unwrap(), "smtp");
        assert!(matches!(
            kernel.get_service::<String>("nope"),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_service_overwrite_last_writer_wins() {
        let log = journal();
        let kernel = Kernel::new();
        kernel
            .use_plugin(Scripted {
                service: Some(("s", "v1")),
                ..Scripted::new("first", &log)
            })
            .use_plugin(Scripted {
                service: Some(("s", "v2")),
                ..Scripted::new("second", &log).deps(&["first"])
            });

        kernel.bootstrap().await.unwrap();
        assert_eq!(*kernel.get_service::<String>("s").unwrap(), "v2");
        assert_eq!(kernel.services().list(), ["s"]);
    }

    #[tokio::test]
    async fn test_event_resilience_across_plugins() {
        let kernel = Kernel::new();
        let counter = Arc::new(AtomicUsize::new(0));

        kernel.use_plugin(FnPlugin::new("broken").on_init(|ctx: PluginContext| async move {
            ctx.hook("data:created", |_| async { Err::<(), BoxError>("boom".into()) });
            Ok::<(), BoxError>(())
        }));
        for id in ["counter-a", "counter-b"] {
            let counter = Arc::clone(&counter);
            kernel.use_plugin(FnPlugin::new(id).on_init(move |ctx: PluginContext| {
                let counter = Arc::clone(&counter);
                async move {
                    ctx.hook("data:created", move |_| {
                        let counter = Arc::clone(&counter);
                        async move {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok::<(), BoxError>(())
                        }
                    });
                    Ok::<(), BoxError>(())
                }
            }));
        }

        kernel.bootstrap().await.unwrap();
        let report = kernel.events().trigger("data:created", vec![json!(1)]).await;

        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(report.invoked, 3);
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_storage_isolated_per_plugin() {
        let kernel = Kernel::new();
        for (id, value) in [("a", 1_u32), ("b", 2_u32)] {
            kernel.use_plugin(FnPlugin::new(id).on_init(move |ctx: PluginContext| async move {
                ctx.storage().set_as("k", &value).await?;
                Ok::<(), BoxError>(())
            }));
        }

        kernel.bootstrap().await.unwrap();

        let backend = kernel.storage_backend();
        assert_eq!(backend.keys().await.unwrap(), ["plugin:a:k", "plugin:b:k"]);
        assert_eq!(backend.get("plugin:b:k").await.unwrap(), Some(json!(2)));
    }

    #[tokio::test]
    async fn test_custom_storage_backend() {
        let backend: Arc<dyn PluginStorage> = Arc::new(MemoryStorage::new());
        backend.set("plugin:seed:hello", json!("world")).await.unwrap();

        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        let kernel = Kernel::builder().storage(Arc::clone(&backend)).build();
        kernel.use_plugin(FnPlugin::new("seed").on_init(move |ctx: PluginContext| {
            let slot = Arc::clone(&slot);
            async move {
                let value = ctx.storage().get_as::<String>("hello").await?;
                *slot.lock() = value;
                Ok::<(), BoxError>(())
            }
        }));

        kernel.bootstrap().await.unwrap();
        assert_eq!(seen.lock().as_deref(), Some("world"));
    }

    #[tokio::test]
    async fn test_lifecycle_events() {
        let kernel = Kernel::new();
        let seen: Journal = journal();

        for event in [
            events::KERNEL_INIT,
            events::PLUGIN_STARTED,
            events::KERNEL_READY,
            events::KERNEL_SHUTDOWN,
        ] {
            let seen = Arc::clone(&seen);
            kernel.events().hook(event, move |e: Arc<HookEvent>| {
                let seen = Arc::clone(&seen);
                async move {
                    let suffix = e.arg(0).and_then(Value::as_str).unwrap_or_default().to_string();
                    seen.lock().push(format!("{}{suffix}", e.name()));
                    Ok::<(), BoxError>(())
                }
            });
        }
        kernel.use_plugin(FnPlugin::new("p"));

        kernel.bootstrap().await.unwrap();
        kernel.shutdown().await;

        assert_eq!(
            *seen.lock(),
            ["kernel:init", "plugin:startedp", "kernel:ready", "kernel:shutdown"]
        );
    }

    #[tokio::test]
    async fn test_plugin_config_section() {
        #[derive(serde::Deserialize, Default)]
        #[serde(default)]
        struct Limits {
            max_rows: u32,
        }

        let seen = Arc::new(AtomicUsize::new(0));
        let kernel = Kernel::with_config(
            KernelConfig::new().plugin_config("limits", json!({ "max_rows": 500 })),
        );
        let slot = Arc::clone(&seen);
        kernel.use_plugin(FnPlugin::new("limits").on_init(move |ctx: PluginContext| {
            let slot = Arc::clone(&slot);
            async move {
                let limits: Limits = ctx.config()?;
                slot.store(limits.max_rows as usize, Ordering::SeqCst);
                Ok::<(), BoxError>(())
            }
        }));

        kernel.bootstrap().await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 500);
    }

    #[tokio::test]
    async fn test_context_reaches_kernel() {
        let count = Arc::new(AtomicUsize::new(0));
        let slot = Arc::clone(&count);
        let kernel = Kernel::new();
        kernel
            .use_plugin(FnPlugin::new("a"))
            .use_plugin(FnPlugin::new("b").on_start(move |ctx: PluginContext| {
                let slot = Arc::clone(&slot);
                async move {
                    let kernel = ctx.kernel().ok_or("kernel dropped")?;
                    slot.store(kernel.plugin_count(), Ordering::SeqCst);
                    Ok::<(), BoxError>(())
                }
            }));

        kernel.bootstrap().await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    // ─── Shutdown ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_shutdown_reverse_order_and_isolation() {
        let log = journal();
        let kernel = Kernel::new();
        kernel
            .use_plugin(Scripted::new("a", &log))
            .use_plugin(Scripted {
                fail_destroy: true,
                ..Scripted::new("b", &log).deps(&["a"])
            })
            .use_plugin(Scripted::new("c", &log).deps(&["b"]));
        kernel.bootstrap().await.unwrap();

        let report = kernel.shutdown().await;

        assert_eq!(entries(&log, "destroy"), ["c", "b", "a"]);
        assert_eq!(report.destroyed, ["c", "a"]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].plugin, "b");
        assert_eq!(report.errors[0].phase, LifecyclePhase::Destroy);
        assert!(!report.is_clean());

        assert_eq!(kernel.plugin_state("a"), Some(PluginState::Destroyed));
        assert_eq!(kernel.plugin_state("b"), Some(PluginState::Error));
        assert_eq!(kernel.plugin_error("b").as_deref(), Some("resource busy"));
        assert_eq!(kernel.plugin_state("c"), Some(PluginState::Destroyed));
        assert_eq!(kernel.status(), KernelStatus::Stopped);

        assert_eq!(kernel.shutdown().await, ShutdownReport::default());
    }

    #[tokio::test]
    async fn test_shutdown_after_failed_bootstrap_destroys_initialized_only() {
        let log = journal();
        let kernel = Kernel::new();
        kernel
            .use_plugin(Scripted::new("db", &log))
            .use_plugin(Scripted {
                fail_init: true,
                ..Scripted::new("cache", &log).deps(&["db"])
            })
            .use_plugin(Scripted::new("ui", &log).deps(&["cache"]));
        kernel.bootstrap().await.unwrap_err();

        let report = kernel.shutdown().await;
        assert_eq!(report.destroyed, ["db"]);
        assert_eq!(entries(&log, "destroy"), ["db"]);
    }

    #[tokio::test]
    async fn test_failed_start_still_destroyed() {
        let log = journal();
        let kernel = Kernel::new();
        kernel.use_plugin(Scripted::new("x", &log)).use_plugin(Scripted {
            fail_start: true,
            ..Scripted::new("y", &log).deps(&["x"])
        });

        let err = kernel.bootstrap().await.unwrap_err();
        assert!(matches!(
            err,
            KernelError::Plugin(PluginError { phase: LifecyclePhase::Start, .. })
        ));
        assert_eq!(kernel.plugin_state("y"), Some(PluginState::Error));

        let report = kernel.shutdown().await;
        assert_eq!(entries(&log, "destroy"), ["y", "x"]);
        assert_eq!(report.destroyed, ["y", "x"]);
        assert!(report.is_clean());
        assert_eq!(kernel.plugin_state("y"), Some(PluginState::Destroyed));
    }

    #[tokio::test]
    async fn test_last_plugin_destroy_failure_is_contained() {
        let log = journal();
        let kernel = Kernel::new();
        kernel.use_plugin(Scripted::new("x", &log)).use_plugin(Scripted {
            fail_destroy: true,
            ..Scripted::new("y", &log)
        });
        kernel.bootstrap().await.unwrap();

        let report = kernel.shutdown().await;

        assert_eq!(entries(&log, "destroy"), ["y", "x"]);
        assert_eq!(report.destroyed, ["x"]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].plugin, "y");
        assert_eq!(kernel.plugin_state("x"), Some(PluginState::Destroyed));
        assert_eq!(kernel.plugin_state("y"), Some(PluginState::Error));
    }

    #[test]
    fn test_bootstrap_on_blocking_executor() {
        let log = journal();
        let kernel = Kernel::new();
        kernel.use_plugin(Scripted::new("solo", &log));

        tokio_test::block_on(kernel.bootstrap()).unwrap();
        assert_eq!(*log.lock(), ["init:solo", "start:solo"]);
    }
}
