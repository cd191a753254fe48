//! Process-level orchestration: configuration → kernel → signals.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use keystone_runtime::KeystoneRuntime;
//!
//! // Auto-loads keystone.toml from the current directory
//! let runtime = KeystoneRuntime::new();
//!
//! runtime
//!     .register_plugin(DatabasePlugin::default())
//!     .register_plugin(ObjectsPlugin::default());
//!
//! // Bootstrap, wait for Ctrl+C / SIGTERM, shut down
//! runtime.run().await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use keystone_core::PluginStorage;
use keystone_kernel::{Kernel, Plugin, ShutdownReport};
use serde::Serialize;
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::{ConfigLoader, KeystoneConfig};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Owns one [`Kernel`] together with the configuration it was built from.
///
/// Plugin sections under `[plugins.<id>]` and `[kernel]` tunables are
/// applied to the kernel; `[logging]` installs the global subscriber.
pub struct KeystoneRuntime {
    config: KeystoneConfig,
    kernel: Kernel,
    /// Held across `start` / `stop` so the two never interleave.
    running: Mutex<bool>,
}

impl KeystoneRuntime {
    /// Loads configuration from the default locations and builds a runtime.
    ///
    /// If loading fails the error is printed and defaults are used; call
    /// [`builder`](Self::builder) to handle it instead.
    pub fn new() -> Self {
        let config = ConfigLoader::new().load().unwrap_or_else(|e| {
            eprintln!("Warning: Failed to load config ({e}), using defaults");
            KeystoneConfig::default()
        });

        Self::from_config(&config)
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Builds a runtime from an already loaded configuration.
    ///
    /// Initializes logging (a no-op if a subscriber is already installed).
    pub fn from_config(config: &KeystoneConfig) -> Self {
        Self::assemble(config.clone(), None)
    }

    fn assemble(config: KeystoneConfig, storage: Option<Arc<dyn PluginStorage>>) -> Self {
        logging::init_from_config(&config.logging);

        let mut builder = Kernel::builder().config(config.to_kernel_config());
        if let Some(backend) = storage {
            builder = builder.storage(backend);
        }

        info!(
            log_level       = %config.logging.level,
            log_format      = ?config.logging.format,
            hook_timeout_ms = ?config.kernel.hook_timeout_ms,
            plugin_sections = config.plugins.len(),
            "Runtime initialized from configuration"
        );

        Self {
            config,
            kernel: builder.build(),
            running: Mutex::new(false),
        }
    }

    pub fn config(&self) -> &KeystoneConfig {
        &self.config
    }

    /// The kernel driven by this runtime.
    ///
    /// Cheap to clone; useful for service lookups once started.
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Registers a plugin with the kernel (builder pattern).
    pub fn register_plugin<P: Plugin>(&self, plugin: P) -> &Self {
        self.kernel.use_plugin(plugin);
        self
    }

    pub async fn is_running(&self) -> bool {
        *self.running.lock().await
    }

    /// Bootstraps the kernel.
    ///
    /// On failure, and unless `kernel.shutdown_on_bootstrap_failure` is
    /// off, the plugins that did initialize are destroyed before the error
    /// is returned.
    pub async fn start(&self) -> RuntimeResult<()> {
        let mut running = self.running.lock().await;
        if *running {
            warn!("Runtime is already running");
            return Ok(());
        }

        info!(plugins = self.kernel.plugin_count(), "Starting Keystone runtime");

        if let Err(err) = self.kernel.bootstrap().await {
            error!(error = %err, "Kernel bootstrap failed");
            if self.config.kernel.shutdown_on_bootstrap_failure {
                let report = self.kernel.shutdown().await;
                info!(
                    destroyed = report.destroyed.len(),
                    failed    = report.errors.len(),
                    "Rolled back partially bootstrapped plugins"
                );
            }
            return Err(err.into());
        }

        *running = true;
        info!(order = ?self.kernel.bootstrap_order(), "Runtime started");
        Ok(())
    }

    /// Shuts the kernel down, destroying plugins in reverse order.
    ///
    /// Safe to call more than once; later calls return an empty report.
    pub async fn stop(&self) -> ShutdownReport {
        let mut running = self.running.lock().await;
        if !*running {
            debug!("Runtime is not running");
        }

        let report = self.kernel.shutdown().await;
        *running = false;

        if report.is_clean() {
            info!("Runtime stopped");
        } else {
            warn!(failed = report.errors.len(), "Runtime stopped with plugin errors");
        }
        report
    }

    /// Runs until Ctrl+C or SIGTERM, then stops.
    pub async fn run(&self) -> RuntimeResult<ShutdownReport> {
        self.start().await?;

        info!("Keystone runtime is now running. Press Ctrl+C to stop.");
        let waited = wait_for_shutdown().await;

        let report = self.stop().await;
        waited.map(|()| report)
    }

    /// Runs until `shutdown` completes, then stops.
    pub async fn run_until<F>(&self, shutdown: F) -> RuntimeResult<ShutdownReport>
    where
        F: Future<Output = ()>,
    {
        self.start().await?;
        shutdown.await;
        Ok(self.stop().await)
    }
}

impl Default for KeystoneRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for KeystoneRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoneRuntime")
            .field("kernel", &self.kernel)
            .finish_non_exhaustive()
    }
}

/// Waits for Ctrl+C, or SIGTERM on unix.
async fn wait_for_shutdown() -> RuntimeResult<()> {
    #[cfg(unix)]
    {
        let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
            .map_err(RuntimeError::Signal)?;

        tokio::select! {
            result = signal::ctrl_c() => {
                result.map_err(RuntimeError::Signal)?;
                info!("Received Ctrl+C, shutting down");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down");
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map_err(RuntimeError::Signal)?;
        info!("Received Ctrl+C, shutting down");
    }

    Ok(())
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

/// Builder for a [`KeystoneRuntime`] with custom configuration sources.
///
/// ```rust,ignore
/// let runtime = KeystoneRuntime::builder()
///     .config_file("deploy/keystone.toml")
///     .profile("production")
///     .storage(Arc::new(RedisStorage::connect(url).await?))
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    storage: Option<Arc<dyn PluginStorage>>,
}

impl RuntimeBuilder {
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            storage: None,
        }
    }

    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile);
        self
    }

    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    pub fn with_env(mut self) -> Self {
        self.config_loader = self.config_loader.with_env();
        self
    }

    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Layers a whole configuration under the files.
    pub fn merge(mut self, config: KeystoneConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Overrides one dotted key above every other source.
    pub fn set<V: Serialize>(mut self, key: &str, value: V) -> Self {
        self.config_loader = self.config_loader.set(key, value);
        self
    }

    /// Uses `backend` for plugin storage instead of the in-memory default.
    pub fn storage(mut self, backend: Arc<dyn PluginStorage>) -> Self {
        self.storage = Some(backend);
        self
    }

    pub fn build(self) -> RuntimeResult<KeystoneRuntime> {
        let config = self.config_loader.load()?;
        Ok(KeystoneRuntime::assemble(config, self.storage))
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
