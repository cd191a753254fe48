//! # Keystone
//!
//! A plugin microkernel for application platforms built from independently
//! developed plugins.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   use_plugin    ┌──────────────────────────────────────────────┐
//! │   Runtime    │────────────────▶│ Kernel                                       │
//! │ (config, log │    bootstrap    │  resolve order ─▶ init all ─▶ start all      │
//! │  signals)    │────────────────▶│  shutdown: destroy in reverse                │
//! └──────────────┘                 └──────────────┬───────────────────────────────┘
//!                                                 │ PluginContext (one per plugin)
//!                       ┌─────────────────────────┼──────────────────────────┐
//!                       ▼                         ▼                          ▼
//!              ServiceRegistry               EventBus               ScopedStorage
//!              (shared, by name)      (hooks, errors contained)   (plugin:<id>:<key>)
//! ```
//!
//! - **Kernel**: registers plugins, computes a dependency-safe order and
//!   drives `init` → `start` → `destroy`
//! - **Plugins**: implement [`Plugin`](kernel::Plugin), or are built from
//!   closures with [`define_plugin!`](prelude::define_plugin)
//! - **Services**: named values shared between plugins
//! - **Hooks**: named events; a failing handler never stops the others
//! - **Storage**: key-value store namespaced per plugin
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use keystone::prelude::*;
//!
//! async fn objects_init(ctx: PluginContext) -> Result<(), BoxError> {
//!     let db = ctx.get_service::<Database>("db")?;
//!     ctx.register_service("objects", ObjectStore::new(db));
//!     Ok(())
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = KeystoneRuntime::new();
//!     runtime
//!         .register_plugin(DatabasePlugin::default())
//!         .register_plugin(define_plugin! {
//!             name: "objects",
//!             dependencies: ["db"],
//!             init: objects_init,
//!         });
//!
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config` *(default)*: `keystone.toml` configuration files
//! - `yaml-config`: `keystone.yaml` configuration files
//! - `json-log`: JSON log output

pub use keystone_core as core;
pub use keystone_kernel as kernel;
pub use keystone_runtime as runtime;

/// Commonly used types for writing plugins and hosting a kernel.
///
/// ```rust,ignore
/// use keystone::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use keystone_runtime::{KeystoneConfig, KeystoneRuntime};

    // Kernel and plugin contract
    pub use keystone_kernel::{
        FnPlugin, Kernel, KernelConfig, KernelError, LifecycleHooks, ManifestPlugin, Plugin,
        PluginCapability, PluginContext, PluginState, define_plugin, events,
    };

    // Shared components
    pub use keystone_core::{
        BoxError, HookEvent, PluginManifest, PluginStorage, RegisterOptions, StorageExt,
        TriggerReport,
    };

    // Implementing `Plugin` requires the attribute
    pub use keystone_kernel::async_trait;
}
