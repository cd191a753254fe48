//! # Keystone Kernel
//!
//! Plugin lifecycle orchestration on top of `keystone-core`.
//!
//! - [`Plugin`] is the contract every plugin implements; [`ManifestPlugin`]
//!   and [`FnPlugin`] cover manifest-driven and closure-based plugins.
//! - [`PluginContext`] is each plugin's view of the shared registry, event
//!   bus and its own storage namespace.
//! - [`Kernel`] registers plugins, resolves their dependency order and runs
//!   `init` → `start` on bootstrap and `destroy` in reverse on shutdown.
//!
//! ```rust,ignore
//! use keystone_kernel::{Kernel, define_plugin};
//!
//! let kernel = Kernel::new();
//! kernel
//!     .use_plugin(define_plugin! { name: "db", init: db_init })
//!     .use_plugin(define_plugin! { name: "objects", dependencies: ["db"], init: objects_init });
//!
//! kernel.bootstrap().await?;
//! let store = kernel.get_service::<ObjectStore>("objects")?;
//! kernel.shutdown().await;
//! ```

pub mod context;
pub mod error;
pub mod events;
pub mod kernel;
pub mod plugin;

pub use context::PluginContext;
pub use error::{KernelError, KernelResult, LifecyclePhase, PluginError, PluginErrorKind};
pub use kernel::{Kernel, KernelBuilder, KernelConfig, KernelStatus, ShutdownReport};
pub use plugin::{
    CapabilitySet, FnPlugin, LifecycleHooks, ManifestPlugin, NoHooks, Plugin, PluginCapability,
    PluginDescriptor, PluginState,
};

/// Attribute required on `impl Plugin` blocks.
pub use async_trait::async_trait;
