//! Names of the events the kernel triggers on its own bus.
//!
//! None of them carry arguments except [`PLUGIN_STARTED`], whose single
//! argument is the started plugin's id.

/// Before dependency resolution, at the top of `bootstrap`.
pub const KERNEL_INIT: &str = "kernel:init";

/// After every plugin has started.
pub const KERNEL_READY: &str = "kernel:ready";

/// At the top of `shutdown`, before any plugin is destroyed.
pub const KERNEL_SHUTDOWN: &str = "kernel:shutdown";

/// After a plugin's `start` hook succeeded. Argument 0: the plugin id.
pub const PLUGIN_STARTED: &str = "plugin:started";
