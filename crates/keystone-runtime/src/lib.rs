//! Keystone Runtime: the process shell around a [`Kernel`](keystone_kernel::Kernel).
//!
//! This crate provides:
//! - Layered configuration ([`ConfigLoader`]: defaults → `keystone.toml` →
//!   `KEYSTONE_*` environment → overrides)
//! - Logging setup over `tracing-subscriber` ([`LoggingBuilder`])
//! - [`KeystoneRuntime`], which builds the kernel from configuration,
//!   bootstraps it and shuts it down on Ctrl+C / SIGTERM
//!
//! ```rust,ignore
//! use keystone_runtime::KeystoneRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = KeystoneRuntime::new();
//!     runtime.register_plugin(audit::AuditPlugin::default());
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{
    ConfigError, ConfigLoader, ConfigResult, KernelSettings, KeystoneConfig, LoggingConfig,
    Profile,
};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{KeystoneRuntime, RuntimeBuilder};

// Re-export tracing for plugin crates
pub use tracing;
pub use tracing_subscriber;

/// Logging macros for plugin authors.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
