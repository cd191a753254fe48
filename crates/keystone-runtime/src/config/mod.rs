//! Configuration for the Keystone runtime.
//!
//! Settings are layered with figment: built-in defaults, then
//! `keystone.toml` / `keystone.yaml` (with an optional profile variant), then
//! `KEYSTONE_*` environment variables, then programmatic overrides.
//!
//! ```toml
//! [logging]
//! level = "debug"
//! format = "pretty"
//!
//! [kernel]
//! hook_timeout_ms = 5000
//!
//! [plugins.audit]
//! retention = 500
//! ```

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    KernelSettings, KeystoneConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    SpanEventConfig,
};
pub use validation::validate_config;
