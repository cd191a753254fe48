//! Configuration schema definitions.

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use keystone_kernel::KernelConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KeystoneConfig {
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Kernel tunables.
    #[serde(default)]
    pub kernel: KernelSettings,

    /// Per-plugin sections, keyed by plugin id.
    ///
    /// Each section is handed to the plugin as-is through
    /// `PluginContext::config`.
    #[serde(default)]
    pub plugins: HashMap<String, Value>,
}

impl KeystoneConfig {
    /// Builds the kernel configuration carried by this file.
    pub fn to_kernel_config(&self) -> KernelConfig {
        KernelConfig {
            hook_timeout: self.kernel.hook_timeout(),
            plugins: self.plugins.clone(),
        }
    }
}

// =============================================================================
// Kernel
// =============================================================================

/// The `[kernel]` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KernelSettings {
    /// Upper bound for one lifecycle hook, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hook_timeout_ms: Option<u64>,

    /// Destroy the plugins that did initialize when bootstrap fails.
    #[serde(default = "default_true")]
    pub shutdown_on_bootstrap_failure: bool,
}

impl Default for KernelSettings {
    fn default() -> Self {
        Self {
            hook_timeout_ms: None,
            shutdown_on_bootstrap_failure: true,
        }
    }
}

impl KernelSettings {
    pub fn hook_timeout(&self) -> Option<Duration> {
        self.hook_timeout_ms.map(Duration::from_millis)
    }
}

fn default_true() -> bool {
    true
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(&self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output line format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Newline-delimited JSON (`json-log` feature).
    #[cfg(feature = "json-log")]
    Json,
}

/// Where log lines are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    /// Requires [`LoggingConfig::file_path`].
    File,
}

/// How often the log file is rolled over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Daily,
    Hourly,
    Minutely,
}

/// Which span lifecycle transitions produce a log line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanEventConfig {
    #[serde(default)]
    pub new: bool,
    #[serde(default)]
    pub enter: bool,
    #[serde(default)]
    pub exit: bool,
    #[serde(default)]
    pub close: bool,
}

/// The `[logging]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub level: LogLevel,

    #[serde(default)]
    pub format: LogFormat,

    #[serde(default)]
    pub output: LogOutput,

    #[serde(default)]
    pub span_events: SpanEventConfig,

    /// Include thread ids in each line.
    #[serde(default)]
    pub thread_ids: bool,

    /// Include source file and line number in each line.
    #[serde(default)]
    pub file_location: bool,

    /// Log file path when `output = "file"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_path: Option<PathBuf>,

    #[serde(default)]
    pub rotation: LogRotation,

    /// Per-target level overrides, e.g. `keystone_kernel = "debug"`.
    #[serde(default)]
    pub filters: HashMap<String, LogLevel>,
}
