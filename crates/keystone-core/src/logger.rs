//! Plugin-attributed logging.
//!
//! [`PluginLogger`] is a thin handle over `tracing` that stamps every record
//! with the owning plugin's id, so subscriber output can be filtered per
//! plugin without each plugin repeating the field.

use std::fmt::Arguments;

use tracing::{Level, Span, debug, error, info, span, trace, warn};

/// Logger handed to a plugin through its context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginLogger {
    plugin: String,
}

impl PluginLogger {
    /// Creates a logger for `plugin`.
    pub fn new(plugin: impl Into<String>) -> Self {
        Self {
            plugin: plugin.into(),
        }
    }

    /// The plugin id stamped on every record.
    pub fn plugin(&self) -> &str {
        &self.plugin
    }

    pub fn trace(&self, message: impl AsRef<str>) {
        trace!(plugin = %self.plugin, "{}", message.as_ref());
    }

    pub fn debug(&self, message: impl AsRef<str>) {
        debug!(plugin = %self.plugin, "{}", message.as_ref());
    }

    pub fn info(&self, message: impl AsRef<str>) {
        info!(plugin = %self.plugin, "{}", message.as_ref());
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        warn!(plugin = %self.plugin, "{}", message.as_ref());
    }

    pub fn error(&self, message: impl AsRef<str>) {
        error!(plugin = %self.plugin, "{}", message.as_ref());
    }

    /// Logs pre-formatted arguments at `level`.
    ///
    /// ```rust,ignore
    /// ctx.logger().log(Level::INFO, format_args!("synced {n} rows"));
    /// ```
    pub fn log(&self, level: Level, args: Arguments<'_>) {
        match level {
            Level::TRACE => trace!(plugin = %self.plugin, "{args}"),
            Level::DEBUG => debug!(plugin = %self.plugin, "{args}"),
            Level::INFO => info!(plugin = %self.plugin, "{args}"),
            Level::WARN => warn!(plugin = %self.plugin, "{args}"),
            _ => error!(plugin = %self.plugin, "{args}"),
        }
    }

    /// A span carrying the plugin id, for instrumenting plugin futures.
    pub fn span(&self) -> Span {
        span!(Level::INFO, "plugin", plugin = %self.plugin)
    }
}
