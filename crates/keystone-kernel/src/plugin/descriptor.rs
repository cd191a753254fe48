//! Registration-time snapshot of a plugin.

use super::{CapabilitySet, Plugin};

// ─── PluginState ──────────────────────────────────────────────────────────────

/// Lifecycle state of a registered plugin.
///
/// ```text
/// use_plugin() ──► Registered
///    init ok   ──► Initialized
///    start ok  ──► Started
///    destroy   ──► Destroyed
/// any failure  ──► Error (terminal)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginState {
    Registered,
    Initialized,
    Started,
    Destroyed,
    Error,
}

impl PluginState {
    /// `init` completed and the plugin has not been torn down.
    pub const fn is_initialized(self) -> bool {
        matches!(self, Self::Initialized | Self::Started)
    }

    pub const fn is_started(self) -> bool {
        matches!(self, Self::Started)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Registered => "registered",
            Self::Initialized => "initialized",
            Self::Started => "started",
            Self::Destroyed => "destroyed",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for PluginState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── PluginDescriptor ─────────────────────────────────────────────────────────

/// Static metadata read from a [`Plugin`] once, when it is registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginDescriptor {
    pub id: String,
    pub version: Option<String>,
    pub description: Option<String>,
    /// Dependency ids in declaration order, duplicates removed.
    pub dependencies: Vec<String>,
    pub capabilities: CapabilitySet,
}

impl PluginDescriptor {
    /// Captures the metadata of `plugin`.
    pub fn of(plugin: &dyn Plugin) -> Self {
        let mut dependencies: Vec<String> = Vec::new();
        for dep in plugin.dependencies() {
            if !dependencies.contains(&dep) {
                dependencies.push(dep);
            }
        }
        Self {
            id: plugin.name().to_string(),
            version: plugin.version().map(str::to_string),
            description: plugin.description().map(str::to_string),
            dependencies,
            capabilities: plugin.capabilities(),
        }
    }

    /// Returns `true` if `id` may be used as a plugin id.
    ///
    /// Ids form the storage prefix `plugin:<id>:`, so they may not be empty
    /// or contain the separator.
    pub fn is_valid_id(id: &str) -> bool {
        keystone_core::is_valid_namespace(id)
    }
}
