//! Plugin contract.
//!
//! A plugin is any type implementing [`Plugin`]. Every lifecycle hook has a
//! no-op default, and [`capabilities`](Plugin::capabilities) tells the kernel
//! which hooks the plugin actually implements so skipped steps can be logged
//! as such.
//!
//! Three ways to write one:
//!
//! | Style | Type | When |
//! |-------|------|------|
//! | Trait impl | your own struct | Plugins with state of their own |
//! | Manifest + hooks | [`ManifestPlugin`] | Metadata-driven plugins using `on_install` / `on_enable` / … |
//! | Closures | [`FnPlugin`] / [`define_plugin!`](crate::define_plugin) | Small plugins |
//!
//! ```rust,ignore
//! struct Objects;
//!
//! #[async_trait]
//! impl Plugin for Objects {
//!     fn name(&self) -> &str { "objects" }
//!     fn dependencies(&self) -> Vec<String> { vec!["db".into()] }
//!
//!     async fn init(&self, ctx: &PluginContext) -> Result<(), BoxError> {
//!         ctx.register_service("objects", ObjectStore::default());
//!         Ok(())
//!     }
//! }
//! ```

mod descriptor;
mod function;
mod manifest;

use async_trait::async_trait;

use keystone_core::BoxError;

use crate::context::PluginContext;

pub use descriptor::{PluginDescriptor, PluginState};
pub use function::FnPlugin;
pub use manifest::{LifecycleHooks, ManifestPlugin, NoHooks};

// ─── Capabilities ─────────────────────────────────────────────────────────────

/// One optional lifecycle hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PluginCapability {
    Init,
    Start,
    Destroy,
}

impl PluginCapability {
    const fn bit(self) -> u8 {
        match self {
            Self::Init => 0b001,
            Self::Start => 0b010,
            Self::Destroy => 0b100,
        }
    }
}

/// The set of lifecycle hooks a plugin implements.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct CapabilitySet(u8);

impl CapabilitySet {
    /// No hooks: the plugin only contributes metadata.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Every hook.
    pub const fn all() -> Self {
        Self(0b111)
    }

    /// Adds `capability` (builder pattern).
    pub const fn with(self, capability: PluginCapability) -> Self {
        Self(self.0 | capability.bit())
    }

    /// Returns `true` if `capability` is in the set.
    pub const fn contains(self, capability: PluginCapability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl Default for CapabilitySet {
    fn default() -> Self {
        Self::all()
    }
}

impl FromIterator<PluginCapability> for CapabilitySet {
    fn from_iter<I: IntoIterator<Item = PluginCapability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::empty(), Self::with)
    }
}

impl std::fmt::Debug for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let caps: Vec<PluginCapability> = [
            PluginCapability::Init,
            PluginCapability::Start,
            PluginCapability::Destroy,
        ]
        .into_iter()
        .filter(|&c| self.contains(c))
        .collect();
        f.debug_set().entries(caps).finish()
    }
}

// ─── Plugin ───────────────────────────────────────────────────────────────────

/// A unit of functionality managed by the [`Kernel`](crate::Kernel).
///
/// Hooks are awaited one at a time: no two hooks of any plugins overlap, and
/// `init` of a plugin only runs after `init` of every dependency completed.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Unique id; also the storage namespace and configuration key.
    ///
    /// Must be non-empty and must not contain `':'`.
    fn name(&self) -> &str;

    fn version(&self) -> Option<&str> {
        None
    }

    fn description(&self) -> Option<&str> {
        None
    }

    /// Ids of plugins that must be initialized before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    /// Hooks this plugin implements. Hooks outside the set are never called.
    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::all()
    }

    /// Registers services and hooks. Runs in dependency order.
    async fn init(&self, _ctx: &PluginContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Begins active work. Runs after every plugin finished `init`.
    async fn start(&self, _ctx: &PluginContext) -> Result<(), BoxError> {
        Ok(())
    }

    /// Releases resources. Runs in reverse bootstrap order during shutdown.
    async fn destroy(&self) -> Result<(), BoxError> {
        Ok(())
    }
}
