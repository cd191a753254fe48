//! Manifest-described plugins with install/enable lifecycle hooks.
//!
//! External loaders produce a [`PluginManifest`] from metadata files; the
//! behaviour lives in a [`LifecycleHooks`] implementation. [`ManifestPlugin`]
//! joins the two into a regular [`Plugin`]:
//!
//! | Plugin hook | Lifecycle hooks |
//! |-------------|-----------------|
//! | `init` | `on_install` |
//! | `start` | `on_enable` |
//! | `destroy` | `on_disable`, then `on_uninstall` |

use async_trait::async_trait;

use keystone_core::{BoxError, PluginManifest};

use super::{CapabilitySet, Plugin};
use crate::context::PluginContext;

/// Install / enable / disable / uninstall callbacks of a manifest plugin.
#[async_trait]
pub trait LifecycleHooks: Send + Sync + 'static {
    async fn on_install(&self, _ctx: &PluginContext) -> Result<(), BoxError> {
        Ok(())
    }

    async fn on_enable(&self, _ctx: &PluginContext) -> Result<(), BoxError> {
        Ok(())
    }

    async fn on_disable(&self) -> Result<(), BoxError> {
        Ok(())
    }

    async fn on_uninstall(&self) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Hooks for a manifest that carries no behaviour, only a position in the
/// dependency graph.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl LifecycleHooks for NoHooks {}

/// A [`Plugin`] assembled from a manifest and its lifecycle hooks.
#[derive(Debug, Clone)]
pub struct ManifestPlugin<H = NoHooks> {
    manifest: PluginManifest,
    hooks: H,
}

impl<H: LifecycleHooks> ManifestPlugin<H> {
    pub fn new(manifest: PluginManifest, hooks: H) -> Self {
        Self { manifest, hooks }
    }

    pub fn manifest(&self) -> &PluginManifest {
        &self.manifest
    }

    pub fn hooks(&self) -> &H {
        &self.hooks
    }
}

impl ManifestPlugin<NoHooks> {
    /// A plugin with the manifest's metadata and no behaviour.
    pub fn bare(manifest: PluginManifest) -> Self {
        Self::new(manifest, NoHooks)
    }
}

#[async_trait]
impl<H: LifecycleHooks> Plugin for ManifestPlugin<H> {
    fn name(&self) -> &str {
        &self.manifest.id
    }

    fn version(&self) -> Option<&str> {
        self.manifest.version.as_deref()
    }

    fn description(&self) -> Option<&str> {
        self.manifest.description.as_deref()
    }

    fn dependencies(&self) -> Vec<String> {
        self.manifest.dependency_ids()
    }

    fn capabilities(&self) -> CapabilitySet {
        CapabilitySet::all()
    }

    async fn init(&self, ctx: &PluginContext) -> Result<(), BoxError> {
        self.hooks.on_install(ctx).await
    }

    async fn start(&self, ctx: &PluginContext) -> Result<(), BoxError> {
        self.hooks.on_enable(ctx).await
    }

    /// Runs `on_uninstall` even when `on_disable` fails; the first error wins.
    async fn destroy(&self) -> Result<(), BoxError> {
        let disabled = self.hooks.on_disable().await;
        let uninstalled = self.hooks.on_uninstall().await;
        disabled.and(uninstalled)
    }
}
