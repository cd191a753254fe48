//! Closure-based plugins.
//!
//! [`FnPlugin`] builds a [`Plugin`] out of async closures, and the
//! [`define_plugin!`](crate::define_plugin) macro wraps that builder in a
//! declarative block:
//!
//! ```rust,ignore
//! async fn audit_init(ctx: PluginContext) -> anyhow::Result<()> {
//!     ctx.register_service("audit.log", AuditLog::default());
//!     Ok(())
//! }
//!
//! let audit = define_plugin! {
//!     /// Records every created object.
//!     name: "audit",
//!     dependencies: ["objects"],
//!     init: audit_init,
//! };
//! kernel.use_plugin(audit);
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use keystone_core::BoxError;

use super::{CapabilitySet, Plugin, PluginCapability};
use crate::context::PluginContext;

type ContextHook = Arc<dyn Fn(PluginContext) -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;
type TeardownHook = Arc<dyn Fn() -> BoxFuture<'static, Result<(), BoxError>> + Send + Sync>;

/// A [`Plugin`] whose hooks are closures.
///
/// Only the hooks that were set are reported in
/// [`capabilities`](Plugin::capabilities).
#[derive(Clone)]
pub struct FnPlugin {
    name: String,
    version: Option<String>,
    description: Option<String>,
    dependencies: Vec<String>,
    on_init: Option<ContextHook>,
    on_start: Option<ContextHook>,
    on_destroy: Option<TeardownHook>,
}

impl FnPlugin {
    /// Creates a plugin with no hooks.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: None,
            description: None,
            dependencies: Vec::new(),
            on_init: None,
            on_start: None,
            on_destroy: None,
        }
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the description; an empty string clears it.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        self.description = (!description.is_empty()).then_some(description);
        self
    }

    pub fn depends_on(mut self, id: impl Into<String>) -> Self {
        self.dependencies.push(id.into());
        self
    }

    /// Sets the `init` hook. The closure receives an owned context handle.
    pub fn on_init<F, Fut, E>(mut self, hook: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.on_init = Some(context_hook(hook));
        self
    }

    /// Sets the `start` hook.
    pub fn on_start<F, Fut, E>(mut self, hook: F) -> Self
    where
        F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.on_start = Some(context_hook(hook));
        self
    }

    /// Sets the `destroy` hook.
    pub fn on_destroy<F, Fut, E>(mut self, hook: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Into<BoxError>,
    {
        self.on_destroy = Some(Arc::new(move || {
            let fut = hook();
            Box::pin(async move { fut.await.map_err(Into::into) })
        }));
        self
    }
}

fn context_hook<F, Fut, E>(hook: F) -> ContextHook
where
    F: Fn(PluginContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send + 'static,
    E: Into<BoxError>,
{
    Arc::new(move |ctx| {
        let fut = hook(ctx);
        Box::pin(async move { fut.await.map_err(Into::into) })
    })
}

#[async_trait]
impl Plugin for FnPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    fn capabilities(&self) -> CapabilitySet {
        let mut set = CapabilitySet::empty();
        if self.on_init.is_some() {
            set = set.with(PluginCapability::Init);
        }
        if self.on_start.is_some() {
            set = set.with(PluginCapability::Start);
        }
        if self.on_destroy.is_some() {
            set = set.with(PluginCapability::Destroy);
        }
        set
    }

    async fn init(&self, ctx: &PluginContext) -> Result<(), BoxError> {
        match &self.on_init {
            Some(hook) => hook(ctx.clone()).await,
            None => Ok(()),
        }
    }

    async fn start(&self, ctx: &PluginContext) -> Result<(), BoxError> {
        match &self.on_start {
            Some(hook) => hook(ctx.clone()).await,
            None => Ok(()),
        }
    }

    async fn destroy(&self) -> Result<(), BoxError> {
        match &self.on_destroy {
            Some(hook) => hook().await,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for FnPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnPlugin")
            .field("name", &self.name)
            .field("version", &self.version)
            .field("dependencies", &self.dependencies)
            .field("capabilities", &self.capabilities())
            .finish()
    }
}

// ─── define_plugin! ──────────────────────────────────────────────────────────

/// Declares an [`FnPlugin`].
///
/// `name` must come first; every other field is optional and may appear in
/// any order. Doc comments above `name` become the description, and the
/// version defaults to `CARGO_PKG_VERSION` of the calling crate.
///
/// ```rust,ignore
/// let plugin = define_plugin! {
///     /// Keeps the object cache warm.
///     name: "cache",
///     version: "0.3.0",
///     dependencies: ["objects", "db"],
///     init: cache_init,        // async fn(PluginContext) -> Result<(), E>
///     start: cache_start,      // async fn(PluginContext) -> Result<(), E>
///     destroy: cache_destroy,  // async fn() -> Result<(), E>
/// };
/// ```
///
/// | Field | Description |
/// |-------|-------------|
/// | `name` | Plugin id. Required, must be first. |
/// | `version` | Version string |
/// | `dependencies` | `[id, …]` |
/// | `init` / `start` | `Fn(PluginContext) -> impl Future<Output = Result<(), E>>` |
/// | `destroy` | `Fn() -> impl Future<Output = Result<(), E>>` |
#[macro_export]
macro_rules! define_plugin {
    ($(#[doc = $doc:literal])* name: $name:expr $(, $($rest:tt)*)?) => {{
        let __plugin = $crate::plugin::FnPlugin::new($name)
            .with_version(::std::env!("CARGO_PKG_VERSION"))
            .with_description(::std::concat!($($doc, "\n",)* "").trim());
        $crate::define_plugin!(@field __plugin; $($($rest)*)?)
    }};

    (@field $p:expr; ) => {
        $p
    };

    (@field $p:expr; version: $v:expr $(, $($rest:tt)*)?) => {
        $crate::define_plugin!(@field $p.with_version($v); $($($rest)*)?)
    };

    (@field $p:expr; dependencies: [$($dep:expr),* $(,)?] $(, $($rest:tt)*)?) => {
        $crate::define_plugin!(@field $p $(.depends_on($dep))*; $($($rest)*)?)
    };

    (@field $p:expr; init: $f:expr $(, $($rest:tt)*)?) => {
        $crate::define_plugin!(@field $p.on_init($f); $($($rest)*)?)
    };

    (@field $p:expr; start: $f:expr $(, $($rest:tt)*)?) => {
        $crate::define_plugin!(@field $p.on_start($f); $($($rest)*)?)
    };

    (@field $p:expr; destroy: $f:expr $(, $($rest:tt)*)?) => {
        $crate::define_plugin!(@field $p.on_destroy($f); $($($rest)*)?)
    };
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{Kernel, PluginState};

    static DESTROYED: AtomicUsize = AtomicUsize::new(0);

    async fn publish(ctx: PluginContext) -> Result<(), BoxError> {
        ctx.register_service("greeting", String::from("hello"));
        Ok(())
    }

    async fn teardown() -> Result<(), BoxError> {
        DESTROYED.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    #[test]
    fn test_capabilities_follow_hooks() {
        let plugin = FnPlugin::new("p").on_start(|_ctx| async { Ok::<(), BoxError>(()) });
        let caps = plugin.capabilities();
        assert!(caps.contains(PluginCapability::Start));
        assert!(!caps.contains(PluginCapability::Init));
        assert!(FnPlugin::new("q").capabilities().is_empty());
    }

    #[test]
    fn test_macro_fields() {
        let plugin = define_plugin! {
            /// Greets.
            name: "greeter",
            version: "2.0.0",
            dependencies: ["a", "b"],
            init: publish,
        };
        assert_eq!(plugin.name(), "greeter");
        assert_eq!(plugin.version(), Some("2.0.0"));
        assert_eq!(plugin.description(), Some("Greets."));
        assert_eq!(plugin.dependencies(), ["a", "b"]);
        assert!(plugin.capabilities().contains(PluginCapability::Init));

        let bare = define_plugin! { name: "bare" };
        assert_eq!(bare.version(), Some(env!("CARGO_PKG_VERSION")));
        assert_eq!(bare.description(), None);
    }

    #[test]
    fn test_builder_metadata_reaches_descriptor() {
        let plugin = FnPlugin::new("reports")
            .with_version("1.4.0")
            .with_description("Nightly summaries")
            .depends_on("objects");
        assert_eq!(plugin.version(), Some("1.4.0"));
        assert_eq!(plugin.description(), Some("Nightly summaries"));

        let descriptor = crate::plugin::PluginDescriptor::of(&plugin);
        assert_eq!(descriptor.version.as_deref(), Some("1.4.0"));
        assert_eq!(descriptor.dependencies, ["objects"]);

        let cleared = FnPlugin::new("quiet").with_description("");
        assert_eq!(cleared.description(), None);
    }

    #[tokio::test]
    async fn test_macro_plugin_runs_in_kernel() {
        let kernel = Kernel::new();
        kernel.use_plugin(define_plugin! {
            name: "greeter",
            init: publish,
            destroy: teardown,
        });

        kernel.bootstrap().await.unwrap();
        assert_eq!(*kernel.get_service::<String>("greeting").unwrap(), "hello");

        kernel.shutdown().await;
        assert_eq!(DESTROYED.load(Ordering::SeqCst), 1);
        assert_eq!(kernel.plugin_state("greeter"), Some(PluginState::Destroyed));
    }
}
