//! Lifecycle and orchestration errors.

use std::time::Duration;

use thiserror::Error;

use keystone_core::{DependencyError, ServiceError};

/// Lifecycle step during which a plugin hook ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecyclePhase {
    Init,
    Start,
    Destroy,
}

impl LifecyclePhase {
    /// Lower-case name used in logs and messages.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Start => "start",
            Self::Destroy => "destroy",
        }
    }
}

impl std::fmt::Display for LifecyclePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a lifecycle hook failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginErrorKind {
    /// The hook returned `Err`.
    #[error("{0}")]
    Failed(String),

    /// The hook panicked.
    #[error("panicked: {0}")]
    Panicked(String),

    /// The hook did not finish within the configured hook timeout.
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
}

/// A lifecycle hook failure attributed to one plugin.
///
/// Fatal during `init` / `start` (bootstrap aborts), contained during
/// `destroy` (collected into the shutdown report).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("plugin '{plugin}' failed during {phase}: {kind}")]
pub struct PluginError {
    /// Id of the failing plugin.
    pub plugin: String,
    /// Hook that failed.
    pub phase: LifecyclePhase,
    /// Failure detail.
    pub kind: PluginErrorKind,
}

impl PluginError {
    pub fn new(plugin: impl Into<String>, phase: LifecyclePhase, kind: PluginErrorKind) -> Self {
        Self {
            plugin: plugin.into(),
            phase,
            kind,
        }
    }
}

/// Errors returned by [`Kernel`](crate::Kernel) operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KernelError {
    /// The dependency graph is malformed; no plugin hook was run.
    #[error(transparent)]
    Dependency(#[from] DependencyError),

    /// A plugin's `init` or `start` hook failed.
    #[error(transparent)]
    Plugin(#[from] PluginError),

    /// A dependency was not initialized when the dependent was about to be.
    #[error("plugin '{plugin}' requires '{dependency}', which is not initialized")]
    UnsatisfiedDependency {
        /// The plugin about to run.
        plugin: String,
        /// The dependency that is not ready.
        dependency: String,
    },

    /// `bootstrap` was called more than once.
    #[error("kernel has already been bootstrapped")]
    AlreadyBootstrapped,

    /// The operation needs a successfully bootstrapped kernel.
    #[error("kernel is not running")]
    NotRunning,

    /// No plugin is registered under the id.
    #[error("unknown plugin '{0}'")]
    UnknownPlugin(String),

    /// The plugin is not in a state that allows the operation.
    #[error("plugin '{plugin}' cannot be activated from state {state}")]
    InvalidState {
        /// The plugin id.
        plugin: String,
        /// Its current state.
        state: crate::plugin::PluginState,
    },

    /// A service lookup through the kernel failed.
    #[error(transparent)]
    Service(#[from] ServiceError),
}

impl KernelError {
    /// Returns the failing plugin id, if the error is attributable to one.
    pub fn plugin(&self) -> Option<&str> {
        match self {
            Self::Plugin(e) => Some(&e.plugin),
            Self::UnsatisfiedDependency { plugin, .. } | Self::InvalidState { plugin, .. } => {
                Some(plugin)
            }
            Self::UnknownPlugin(id) => Some(id),
            Self::Dependency(DependencyError::Missing { plugin, .. })
            | Self::Dependency(DependencyError::SelfDependency { plugin })
            | Self::Dependency(DependencyError::Duplicate { plugin }) => Some(plugin),
            _ => None,
        }
    }
}

/// Result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
