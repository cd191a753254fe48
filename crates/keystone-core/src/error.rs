//! Unified error types for the Keystone core components.
//!
//! Lifecycle errors (`PluginError`, `KernelError`) live in `keystone-kernel`;
//! this module only covers the leaf components.

use std::any::Any;

use thiserror::Error;

/// Type-erased error returned by plugin hooks and event handlers.
pub use tower::BoxError;

// =============================================================================
// Dependency Errors
// =============================================================================

/// Structural faults found while resolving the plugin dependency graph.
///
/// Always fatal: the kernel aborts `bootstrap` before any plugin hook runs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DependencyError {
    /// A node depends on an id that is not part of the graph.
    #[error("missing dependency: plugin '{plugin}' depends on unknown plugin '{dependency}'")]
    Missing {
        /// The dependent plugin.
        plugin: String,
        /// The id that could not be found.
        dependency: String,
    },

    /// A node lists itself as a dependency.
    #[error("self-dependency: plugin '{plugin}' depends on itself")]
    SelfDependency {
        /// The offending plugin.
        plugin: String,
    },

    /// The graph contains a cycle of length two or more.
    #[error("circular dependency: {}", cycle.join(" -> "))]
    Circular {
        /// Ids on the cycle in path order; the first id is repeated at the end.
        cycle: Vec<String>,
    },

    /// The same id appears twice in the node list.
    #[error("duplicate plugin id '{plugin}' in dependency graph")]
    Duplicate {
        /// The repeated id.
        plugin: String,
    },
}

// =============================================================================
// Service Errors
// =============================================================================

/// Errors returned by [`ServiceRegistry`](crate::ServiceRegistry) lookups.
///
/// Recoverable: callers with optional dependencies should guard with
/// `has_service` first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// No service is registered under the name.
    #[error("service not found: '{0}'")]
    NotFound(String),

    /// A service exists but holds a different concrete type.
    #[error("service '{name}' is not of type '{expected}'")]
    TypeMismatch {
        /// The service name.
        name: String,
        /// The requested type name.
        expected: &'static str,
    },
}

// =============================================================================
// Hook Errors
// =============================================================================

/// A single event handler failure, captured by the [`EventBus`](crate::EventBus).
///
/// Never returned as `Err` from `trigger`; collected in a
/// [`TriggerReport`](crate::TriggerReport) instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("handler #{index} for event '{event}' failed: {message}")]
pub struct HookHandlerError {
    /// Event name that was being dispatched.
    pub event: String,
    /// Position of the handler in registration order.
    pub index: usize,
    /// Rendered error or panic message.
    pub message: String,
    /// Whether the handler panicked rather than returning `Err`.
    pub panicked: bool,
}

// =============================================================================
// Storage Errors
// =============================================================================

/// Errors that can occur in storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend failed to complete the operation.
    #[error("storage backend error: {0}")]
    Backend(#[source] BoxError),

    /// The plugin id cannot form a `plugin:<id>:` namespace.
    #[error("invalid storage namespace '{0}': must be non-empty and must not contain ':'")]
    InvalidNamespace(String),

    /// A typed value could not be converted to or from JSON.
    #[error("storage serialization error for key '{key}': {source}")]
    Serialization {
        /// The key being read or written.
        key: String,
        /// The underlying serde error.
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Wraps an arbitrary backend error.
    pub fn backend(err: impl Into<BoxError>) -> Self {
        Self::Backend(err.into())
    }
}

/// Renders a panic payload caught with `catch_unwind` as a message.
pub fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Result type for dependency resolution.
pub type DependencyResult<T> = Result<T, DependencyError>;

/// Result type for service lookups.
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
