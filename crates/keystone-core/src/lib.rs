//! # Keystone Core
//!
//! Leaf components of the Keystone plugin microkernel. Nothing in this crate
//! knows about plugin lifecycles; `keystone-kernel` composes these pieces.
//!
//! | Component | Module | Role |
//! |-----------|--------|------|
//! | [`DependencyResolver`] | [`resolver`] | Deterministic topological bootstrap order |
//! | [`ServiceRegistry`] | [`service`] | Shared name → instance container |
//! | [`EventBus`] | [`event`] | Sequential, failure-isolated hook dispatch |
//! | [`PluginStorage`] | [`storage`] | Async key-value store with per-plugin scoping |
//! | [`PluginLogger`] | [`logger`] | `tracing` records stamped with a plugin id |
//!
//! ## Example
//!
//! ```rust,ignore
//! use keystone_core::{DependencyNode, DependencyResolver};
//!
//! let order = DependencyResolver::resolve(&[
//!     DependencyNode::new("automation", ["objects"]),
//!     DependencyNode::new("objects", [] as [&str; 0]),
//! ])?;
//! assert_eq!(order, ["objects", "automation"]);
//! ```

pub mod error;
pub mod event;
pub mod logger;
pub mod manifest;
pub mod resolver;
pub mod service;
pub mod storage;

pub use error::{
    BoxError, DependencyError, DependencyResult, HookHandlerError, ServiceError, ServiceResult,
    StorageError, StorageResult, describe_panic,
};
pub use event::{BoxedHookHandler, EventBus, HookEvent, TriggerReport};
pub use logger::PluginLogger;
pub use manifest::PluginManifest;
pub use resolver::{DependencyNode, DependencyResolver, build_graph};
pub use service::{RegisterOptions, ServiceArc, ServiceRegistry};
pub use storage::{
    MemoryStorage, PluginStorage, ScopedStorage, StorageExt, StorageFactory, is_valid_namespace,
};
