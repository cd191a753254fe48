//! Event bus (hook dispatcher).
//!
//! Plugins observe named occurrences by registering handlers with
//! [`EventBus::hook`] and announce them with [`EventBus::trigger`].
//!
//! # Dispatch semantics
//!
//! - Handlers run **sequentially in registration order**; each one is awaited
//!   before the next starts.
//! - A handler that returns `Err` or panics is logged and recorded in the
//!   returned [`TriggerReport`]; the remaining handlers still run.
//! - `trigger` itself never fails.
//!
//! Handlers are stored as type-erased tower services, so any
//! `Service<Arc<HookEvent>>` can be registered through
//! [`hook_service`](EventBus::hook_service), including ones wrapped in tower
//! layers.
//!
//! ```rust,ignore
//! let bus = EventBus::new();
//! bus.hook("data:created", |event: Arc<HookEvent>| async move {
//!     info!(record = ?event.arg(0), "record created");
//!     Ok(())
//! });
//!
//! let report = bus.trigger("data:created", vec![json!({ "id": 7 })]).await;
//! assert!(report.is_ok());
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tower::util::BoxCloneSyncService;
use tower::{Service, ServiceExt, service_fn};
use tracing::{Instrument, Level, debug, error, span};

use crate::error::{BoxError, HookHandlerError, describe_panic};

// ─── HookEvent ────────────────────────────────────────────────────────────────

/// Payload delivered to every handler of one `trigger` call.
#[derive(Debug, Clone, PartialEq)]
pub struct HookEvent {
    name: String,
    args: Vec<Value>,
}

impl HookEvent {
    /// Creates a payload for `name` with positional `args`.
    pub fn new(name: impl Into<String>, args: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            args,
        }
    }

    /// The event name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All positional arguments.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// The argument at `index`, if present.
    pub fn arg(&self, index: usize) -> Option<&Value> {
        self.args.get(index)
    }

    /// Deserializes the argument at `index` into `T`.
    ///
    /// A missing argument is treated as `null`.
    pub fn arg_as<T: DeserializeOwned>(&self, index: usize) -> serde_json::Result<T> {
        T::deserialize(self.args.get(index).unwrap_or(&Value::Null))
    }
}

/// Type-erased handler as stored by the bus.
pub type BoxedHookHandler = BoxCloneSyncService<Arc<HookEvent>, (), BoxError>;

// ─── TriggerReport ────────────────────────────────────────────────────────────

/// Outcome of one [`EventBus::trigger`] call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriggerReport {
    /// Event name that was dispatched.
    pub event: String,
    /// Number of handlers that were invoked.
    pub invoked: usize,
    /// Failures captured along the way, in handler order.
    pub errors: Vec<HookHandlerError>,
}

impl TriggerReport {
    fn new(event: &str) -> Self {
        Self {
            event: event.to_string(),
            ..Default::default()
        }
    }

    /// Returns `true` if every invoked handler succeeded.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Number of handlers that completed without error.
    pub fn succeeded(&self) -> usize {
        self.invoked - self.errors.len()
    }
}

// ─── EventBus ─────────────────────────────────────────────────────────────────

/// Named lists of asynchronous handlers with per-handler failure isolation.
#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<BoxedHookHandler>>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an async closure handler for `event`.
    pub fn hook<F, Fut>(&self, event: impl Into<String>, handler: F)
    where
        F: Fn(Arc<HookEvent>) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.hook_service(event, service_fn(handler));
    }

    /// Appends any tower service as a handler for `event`.
    pub fn hook_service<S>(&self, event: impl Into<String>, service: S)
    where
        S: Service<Arc<HookEvent>, Response = (), Error = BoxError> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        let event = event.into();
        let mut map = self.handlers.write();
        let list = map.entry(event.clone()).or_default();
        list.push(BoxCloneSyncService::new(service));
        debug!(event = %event, handlers = list.len(), "Hook registered");
    }

    /// Invokes every handler registered for `event`, in registration order.
    ///
    /// The handler list is snapshotted first: handlers registered while this
    /// call is in flight only see later triggers.
    pub async fn trigger(&self, event: &str, args: Vec<Value>) -> TriggerReport {
        let handlers: Vec<BoxedHookHandler> = self
            .handlers
            .read()
            .get(event)
            .cloned()
            .unwrap_or_default();

        let mut report = TriggerReport::new(event);
        if handlers.is_empty() {
            return report;
        }

        let payload = Arc::new(HookEvent::new(event, args));

        async {
            for (index, handler) in handlers.into_iter().enumerate() {
                let outcome = AssertUnwindSafe(handler.oneshot(Arc::clone(&payload)))
                    .catch_unwind()
                    .await;
                report.invoked += 1;

                let failure = match outcome {
                    Ok(Ok(())) => None,
                    Ok(Err(e)) => Some((e.to_string(), false)),
                    Err(panic) => Some((describe_panic(&*panic), true)),
                };

                if let Some((message, panicked)) = failure {
                    error!(
                        event    = %event,
                        handler  = index,
                        panicked,
                        error    = %message,
                        "Hook handler failed; continuing with remaining handlers"
                    );
                    report.errors.push(HookHandlerError {
                        event: event.to_string(),
                        index,
                        message,
                        panicked,
                    });
                }
            }
        }
        .instrument(span!(Level::DEBUG, "trigger", event = %event))
        .await;

        debug!(
            event   = %event,
            invoked = report.invoked,
            failed  = report.errors.len(),
            "Hook dispatch complete"
        );
        report
    }

    /// Number of handlers registered for `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.read().get(event).map_or(0, Vec::len)
    }

    /// Names of all events with at least one handler, sorted.
    pub fn events(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Removes every handler for `event`, returning how many were removed.
    pub fn clear(&self, event: &str) -> usize {
        self.handlers.write().remove(event).map_or(0, |list| list.len())
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("events", &self.events())
            .finish()
    }
}
