//! The plugins that make up the demo platform.
//!
//! Each plugin and what it depends on:
//!
//! ```text
//! objects    ◀── db
//! automation ◀── objects
//! seed       ◀── objects, audit
//! ui         ◀── objects, automation, audit
//! ```
//!
//! `seed` and `ui` do not depend on each other, so `ui` (registered first)
//! boots before `seed`.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use keystone::prelude::*;
use keystone_plugin_audit::{AUDIT_SERVICE, AuditPlugin};
use serde_json::{Value, json};
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Fired by the objects service after every insert. Args: `[kind, id, record]`.
pub const DATA_CREATED: &str = "data:created";

/// Every plugin of the platform, in the order they are registered.
pub fn all() -> Vec<Arc<dyn Plugin>> {
    vec![
        Arc::new(ui()),
        Arc::new(seed()),
        Arc::new(automation()),
        Arc::new(objects()),
        Arc::new(database()),
        Arc::new(AuditPlugin::default()),
    ]
}

// ─── db ───────────────────────────────────────────────────────────────────────

/// Record tables keyed by object kind.
#[derive(Default)]
pub struct Database {
    tables: RwLock<HashMap<String, Vec<Value>>>,
}

impl Database {
    /// Inserts `record` and returns its 1-based row id.
    pub async fn insert(&self, kind: &str, record: Value) -> usize {
        let mut tables = self.tables.write().await;
        let rows = tables.entry(kind.to_string()).or_default();
        rows.push(record);
        rows.len()
    }

    pub async fn count(&self, kind: &str) -> usize {
        self.tables.read().await.get(kind).map_or(0, Vec::len)
    }

    pub async fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.tables.read().await.keys().cloned().collect();
        kinds.sort();
        kinds
    }
}

fn database() -> FnPlugin {
    define_plugin! {
        /// In-memory record store.
        name: "db",
        init: db_init,
        destroy: db_destroy,
    }
}

async fn db_init(ctx: PluginContext) -> Result<(), BoxError> {
    ctx.register_service("db", Database::default());
    Ok(())
}

async fn db_destroy() -> Result<(), BoxError> {
    info!("Database closed");
    Ok(())
}

// ─── objects ──────────────────────────────────────────────────────────────────

/// Typed access to records, announcing each insert on the hook bus.
pub struct ObjectService {
    db: Arc<Database>,
}

impl ObjectService {
    /// Stores a record and fires [`DATA_CREATED`] through the caller's context.
    pub async fn create(&self, ctx: &PluginContext, kind: &str, record: Value) -> usize {
        let id = self.db.insert(kind, record.clone()).await;
        let report = ctx.trigger(DATA_CREATED, vec![json!(kind), json!(id), record]).await;
        if !report.is_ok() {
            warn!(
                kind,
                id,
                failed = report.errors.len(),
                "Some data:created handlers failed"
            );
        }
        id
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.db
    }
}

fn objects() -> FnPlugin {
    define_plugin! {
        /// Object model on top of the record store.
        name: "objects",
        dependencies: ["db"],
        init: objects_init,
    }
}

async fn objects_init(ctx: PluginContext) -> Result<(), BoxError> {
    let db = ctx.get_service::<Database>("db")?;
    ctx.register_service("objects", ObjectService { db });
    Ok(())
}

// ─── automation ───────────────────────────────────────────────────────────────

/// Counts workflow rule executions.
#[derive(Default)]
pub struct Automation {
    fired: AtomicUsize,
}

impl Automation {
    pub fn fired(&self) -> usize {
        self.fired.load(Ordering::Relaxed)
    }
}

fn automation() -> FnPlugin {
    define_plugin! {
        /// Runs workflow rules when records are created.
        name: "automation",
        dependencies: ["objects"],
        init: automation_init,
    }
}

async fn automation_init(ctx: PluginContext) -> Result<(), BoxError> {
    let automation = Arc::new(Automation::default());
    ctx.register_service_arc("automation", automation.clone(), RegisterOptions::default());

    ctx.hook(DATA_CREATED, move |event: Arc<HookEvent>| {
        let automation = automation.clone();
        async move {
            let kind: String = event.arg_as(0)?;
            if kind == "invoice" {
                automation.fired.fetch_add(1, Ordering::Relaxed);
                info!(id = ?event.arg(1), "Invoice rule fired");
            }
            Ok::<(), BoxError>(())
        }
    });
    Ok(())
}

// ─── seed ─────────────────────────────────────────────────────────────────────

fn seed() -> FnPlugin {
    define_plugin! {
        /// Inserts demo records on start (`[plugins.seed] records = N`).
        name: "seed",
        dependencies: ["objects", "audit"],
        start: seed_start,
    }
}

async fn seed_start(ctx: PluginContext) -> Result<(), BoxError> {
    let records = ctx
        .config_value()
        .get("records")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let objects = ctx.get_service::<ObjectService>("objects")?;

    for n in 0..records {
        let kind = if n % 2 == 0 { "invoice" } else { "customer" };
        objects
            .create(&ctx, kind, json!({ "name": format!("{kind}-{n}") }))
            .await;
    }
    ctx.logger().info(format!("Seeded {records} record(s)"));
    Ok(())
}

// ─── ui ───────────────────────────────────────────────────────────────────────

/// Behaviour of the manifest-described UI plugin.
struct UiHooks;

#[async_trait]
impl LifecycleHooks for UiHooks {
    async fn on_enable(&self, ctx: &PluginContext) -> Result<(), BoxError> {
        let objects = ctx.get_service::<ObjectService>("objects")?;
        let kinds = objects.database().kinds().await;
        ctx.logger().info(format!("Serving views for {kinds:?}"));
        Ok(())
    }

    async fn on_disable(&self) -> Result<(), BoxError> {
        info!("UI stopped serving");
        Ok(())
    }
}

fn ui() -> ManifestPlugin<UiHooks> {
    let manifest = PluginManifest::new("ui")
        .version("0.1.0")
        .description("Web views over every object kind")
        .depends_on("objects", "^0.1")
        .depends_on("automation", "*")
        .depends_on(AUDIT_SERVICE, "*");
    ManifestPlugin::new(manifest, UiHooks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use keystone::core::{DependencyNode, DependencyResolver};
    use keystone::kernel::PluginDescriptor;
    use keystone_plugin_audit::AuditLog;

    #[tokio::test]
    async fn test_platform_boots_and_seeds() {
        let kernel = Kernel::with_config(
            KernelConfig::new().plugin_config("seed", json!({ "records": 4 })),
        );
        for plugin in all() {
            kernel.use_plugin_arc(plugin);
        }
        kernel.bootstrap().await.unwrap();

        let order = kernel.bootstrap_order();
        assert_eq!(order, ["db", "objects", "automation", "audit", "ui", "seed"]);

        let db = kernel.get_service::<Database>("db").unwrap();
        assert_eq!(db.count("invoice").await, 2);
        assert_eq!(db.count("customer").await, 2);
        assert_eq!(kernel.get_service::<Automation>("automation").unwrap().fired(), 2);
        assert_eq!(kernel.get_service::<AuditLog>(AUDIT_SERVICE).unwrap().len(), 4);

        assert!(kernel.shutdown().await.is_clean());
    }

    #[test]
    fn test_plan_respects_dependencies() {
        let nodes: Vec<DependencyNode> = all()
            .iter()
            .map(|p| {
                let d = PluginDescriptor::of(p.as_ref());
                DependencyNode::new(d.id, d.dependencies)
            })
            .collect();
        let order = DependencyResolver::resolve(&nodes).unwrap();

        let at = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(at("db") < at("objects"));
        assert!(at("objects") < at("automation"));
        assert!(at("audit") < at("seed"));
        assert!(at("automation") < at("ui"));
        assert!(at("objects") < at("ui"));
        assert!(at("audit") < at("ui"));
    }
}
