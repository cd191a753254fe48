//! Audit-trail plugin for Keystone.
//!
//! Publishes the `"audit"` service ([`AuditLog`]) and records every
//! configured hook event into it. The trail lives in the plugin's scoped
//! storage (`plugin:audit:entries`), so a kernel sharing the same backend
//! picks up where the previous one stopped.
//!
//! ```toml
//! [plugins.audit]
//! retention = 500
//! events = ["data:created", "data:deleted"]
//! ```
//!
//! # Consuming the service
//!
//! ```rust,ignore
//! async fn report_init(ctx: PluginContext) -> Result<(), BoxError> {
//!     let audit = ctx.get_service::<AuditLog>(AUDIT_SERVICE)?;
//!     ctx.logger().info(format!("{} audit entries on record", audit.len()));
//!     Ok(())
//! }
//! ```

mod service;

use std::sync::Arc;

use keystone::kernel::CapabilitySet;
use keystone::prelude::*;
use parking_lot::Mutex;
use tracing::{info, warn};

pub use service::{AuditConfig, AuditEntry, AuditLog, ENTRIES_KEY};

/// Plugin id, also the name of the published service.
pub const AUDIT_SERVICE: &str = "audit";

/// The audit plugin. Register with `kernel.use_plugin(AuditPlugin::default())`.
#[derive(Default)]
pub struct AuditPlugin {
    log: Mutex<Option<Arc<AuditLog>>>,
}

#[async_trait]
impl Plugin for AuditPlugin {
    fn name(&self) -> &str {
        AUDIT_SERVICE
    }

    fn version(&self) -> Option<&str> {
        Some(env!("CARGO_PKG_VERSION"))
    }

    fn description(&self) -> Option<&str> {
        Some("Records platform events into a bounded audit trail")
    }

    fn capabilities(&self) -> CapabilitySet {
        [PluginCapability::Init, PluginCapability::Destroy]
            .into_iter()
            .collect()
    }

    async fn init(&self, ctx: &PluginContext) -> Result<(), BoxError> {
        let config: AuditConfig = ctx.config()?;
        let log = Arc::new(AuditLog::new(ctx.storage().clone(), config.retention));

        let restored = log.restore().await?;
        if restored > 0 {
            info!(entries = restored, "Restored audit trail");
        }

        ctx.register_service_arc(AUDIT_SERVICE, log.clone(), RegisterOptions::default());

        for event in &config.events {
            let sink = log.clone();
            ctx.hook(event.clone(), move |hook: Arc<HookEvent>| {
                let sink = sink.clone();
                async move {
                    sink.record(hook.name(), hook.args().to_vec()).await?;
                    Ok::<(), BoxError>(())
                }
            });
        }

        ctx.logger().info(format!(
            "Auditing {} event(s), retention {}",
            config.events.len(),
            config.retention
        ));
        *self.log.lock() = Some(log);
        Ok(())
    }

    async fn destroy(&self) -> Result<(), BoxError> {
        let log = self.log.lock().take();
        match log {
            Some(log) => {
                log.flush().await?;
                info!(entries = log.len(), "Audit trail flushed");
            }
            None => warn!("Audit plugin destroyed before init"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use keystone::core::{MemoryStorage, PluginStorage};
    use serde_json::json;

    use super::*;

    fn producer() -> FnPlugin {
        FnPlugin::new("objects")
            .depends_on(AUDIT_SERVICE)
            .on_start(|ctx: PluginContext| async move {
                ctx.trigger("data:created", vec![json!("invoice"), json!(7)]).await;
                ctx.trigger("data:ignored", vec![]).await;
                Ok::<(), BoxError>(())
            })
    }

    #[tokio::test]
    async fn test_records_hooked_events() {
        let kernel = Kernel::new();
        kernel.use_plugin(producer()).use_plugin(AuditPlugin::default());
        kernel.bootstrap().await.unwrap();

        assert_eq!(kernel.bootstrap_order(), ["audit", "objects"]);
        let audit = kernel.get_service::<AuditLog>(AUDIT_SERVICE).unwrap();
        let entries = audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event, "data:created");
        assert_eq!(entries[0].args, [json!("invoice"), json!(7)]);

        let report = kernel.shutdown().await;
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_configured_events_and_retention() {
        let kernel = Kernel::with_config(KernelConfig::new().plugin_config(
            AUDIT_SERVICE,
            json!({ "retention": 1, "events": ["data:created", "data:ignored"] }),
        ));
        kernel.use_plugin(AuditPlugin::default()).use_plugin(producer());
        kernel.bootstrap().await.unwrap();

        let audit = kernel.get_service::<AuditLog>(AUDIT_SERVICE).unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit.entries()[0].event, "data:ignored");
        assert_eq!(audit.entries()[0].seq, 2);
    }

    #[tokio::test]
    async fn test_trail_survives_kernel_restart() {
        let backend = Arc::new(MemoryStorage::new());

        let first = Kernel::builder().storage(backend.clone()).build();
        first.use_plugin(AuditPlugin::default()).use_plugin(producer());
        first.bootstrap().await.unwrap();
        first.shutdown().await;

        let second = Kernel::builder().storage(backend.clone()).build();
        second.use_plugin(AuditPlugin::default()).use_plugin(producer());
        second.bootstrap().await.unwrap();

        let audit = second.get_service::<AuditLog>(AUDIT_SERVICE).unwrap();
        let seqs: Vec<u64> = audit.entries().iter().map(|e| e.seq).collect();
        assert_eq!(seqs, [1, 2]);
        assert!(backend.has("plugin:audit:entries").await.unwrap());
    }
}
