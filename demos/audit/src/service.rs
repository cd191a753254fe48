use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use keystone::core::error::StorageResult;
use keystone::core::{ScopedStorage, StorageExt};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// Storage key (inside the plugin's namespace) holding the persisted trail.
pub const ENTRIES_KEY: &str = "entries";

// ─── AuditConfig ──────────────────────────────────────────────────────────────

/// Configuration for the audit plugin.
///
/// ```toml
/// [plugins.audit]
/// retention = 500
/// events = ["data:created", "data:deleted"]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Maximum number of entries kept; the oldest are dropped first.
    pub retention: usize,
    /// Hook events that produce an entry.
    pub events: Vec<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            retention: 1_000,
            events: vec!["data:created".to_string()],
        }
    }
}

// ─── AuditEntry ───────────────────────────────────────────────────────────────

/// One recorded event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Monotonic sequence number, never reused.
    pub seq: u64,
    pub event: String,
    pub args: Vec<Value>,
}

// ─── AuditLog ─────────────────────────────────────────────────────────────────

/// The `"audit"` service: an append-only, size-bounded event trail mirrored
/// into the plugin's scoped storage.
pub struct AuditLog {
    storage: ScopedStorage,
    retention: usize,
    entries: Mutex<VecDeque<AuditEntry>>,
    next_seq: AtomicU64,
}

impl AuditLog {
    pub fn new(storage: ScopedStorage, retention: usize) -> Self {
        Self {
            storage,
            retention: retention.max(1),
            entries: Mutex::new(VecDeque::new()),
            next_seq: AtomicU64::new(1),
        }
    }

    /// Reloads a previously persisted trail. Returns the number of entries.
    pub async fn restore(&self) -> StorageResult<usize> {
        let persisted: Vec<AuditEntry> = self.storage.get_as(ENTRIES_KEY).await?.unwrap_or_default();
        let next = persisted.last().map_or(1, |e| e.seq + 1);

        let restored = {
            let mut entries = self.entries.lock();
            *entries = persisted.into();
            while entries.len() > self.retention {
                entries.pop_front();
            }
            entries.len()
        };
        self.next_seq.store(next, Ordering::SeqCst);
        Ok(restored)
    }

    /// Appends an entry and persists the trail.
    pub async fn record(&self, event: &str, args: Vec<Value>) -> StorageResult<AuditEntry> {
        let entry = AuditEntry {
            seq: self.next_seq.fetch_add(1, Ordering::SeqCst),
            event: event.to_string(),
            args,
        };

        {
            let mut entries = self.entries.lock();
            entries.push_back(entry.clone());
            if entries.len() > self.retention {
                entries.pop_front();
            }
        }
        debug!(seq = entry.seq, event = %entry.event, "Audit entry recorded");

        self.flush().await?;
        Ok(entry)
    }

    /// Writes the in-memory trail to storage.
    pub async fn flush(&self) -> StorageResult<()> {
        let snapshot = self.entries();
        self.storage.set_as(ENTRIES_KEY, &snapshot).await
    }

    /// All retained entries, oldest first.
    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().iter().cloned().collect()
    }

    /// The `n` most recent entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<AuditEntry> {
        let entries = self.entries.lock();
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLog")
            .field("prefix", &self.storage.prefix())
            .field("retention", &self.retention)
            .field("len", &self.len())
            .finish()
    }
}
