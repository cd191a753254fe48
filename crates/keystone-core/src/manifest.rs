//! Declarative plugin manifest.
//!
//! Manifests are produced by external loaders (YAML / JSON metadata) and
//! describe a plugin without any code attached. The kernel consumes them
//! through [`build_graph`](crate::resolver::build_graph) and the
//! manifest-plugin adapter in `keystone-kernel`.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Static description of a plugin as written by a manifest author.
///
/// ```yaml
/// id: automation
/// version: 1.4.0
/// description: Workflow triggers
/// dependencies:
///   objects: "^2.0"
///   auth: "*"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Unique plugin id.
    pub id: String,

    /// Plugin version string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// One-line description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Dependency id → version requirement.
    ///
    /// Only presence is checked; the requirement string is carried for
    /// tooling but never evaluated by the core.
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,
}

impl PluginManifest {
    /// Creates a manifest with no dependencies.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Sets the version (builder pattern).
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Sets the description (builder pattern).
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Adds a dependency with a version requirement (builder pattern).
    pub fn depends_on(mut self, id: impl Into<String>, requirement: impl Into<String>) -> Self {
        self.dependencies.insert(id.into(), requirement.into());
        self
    }

    /// Dependency ids with the version requirements stripped.
    pub fn dependency_ids(&self) -> Vec<String> {
        self.dependencies.keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_from_json() {
        let manifest: PluginManifest = serde_json::from_value(serde_json::json!({
            "id": "automation",
            "version": "1.4.0",
            "dependencies": { "objects": "^2.0", "auth": "*" }
        }))
        .unwrap();

        assert_eq!(manifest.id, "automation");
        assert_eq!(manifest.version.as_deref(), Some("1.4.0"));
        assert_eq!(manifest.dependency_ids(), vec!["auth", "objects"]);
    }

    #[test]
    fn test_dependencies_default_to_empty() {
        let manifest: PluginManifest =
            serde_json::from_value(serde_json::json!({ "id": "ui" })).unwrap();
        assert!(manifest.dependencies.is_empty());
        assert!(manifest.description.is_none());
    }
}
