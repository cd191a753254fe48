//! Dependency resolution for plugin bootstrap order.
//!
//! [`DependencyResolver::resolve`] is a pure function: a list of
//! [`DependencyNode`]s goes in, a safe initialization order (or a structural
//! [`DependencyError`]) comes out.
//!
//! # Ordering
//!
//! The order is computed with Kahn's algorithm. Among nodes whose
//! dependencies are all satisfied, the one registered **earliest** is emitted
//! first, so identical input always produces identical output and a graph
//! without edges comes back in registration order.
//!
//! ```rust,ignore
//! let order = DependencyResolver::resolve(&[
//!     DependencyNode::new("d", ["b", "c"]),
//!     DependencyNode::new("a", [] as [&str; 0]),
//!     DependencyNode::new("b", ["a"]),
//!     DependencyNode::new("c", ["a"]),
//! ])?;
//! assert_eq!(order, ["a", "b", "c", "d"]);
//! ```

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use tracing::trace;

use crate::error::{DependencyError, DependencyResult};
use crate::manifest::PluginManifest;

// ─── DependencyNode ───────────────────────────────────────────────────────────

/// One vertex of the dependency graph: an id and the ids it requires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    /// Unique plugin id.
    pub id: String,
    /// Ids that must be initialized before this one.
    pub dependencies: Vec<String>,
}

impl DependencyNode {
    /// Creates a node from an id and any iterable of dependency ids.
    pub fn new<I, S>(id: impl Into<String>, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: id.into(),
            dependencies: dependencies.into_iter().map(Into::into).collect(),
        }
    }
}

impl From<&PluginManifest> for DependencyNode {
    fn from(manifest: &PluginManifest) -> Self {
        Self {
            id: manifest.id.clone(),
            dependencies: manifest.dependency_ids(),
        }
    }
}

/// Strips version requirements from manifests, keeping only dependency ids.
///
/// Version compatibility is not evaluated; only presence is checked later by
/// [`DependencyResolver::resolve`].
pub fn build_graph(manifests: &[PluginManifest]) -> Vec<DependencyNode> {
    manifests.iter().map(DependencyNode::from).collect()
}

// ─── DependencyResolver ───────────────────────────────────────────────────────

/// Stateless topological sorter for plugin dependency graphs.
#[derive(Debug, Clone, Copy, Default)]
pub struct DependencyResolver;

impl DependencyResolver {
    /// Computes an order in which every dependency precedes its dependents.
    ///
    /// # Errors
    ///
    /// Checked in this order, first fault wins:
    ///
    /// 1. [`DependencyError::Duplicate`]: an id appears twice.
    /// 2. [`DependencyError::SelfDependency`] / [`DependencyError::Missing`]:
    ///    reported for the first offending node in input order.
    /// 3. [`DependencyError::Circular`]: the graph contains a cycle.
    pub fn resolve(nodes: &[DependencyNode]) -> DependencyResult<Vec<String>> {
        let n = nodes.len();

        let mut index: HashMap<&str, usize> = HashMap::with_capacity(n);
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.id.as_str(), i).is_some() {
                return Err(DependencyError::Duplicate {
                    plugin: node.id.clone(),
                });
            }
        }

        // Edge B -> A means "A depends on B": B must come first.
        let mut in_degree: Vec<usize> = vec![0; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut requires: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, node) in nodes.iter().enumerate() {
            let mut seen: HashSet<&str> = HashSet::new();
            for dep in &node.dependencies {
                if !seen.insert(dep.as_str()) {
                    continue;
                }
                if *dep == node.id {
                    return Err(DependencyError::SelfDependency {
                        plugin: node.id.clone(),
                    });
                }
                let Some(&provider) = index.get(dep.as_str()) else {
                    return Err(DependencyError::Missing {
                        plugin: node.id.clone(),
                        dependency: dep.clone(),
                    });
                };
                dependents[provider].push(i);
                requires[i].push(provider);
                in_degree[i] += 1;
            }
        }

        // Kahn's algorithm; the min-heap yields the earliest-registered ready node.
        let mut ready: BinaryHeap<Reverse<usize>> = (0..n)
            .filter(|&i| in_degree[i] == 0)
            .map(Reverse)
            .collect();
        let mut order: Vec<usize> = Vec::with_capacity(n);

        while let Some(Reverse(i)) = ready.pop() {
            order.push(i);
            for &j in &dependents[i] {
                in_degree[j] -= 1;
                if in_degree[j] == 0 {
                    ready.push(Reverse(j));
                }
            }
        }

        if order.len() != n {
            let cycle = find_cycle(nodes, &requires, &in_degree);
            return Err(DependencyError::Circular { cycle });
        }

        let resolved: Vec<String> = order.into_iter().map(|i| nodes[i].id.clone()).collect();
        trace!(order = ?resolved, "Dependency order resolved");
        Ok(resolved)
    }
}

/// Walks unprocessed "requires" edges from the earliest unprocessed node until
/// a node repeats, returning the ids on that cycle.
///
/// Every node left with a non-zero in-degree after Kahn's pass still has at
/// least one unprocessed dependency, so the walk always closes a loop.
fn find_cycle(nodes: &[DependencyNode], requires: &[Vec<usize>], in_degree: &[usize]) -> Vec<String> {
    let Some(start) = (0..nodes.len()).find(|&i| in_degree[i] > 0) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = vec![start];
    let mut position: HashMap<usize, usize> = HashMap::from([(start, 0)]);
    let mut current = start;

    while let Some(next) = requires[current]
        .iter()
        .copied()
        .find(|&j| in_degree[j] > 0)
    {
        if let Some(&at) = position.get(&next) {
            let mut cycle: Vec<String> = path[at..].iter().map(|&i| nodes[i].id.clone()).collect();
            cycle.push(nodes[next].id.clone());
            return cycle;
        }
        position.insert(next, path.len());
        path.push(next);
        current = next;
    }

    path.into_iter().map(|i| nodes[i].id.clone()).collect()
}
