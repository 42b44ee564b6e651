//! Module dependency graph, validated once per run.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use rv_config::ModuleConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DagError {
    UnknownDependency { module: String, dependency: String },
    /// Modules that could not be ordered (members of, or downstream of, a cycle).
    Cycle { modules: Vec<String> },
}

impl fmt::Display for DagError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DagError::UnknownDependency { module, dependency } => {
                write!(f, "module {module} depends on unknown module {dependency}")
            }
            DagError::Cycle { modules } => {
                write!(f, "dependency cycle among modules: {}", modules.join(", "))
            }
        }
    }
}

impl std::error::Error for DagError {}

/// Topological layers. Every module in layer N depends only on modules in
/// layers < N, so a layer can be fetched concurrently. Ids within a layer are
/// sorted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleDag {
    layers: Vec<Vec<String>>,
}

impl ModuleDag {
    pub fn build(modules: &[ModuleConfig]) -> Result<Self, DagError> {
        let ids: BTreeSet<&str> = modules.iter().map(|m| m.id.as_str()).collect();

        let mut indegree: BTreeMap<&str, usize> = ids.iter().map(|id| (*id, 0)).collect();
        let mut dependents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();

        for m in modules {
            let deps: BTreeSet<&str> = m.depends_on.iter().map(String::as_str).collect();
            for dep in deps {
                if !ids.contains(dep) {
                    return Err(DagError::UnknownDependency {
                        module: m.id.clone(),
                        dependency: dep.to_string(),
                    });
                }
                *indegree.entry(m.id.as_str()).or_default() += 1;
                dependents.entry(dep).or_default().push(m.id.as_str());
            }
        }

        let mut layers: Vec<Vec<String>> = Vec::new();
        let mut ready: BTreeSet<&str> = indegree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut placed = 0usize;

        while !ready.is_empty() {
            let mut next: BTreeSet<&str> = BTreeSet::new();
            for id in &ready {
                for dependent in dependents.get(id).into_iter().flatten() {
                    if let Some(d) = indegree.get_mut(dependent) {
                        *d -= 1;
                        if *d == 0 {
                            next.insert(*dependent);
                        }
                    }
                }
            }
            placed += ready.len();
            layers.push(ready.iter().map(|s| s.to_string()).collect());
            ready = next;
        }

        if placed < ids.len() {
            let stuck = indegree
                .into_iter()
                .filter(|(_, d)| *d > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            return Err(DagError::Cycle { modules: stuck });
        }

        Ok(Self { layers })
    }

    pub fn layers(&self) -> &[Vec<String>] {
        &self.layers
    }

    /// Flattened dependency order.
    pub fn order(&self) -> impl Iterator<Item = &str> {
        self.layers.iter().flatten().map(String::as_str)
    }
}
