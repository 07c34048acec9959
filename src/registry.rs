//! Target registry
//!
//! Owns the set of targets and hands them to the runner in dependency order.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::error::{BuildError, Result};
use crate::graph::{self, Graph};
use crate::target::{Target, TargetType};

/// Ordered collection of targets
pub struct Registry {
    /// Sorted so every target follows its dependencies
    targets: Vec<Arc<dyn Target>>,
    index: HashMap<String, usize>,
    graph: Graph,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("targets", &self.names())
            .finish()
    }
}

impl Registry {
    /// Build a registry from arbitrary targets
    pub fn new(targets: Vec<Arc<dyn Target>>) -> Result<Self> {
        let mut by_name: HashMap<String, Arc<dyn Target>> = HashMap::new();
        for target in targets {
            let name = target.name().to_string();
            if by_name.insert(name.clone(), target).is_some() {
                return Err(BuildError::InvalidTarget {
                    target: name,
                    reason: "declared more than once".to_string(),
                });
            }
        }

        let graph: Graph = by_name
            .iter()
            .map(|(name, t)| (name.clone(), t.depends_on().to_vec()))
            .collect();
        graph::validate(&graph)?;

        let order = graph::sort(&graph, None)?;
        let mut ordered = Vec::with_capacity(order.len());
        let mut index = HashMap::with_capacity(order.len());
        for name in order {
            if let Some(target) = by_name.remove(&name) {
                index.insert(name, ordered.len());
                ordered.push(target);
            }
        }

        Ok(Self {
            targets: ordered,
            index,
            graph,
        })
    }

    /// Build shell targets from configuration
    pub fn from_config(config: &Config, root: &Path) -> Result<Self> {
        let targets = config
            .build_targets(root)?
            .into_iter()
            .map(|t| Arc::new(t) as Arc<dyn Target>)
            .collect();
        Self::new(targets)
    }

    /// All targets in dependency order
    pub fn all(&self) -> &[Arc<dyn Target>] {
        &self.targets
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Target>> {
        self.index.get(name).map(|&i| &self.targets[i])
    }

    pub fn names(&self) -> Vec<&str> {
        self.targets.iter().map(|t| t.name()).collect()
    }

    /// Targets of one type, dependency order preserved
    pub fn of_type(&self, target_type: TargetType) -> Vec<Arc<dyn Target>> {
        self.targets
            .iter()
            .filter(|t| t.target_type() == target_type)
            .cloned()
            .collect()
    }

    /// The named targets plus everything they depend on, in dependency order
    pub fn resolve(&self, names: &[&str]) -> Result<Vec<Arc<dyn Target>>> {
        if let Some(missing) = names.iter().find(|n| !self.index.contains_key(**n)) {
            return Err(BuildError::TargetNotFound {
                name: missing.to_string(),
            });
        }

        let order = graph::sort(&self.graph, Some(names))?;
        Ok(order
            .iter()
            .filter_map(|name| self.get(name).cloned())
            .collect())
    }

    /// Name to declared dependencies
    pub fn dependency_graph(&self) -> &Graph {
        &self.graph
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::ShellTarget;

    fn registry() -> Registry {
        let targets: Vec<Arc<dyn Target>> = vec![
            Arc::new(ShellTarget::new("web", TargetType::Language, "web").with_depends_on(&["api"])),
            Arc::new(ShellTarget::new("api", TargetType::Language, "api").with_depends_on(&["proto"])),
            Arc::new(ShellTarget::new("proto", TargetType::Auxiliary, "proto")),
            Arc::new(ShellTarget::new("docs", TargetType::Auxiliary, "docs")),
        ];
        Registry::new(targets).unwrap()
    }

    #[test]
    fn test_targets_are_dependency_ordered() {
        let reg = registry();
        let names = reg.names();

        let pos = |n: &str| names.iter().position(|x| *x == n).unwrap();
        assert!(pos("proto") < pos("api"));
        assert!(pos("api") < pos("web"));
        assert_eq!(reg.len(), 4);
    }

    #[test]
    fn test_resolve_closure() {
        let reg = registry();
        let resolved: Vec<_> = reg
            .resolve(&["api"])
            .unwrap()
            .iter()
            .map(|t| t.name().to_string())
            .collect();

        assert_eq!(resolved, vec!["proto", "api"]);
        assert!(matches!(
            reg.resolve(&["nope"]),
            Err(BuildError::TargetNotFound { .. })
        ));
    }

    #[test]
    fn test_of_type() {
        let reg = registry();
        let aux: Vec<_> = reg
            .of_type(TargetType::Auxiliary)
            .iter()
            .map(|t| t.name().to_string())
            .collect();
        assert_eq!(aux, vec!["proto", "docs"]);
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let targets: Vec<Arc<dyn Target>> = vec![
            Arc::new(ShellTarget::new("api", TargetType::Language, "a")),
            Arc::new(ShellTarget::new("api", TargetType::Language, "b")),
        ];
        assert!(matches!(
            Registry::new(targets),
            Err(BuildError::InvalidTarget { .. })
        ));
    }
}
