//! Dependency graph ordering and validation
//!
//! [`sort`] performs a depth-first post-order walk that keeps the declared
//! order of each node's dependencies. [`DependencyGraph`] wraps a petgraph
//! DAG for rendering and reverse-dependency queries.

use std::collections::{HashMap, HashSet};

use petgraph::dot::{Config as DotConfig, Dot};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;

use crate::error::{BuildError, Result};

/// Node name to the ordered list of names it depends on
pub type Graph = HashMap<String, Vec<String>>;

/// Order nodes so every dependency precedes its dependents.
///
/// - `None` sorts every node, visiting roots in lexicographic order.
/// - `Some(&[])` returns an empty order.
/// - `Some(names)` sorts only the transitive dependency closure of `names`.
///
/// Any error is terminal; no partial order is returned.
pub fn sort(graph: &Graph, nodes: Option<&[&str]>) -> Result<Vec<String>> {
    let roots: Vec<&str> = match nodes {
        Some([]) => return Ok(Vec::new()),
        Some(names) => names.to_vec(),
        None => {
            let mut keys: Vec<&str> = graph.keys().map(String::as_str).collect();
            keys.sort_unstable();
            keys
        }
    };

    let mut walk = Walk {
        graph,
        finished: HashSet::new(),
        on_stack: HashSet::new(),
        order: Vec::with_capacity(graph.len()),
    };

    for root in roots {
        walk.visit(root, None)?;
    }

    Ok(walk.order)
}

struct Walk<'g> {
    graph: &'g Graph,
    finished: HashSet<&'g str>,
    on_stack: HashSet<&'g str>,
    order: Vec<String>,
}

impl<'g> Walk<'g> {
    fn visit(&mut self, name: &str, required_by: Option<&str>) -> Result<()> {
        let graph = self.graph;
        let Some((key, deps)) = graph.get_key_value(name) else {
            return Err(BuildError::NodeNotFound {
                node: name.to_string(),
                required_by: required_by.map(str::to_string),
            });
        };
        let key = key.as_str();

        if self.on_stack.contains(key) {
            return Err(BuildError::CircularDependency {
                node: key.to_string(),
            });
        }
        if self.finished.contains(key) {
            return Ok(());
        }

        self.on_stack.insert(key);
        for dep in deps {
            self.visit(dep, Some(key))?;
        }
        self.on_stack.remove(key);
        self.finished.insert(key);
        self.order.push(key.to_string());

        Ok(())
    }
}

/// Check self loops, dangling references and cycles, returning the first
/// violation found.
pub fn validate(graph: &Graph) -> Result<()> {
    let mut names: Vec<&String> = graph.keys().collect();
    names.sort_unstable();

    for name in names {
        for dep in &graph[name] {
            if dep == name {
                return Err(BuildError::SelfDependency { node: name.clone() });
            }
            if !graph.contains_key(dep) {
                return Err(BuildError::NodeNotFound {
                    node: dep.clone(),
                    required_by: Some(name.clone()),
                });
            }
        }
    }

    sort(graph, None).map(|_| ())
}

/// A validated dependency DAG
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    name_to_index: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Build from a name map; fails on the same conditions as [`validate`]
    pub fn new(map: &Graph) -> Result<Self> {
        validate(map)?;
        let order = sort(map, None)?;

        let mut graph = DiGraph::new();
        let mut name_to_index = HashMap::new();

        for name in &order {
            let idx = graph.add_node(name.clone());
            name_to_index.insert(name.clone(), idx);
        }

        // Edge goes from dependency TO dependent (dep must run first)
        for name in &order {
            for dep in &map[name] {
                graph.add_edge(name_to_index[dep], name_to_index[name], ());
            }
        }

        Ok(Self {
            graph,
            name_to_index,
        })
    }

    /// Direct dependencies of a node
    pub fn dependencies(&self, name: &str) -> Option<Vec<&str>> {
        self.neighbors(name, Direction::Incoming)
    }

    /// Nodes that depend directly on the given one
    pub fn dependents(&self, name: &str) -> Option<Vec<&str>> {
        self.neighbors(name, Direction::Outgoing)
    }

    fn neighbors(&self, name: &str, dir: Direction) -> Option<Vec<&str>> {
        self.name_to_index.get(name).map(|&idx| {
            let mut names: Vec<&str> = self
                .graph
                .neighbors_directed(idx, dir)
                .map(|n| self.graph[n].as_str())
                .collect();
            names.sort_unstable();
            names
        })
    }

    /// Render as Graphviz DOT
    pub fn to_dot(&self) -> String {
        // Dot needs displayable edge weights even when labels are off
        let labelled = self.graph.map(|_, name| name.as_str(), |_, _| "");
        format!(
            "{}",
            Dot::with_config(&labelled, &[DotConfig::EdgeNoLabel])
        )
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn graph(edges: &[(&str, &[&str])]) -> Graph {
        edges
            .iter()
            .map(|(n, deps)| (n.to_string(), deps.iter().map(|d| d.to_string()).collect()))
            .collect()
    }

    fn diamond() -> Graph {
        graph(&[("a", &[]), ("b", &["a"]), ("c", &["a"]), ("d", &["b", "c"])])
    }

    fn pos(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn test_diamond_order() {
        let order = sort(&diamond(), None).unwrap();

        assert_eq!(order.len(), 4);
        assert!(pos(&order, "a") < pos(&order, "b"));
        assert!(pos(&order, "a") < pos(&order, "c"));
        assert!(pos(&order, "b") < pos(&order, "d"));
        assert!(pos(&order, "c") < pos(&order, "d"));
    }

    #[test]
    fn test_sort_is_deterministic() {
        let g = graph(&[("zeta", &[]), ("alpha", &[]), ("mid", &[])]);
        assert_eq!(sort(&g, None).unwrap(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_siblings_keep_declared_order() {
        let g = graph(&[("app", &["zlib", "core"]), ("zlib", &[]), ("core", &[])]);
        let order = sort(&g, Some(&["app"])).unwrap();
        assert_eq!(order, vec!["zlib", "core", "app"]);
    }

    #[test]
    fn test_empty_request() {
        assert!(sort(&diamond(), Some(&[])).unwrap().is_empty());
        // Even a broken graph is never walked for an empty request.
        let broken = graph(&[("a", &["missing"])]);
        assert!(sort(&broken, Some(&[])).unwrap().is_empty());
    }

    #[test]
    fn test_subset_closure() {
        let mut g = diamond();
        g.insert("unrelated".to_string(), vec![]);

        let order = sort(&g, Some(&["b"])).unwrap();
        assert_eq!(order, vec!["a", "b"]);
    }

    #[test]
    fn test_cycle_detection() {
        let g = graph(&[("a", &["b"]), ("b", &["a"])]);
        let err = sort(&g, None).unwrap_err();

        assert!(matches!(err, BuildError::CircularDependency { .. }));
        assert!(err.to_string().contains("circular"));
    }

    #[test]
    fn test_self_loop() {
        let g = graph(&[("a", &["a"])]);
        assert!(sort(&g, None).unwrap_err().to_string().contains("circular"));

        let err = validate(&g).unwrap_err();
        assert!(matches!(err, BuildError::SelfDependency { ref node } if node == "a"));
        assert!(err.to_string().contains("circular"));
    }

    #[test]
    fn test_missing_dependency() {
        let g = graph(&[("a", &["ghost"])]);
        let err = sort(&g, None).unwrap_err();
        assert!(
            matches!(err, BuildError::NodeNotFound { ref node, ref required_by } if node == "ghost" && required_by.as_deref() == Some("a"))
        );
        assert!(validate(&g).unwrap_err().is_graph_error());
    }

    #[test]
    fn test_unknown_requested_node() {
        let err = sort(&diamond(), Some(&["nope"])).unwrap_err();
        assert!(matches!(err, BuildError::NodeNotFound { .. }));
    }

    #[test]
    fn test_validate_reports_cycle() {
        let g = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &["a"])]);
        assert!(matches!(
            validate(&g),
            Err(BuildError::CircularDependency { .. })
        ));
        assert!(validate(&diamond()).is_ok());
    }

    #[test]
    fn test_dependency_graph_queries() {
        let dg = DependencyGraph::new(&diamond()).unwrap();

        assert_eq!(dg.len(), 4);
        assert_eq!(dg.dependencies("d").unwrap(), vec!["b", "c"]);
        assert_eq!(dg.dependents("a").unwrap(), vec!["b", "c"]);
        assert!(dg.dependents("missing").is_none());

        let dot = dg.to_dot();
        assert!(dot.starts_with("digraph"));
        assert!(dot.contains("\"a\""));
        assert!(dot.contains("->"));
        assert!(!dot.contains("label = \"\""));
    }

    /// Random DAGs: node i may only depend on nodes with a lower index.
    fn arb_dag() -> impl Strategy<Value = Graph> {
        (1usize..12).prop_flat_map(|n| {
            proptest::collection::vec(proptest::collection::vec(any::<bool>(), n), n).prop_map(
                move |matrix| {
                    (0..n)
                        .map(|i| {
                            let deps = (0..i)
                                .filter(|&j| matrix[i][j])
                                .map(|j| format!("n{j}"))
                                .collect();
                            (format!("n{i}"), deps)
                        })
                        .collect()
                },
            )
        })
    }

    proptest! {
        #[test]
        fn prop_sort_respects_every_edge(g in arb_dag()) {
            let order = sort(&g, None).unwrap();

            prop_assert_eq!(order.len(), g.len());
            let unique: HashSet<_> = order.iter().collect();
            prop_assert_eq!(unique.len(), g.len());

            for (node, deps) in &g {
                for dep in deps {
                    prop_assert!(pos(&order, dep) < pos(&order, node));
                }
            }
        }

        #[test]
        fn prop_subset_is_exact_closure(g in arb_dag()) {
            let start = "n0".to_string();
            let last = format!("n{}", g.len() - 1);
            let order = sort(&g, Some(&[last.as_str()])).unwrap();

            let mut closure = HashSet::new();
            let mut stack = vec![last.clone()];
            while let Some(n) = stack.pop() {
                if closure.insert(n.clone()) {
                    stack.extend(g[&n].iter().cloned());
                }
            }

            prop_assert_eq!(order.len(), closure.len());
            prop_assert!(order.iter().all(|n| closure.contains(n)));
            prop_assert_eq!(order.contains(&start), closure.contains(&start));
        }
    }
}
