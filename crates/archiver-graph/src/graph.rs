use crate::error::GraphError;
use indexmap::IndexMap;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{DfsPostOrder, VisitMap};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::hash::Hash;

/// Directed graph where an edge `u -> v` means "u depends on v"
///
/// The graph is acyclic at all times: [`DependencyGraph::add_edge`] searches for
/// a path back to the source before touching the graph, so a rejected edge
/// leaves no trace.
#[derive(Debug, Clone)]
pub struct DependencyGraph<N> {
    graph: DiGraph<N, ()>,
    index: IndexMap<N, NodeIndex>,
}

impl<N> DependencyGraph<N>
where
    N: Clone + Eq + Hash + Debug,
{
    /// Empty graph
    pub fn new() -> Self {
        Self {
            graph: DiGraph::new(),
            index: IndexMap::new(),
        }
    }

    /// Register a node; registering twice is a no-op
    pub fn add_node(&mut self, node: N) -> NodeIndex {
        if let Some(&existing) = self.index.get(&node) {
            return existing;
        }
        let idx = self.graph.add_node(node.clone());
        self.index.insert(node, idx);
        idx
    }

    /// Add dependency edge `from -> to`
    ///
    /// # Errors
    /// `GraphError::CyclicDependency` if `from` is reachable from `to` (including
    /// `from == to`). The cycle is reported as `[from, to, ..., from]`.
    pub fn add_edge(&mut self, from: N, to: N) -> Result<(), GraphError<N>> {
        if self.has_edge(&from, &to) {
            return Ok(());
        }

        if let Some(path) = self.path_between(&to, &from) {
            let mut cycle = Vec::with_capacity(path.len() + 1);
            cycle.push(from);
            cycle.extend(path);
            return Err(GraphError::CyclicDependency { cycle });
        }

        let from_idx = self.add_node(from);
        let to_idx = self.add_node(to);
        self.graph.add_edge(from_idx, to_idx, ());
        Ok(())
    }

    /// Depth-first search from `start` for `goal`, returning the path if found
    fn path_between(&self, start: &N, goal: &N) -> Option<Vec<N>> {
        if start == goal {
            return Some(vec![start.clone()]);
        }
        let start = *self.index.get(start)?;
        let goal = *self.index.get(goal)?;

        let mut parent: HashMap<NodeIndex, NodeIndex> = HashMap::new();
        let mut seen = HashSet::from([start]);
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if node == goal {
                let mut path = vec![node];
                let mut current = node;
                while let Some(&prev) = parent.get(&current) {
                    path.push(prev);
                    current = prev;
                }
                path.reverse();
                return Some(path.into_iter().map(|i| self.graph[i].clone()).collect());
            }
            for next in self.graph.neighbors(node) {
                if seen.insert(next) {
                    parent.insert(next, node);
                    stack.push(next);
                }
            }
        }
        None
    }

    /// Order nodes so that for every edge `u -> v`, `u` precedes `v`
    ///
    /// Depth-first post-order over all nodes in registration order, reversed.
    pub fn topological_sort(&self) -> Vec<N> {
        let mut dfs = DfsPostOrder::empty(&self.graph);
        let mut order = Vec::with_capacity(self.graph.node_count());

        for &start in self.index.values() {
            if dfs.discovered.is_visited(&start) {
                continue;
            }
            dfs.move_to(start);
            while let Some(node) = dfs.next(&self.graph) {
                order.push(self.graph[node].clone());
            }
        }

        order.reverse();
        order
    }

    /// Order nodes so that every node follows everything it depends on
    pub fn dependencies_first(&self) -> Vec<N> {
        let mut order = self.topological_sort();
        order.reverse();
        order
    }

    /// Direct dependencies of a node
    pub fn dependencies_of(&self, node: &N) -> Vec<N> {
        self.index
            .get(node)
            .map(|&idx| {
                self.graph
                    .neighbors(idx)
                    .map(|n| self.graph[n].clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Whether the exact edge `from -> to` exists
    pub fn has_edge(&self, from: &N, to: &N) -> bool {
        match (self.index.get(from), self.index.get(to)) {
            (Some(&a), Some(&b)) => self.graph.contains_edge(a, b),
            _ => false,
        }
    }

    /// Whether the node is registered
    pub fn contains(&self, node: &N) -> bool {
        self.index.contains_key(node)
    }

    /// Nodes in registration order
    pub fn nodes(&self) -> impl Iterator<Item = &N> {
        self.index.keys()
    }

    /// Number of registered nodes
    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// True when no node is registered
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Full cycle check, independent of the insertion-time check
    pub fn is_acyclic(&self) -> bool {
        !petgraph::algo::is_cyclic_directed(&self.graph)
    }
}

impl<N> Default for DependencyGraph<N>
where
    N: Clone + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}
