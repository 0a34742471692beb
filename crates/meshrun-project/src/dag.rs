//! Dependency graph (DAG) construction and traversal
//!
//! Builds forward and reverse dependency graphs for planning and impact
//! analysis. Node order is declaration order and every traversal respects
//! it, so results are deterministic.

use std::collections::{HashMap, HashSet, VecDeque};
use crate::manifest::Manifest;

/// Node identifier (model name, or unique_id for manifest graphs)
pub type NodeId = String;

/// Dependency graph with forward and reverse edges
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Nodes in declaration order
    nodes: Vec<NodeId>,

    /// Declaration index of each node
    position: HashMap<NodeId, usize>,

    /// Forward edges: node -> nodes it depends on (parents)
    parents: HashMap<NodeId, Vec<NodeId>>,

    /// Reverse edges: node -> nodes that depend on it (children)
    children: HashMap<NodeId, Vec<NodeId>>,
}

impl DependencyGraph {
    /// Build a graph from `(node, parents)` pairs in declaration order
    ///
    /// Parents that are not themselves declared nodes (sources, upstream
    /// models) are leaves and are dropped from the edge lists.
    pub fn new<I, P>(entries: I) -> Self
    where
        I: IntoIterator<Item = (NodeId, P)>,
        P: IntoIterator<Item = NodeId>,
    {
        let entries: Vec<(NodeId, Vec<NodeId>)> = entries
            .into_iter()
            .map(|(node, parents)| (node, parents.into_iter().collect()))
            .collect();

        let mut graph = Self::default();
        for (node, _) in &entries {
            if !graph.position.contains_key(node) {
                graph.position.insert(node.clone(), graph.nodes.len());
                graph.nodes.push(node.clone());
            }
        }

        for (node, parents) in entries {
            let mut known: Vec<NodeId> = parents
                .into_iter()
                .filter(|p| graph.position.contains_key(p))
                .collect();
            known.sort_by_key(|p| graph.position[p]);
            known.dedup();

            for parent in &known {
                graph
                    .children
                    .entry(parent.clone())
                    .or_default()
                    .push(node.clone());
            }
            graph.parents.entry(node).or_default().extend(known);
        }

        for children in graph.children.values_mut() {
            let position = &graph.position;
            children.sort_by_key(|c| position[c]);
            children.dedup();
        }

        graph
    }

    /// Build a graph over every node of a manifest, keyed by unique_id
    ///
    /// Uses `parent_map` when present and falls back to `depends_on`.
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut entries: Vec<(NodeId, Vec<NodeId>)> = Vec::new();

        for id in manifest.sources.keys() {
            entries.push((id.clone(), Vec::new()));
        }

        if !manifest.parent_map.is_empty() {
            for (id, parents) in &manifest.parent_map {
                if !manifest.sources.contains_key(id) {
                    entries.push((id.clone(), parents.clone()));
                }
            }
        } else {
            for (id, node) in &manifest.nodes {
                entries.push((id.clone(), node.depends_on.nodes.clone()));
            }
        }

        // Parents outside the manifest (upstream projects) become leaves
        let declared: HashSet<NodeId> = entries.iter().map(|(id, _)| id.clone()).collect();
        let mut external: Vec<NodeId> = entries
            .iter()
            .flat_map(|(_, parents)| parents.iter())
            .filter(|p| !declared.contains(*p))
            .cloned()
            .collect();
        external.sort();
        external.dedup();

        let leaves = external.into_iter().map(|id| (id, Vec::new()));
        Self::new(leaves.chain(entries))
    }

    /// Get all nodes in declaration order
    pub fn all_nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn contains(&self, node_id: &str) -> bool {
        self.position.contains_key(node_id)
    }

    /// Get immediate parents (dependencies) of a node
    pub fn parents(&self, node_id: &str) -> &[NodeId] {
        self.parents.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Get immediate children (dependents) of a node
    pub fn children(&self, node_id: &str) -> &[NodeId] {
        self.children.get(node_id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Get all downstream nodes (transitive closure of children)
    ///
    /// This is the "blast radius" - every node affected if this node fails
    /// or changes. Breadth-first, so nearer dependents come first.
    pub fn downstream(&self, node_id: &str) -> Vec<NodeId> {
        Self::closure(node_id, &self.children)
    }

    /// Get all upstream nodes (transitive closure of parents)
    pub fn upstream(&self, node_id: &str) -> Vec<NodeId> {
        Self::closure(node_id, &self.parents)
    }

    fn closure(node_id: &str, edges: &HashMap<NodeId, Vec<NodeId>>) -> Vec<NodeId> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        let mut result = Vec::new();

        if let Some(next) = edges.get(node_id) {
            queue.extend(next.iter().cloned());
        }

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current.clone()) {
                continue;
            }

            if let Some(next) = edges.get(&current) {
                queue.extend(next.iter().filter(|n| !visited.contains(*n)).cloned());
            }
            result.push(current);
        }

        result
    }

    /// Check if there's a path from source to target
    pub fn has_path(&self, source: &str, target: &str) -> bool {
        self.downstream(source).iter().any(|n| n == target)
    }

    /// Depth-first topological sort
    ///
    /// Every node appears after all of its parents. Roots and parent lists
    /// are visited in declaration order, so independent nodes keep their
    /// declaration order relative to each other.
    pub fn topological_sort(&self) -> Result<Vec<NodeId>, CyclicDependencyError> {
        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut stack: Vec<&str> = Vec::new();
        let mut order = Vec::with_capacity(self.nodes.len());

        for node in &self.nodes {
            self.visit(node, &mut marks, &mut stack, &mut order)?;
        }

        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        node: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
        order: &mut Vec<NodeId>,
    ) -> Result<(), CyclicDependencyError> {
        match marks.get(node) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = stack.iter().position(|n| *n == node).unwrap_or(0);
                return Err(CyclicDependencyError {
                    members: stack[start..].iter().map(|n| n.to_string()).collect(),
                });
            }
            None => {}
        }

        marks.insert(node, Mark::Visiting);
        stack.push(node);

        for parent in self.parents(node) {
            self.visit(parent, marks, stack, order)?;
        }

        stack.pop();
        marks.insert(node, Mark::Done);
        order.push(node.to_string());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// The graph contains a cycle
///
/// `members` lists the cycle in dependency order: each member depends on
/// the next, and the last depends on the first.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("cyclic dependency: {}", display_cycle(.members))]
pub struct CyclicDependencyError {
    pub members: Vec<NodeId>,
}

fn display_cycle(members: &[NodeId]) -> String {
    let mut parts: Vec<&str> = members.iter().map(String::as_str).collect();
    if let Some(first) = members.first() {
        parts.push(first);
    }
    parts.join(" -> ")
}
