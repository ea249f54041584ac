//! Workflow graph: nodes, directed edges, conditions, and eligibility.

use crate::error::{WorkflowError, WorkflowResult};
use crate::node::NodeRef;
use indexmap::IndexMap;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::sync::Arc;

/// Guard attached to an edge, evaluated when the destination's parents are
/// all completed.
#[derive(Clone)]
pub enum EdgeCondition {
    /// A user-supplied parameterless predicate
    Predicate(Arc<dyn Fn() -> bool + Send + Sync>),
    /// True iff the edge's source has at least one attempt and its last
    /// status is `COMPLETED`; resolved against the owning graph so it
    /// survives deep clones
    SourceCompleted,
}

impl Debug for EdgeCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EdgeCondition::Predicate(_) => f.write_str("Predicate"),
            EdgeCondition::SourceCompleted => f.write_str("SourceCompleted"),
        }
    }
}

/// Directed dependency between two nodes, optionally guarded.
#[derive(Debug)]
pub struct Edge {
    source: String,
    destination: String,
    condition: Option<EdgeCondition>,
    condition_passed: RwLock<Option<bool>>,
}

impl Edge {
    fn new(source: &str, destination: &str, condition: Option<EdgeCondition>) -> Self {
        Self {
            source: source.to_string(),
            destination: destination.to_string(),
            condition,
            condition_passed: RwLock::new(None),
        }
    }

    /// Source node name
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Destination node name
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Whether a condition guards this edge
    pub fn has_condition(&self) -> bool {
        self.condition.is_some()
    }

    /// Last evaluation result: `None` until evaluated, then the outcome
    pub fn condition_passed(&self) -> Option<bool> {
        *self.condition_passed.read()
    }

    fn clone_for_run(&self) -> Edge {
        Edge {
            source: self.source.clone(),
            destination: self.destination.clone(),
            condition: self.condition.clone(),
            condition_passed: RwLock::new(None),
        }
    }
}

/// Scheduler-facing answer for a node that has not been dispatched yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeEligibility {
    /// All parents completed, all guards passed
    Runnable,
    /// Some parent has not completed yet (or the node itself already did)
    Blocked,
    /// All parents completed but at least one guard evaluated false
    Skipped,
}

/// The DAG of a workflow.
///
/// Frozen after build: the scheduler only reads it. Nodes iterate in
/// insertion order, which the scheduler relies on for deterministic
/// dispatch.
#[derive(Debug, Default)]
pub struct WorkflowGraph {
    nodes: IndexMap<String, NodeRef>,
    edges: Vec<Edge>,
}

impl WorkflowGraph {
    /// Create an empty graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node; fails if the name is already present.
    pub fn add_node(&mut self, node: NodeRef) -> WorkflowResult<()> {
        if self.nodes.contains_key(node.name()) {
            return Err(WorkflowError::DuplicateNode {
                name: node.name().to_string(),
            });
        }
        self.nodes.insert(node.name().to_string(), node);
        Ok(())
    }

    /// Add an unconditional edge.
    pub fn add_edge(&mut self, source: &str, destination: &str) -> WorkflowResult<()> {
        self.insert_edge(source, destination, None)
    }

    /// Add an edge guarded by a user predicate.
    pub fn add_conditional_edge<F>(
        &mut self,
        source: &str,
        destination: &str,
        condition: F,
    ) -> WorkflowResult<()>
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.insert_edge(
            source,
            destination,
            Some(EdgeCondition::Predicate(Arc::new(condition))),
        )
    }

    /// Add an edge that only lets the destination run when the source has a
    /// completed last attempt.
    pub fn add_edge_if_source_completed(
        &mut self,
        source: &str,
        destination: &str,
    ) -> WorkflowResult<()> {
        self.insert_edge(source, destination, Some(EdgeCondition::SourceCompleted))
    }

    /// Validation order matters for error reporting: endpoints, self-loop,
    /// duplicates, then acyclicity. A rejected edge leaves the graph
    /// untouched.
    fn insert_edge(
        &mut self,
        source: &str,
        destination: &str,
        condition: Option<EdgeCondition>,
    ) -> WorkflowResult<()> {
        for endpoint in [source, destination] {
            if !self.nodes.contains_key(endpoint) {
                return Err(WorkflowError::UnknownNode {
                    name: endpoint.to_string(),
                });
            }
        }
        if source == destination {
            return Err(WorkflowError::SelfLoop {
                name: source.to_string(),
            });
        }
        if self
            .edges
            .iter()
            .any(|edge| edge.source == source && edge.destination == destination)
        {
            return Err(WorkflowError::DuplicateEdge {
                edge_source: source.to_string(),
                destination: destination.to_string(),
            });
        }
        self.assert_acyclic_with(source, destination)?;
        self.edges.push(Edge::new(source, destination, condition));
        Ok(())
    }

    /// Topological sort (Kahn) over the hypothetical edge set; commit only
    /// if every node drains.
    fn assert_acyclic_with(&self, new_source: &str, new_destination: &str) -> WorkflowResult<()> {
        let mut indegree: HashMap<&str, usize> =
            self.nodes.keys().map(|name| (name.as_str(), 0)).collect();
        let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

        let hypothetical = self
            .edges
            .iter()
            .map(|edge| (edge.source.as_str(), edge.destination.as_str()))
            .chain(std::iter::once((new_source, new_destination)));

        for (source, destination) in hypothetical {
            adjacency.entry(source).or_default().push(destination);
            if let Some(count) = indegree.get_mut(destination) {
                *count += 1;
            }
        }

        let mut queue: VecDeque<&str> = indegree
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(name, _)| *name)
            .collect();
        let mut drained = 0usize;

        while let Some(name) = queue.pop_front() {
            drained += 1;
            for child in adjacency.get(name).into_iter().flatten() {
                if let Some(count) = indegree.get_mut(child) {
                    *count -= 1;
                    if *count == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }

        if drained < self.nodes.len() {
            return Err(WorkflowError::Cycle {
                edge_source: new_source.to_string(),
                destination: new_destination.to_string(),
            });
        }
        Ok(())
    }

    /// Look up a node by name.
    pub fn node(&self, name: &str) -> Option<&NodeRef> {
        self.nodes.get(name)
    }

    /// Nodes in insertion order.
    pub fn nodes(&self) -> impl Iterator<Item = &NodeRef> {
        self.nodes.values()
    }

    /// Node names in insertion order.
    pub fn node_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|name| name.as_str())
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the graph holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All edges, in insertion order.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// The edge between two nodes, if present.
    pub fn edge(&self, source: &str, destination: &str) -> Option<&Edge> {
        self.edges
            .iter()
            .find(|edge| edge.source == source && edge.destination == destination)
    }

    /// Parents of a node, in edge-insertion order.
    pub fn parents(&self, name: &str) -> Vec<NodeRef> {
        self.edges
            .iter()
            .filter(|edge| edge.destination == name)
            .filter_map(|edge| self.nodes.get(&edge.source).cloned())
            .collect()
    }

    /// Children of a node, in edge-insertion order.
    pub fn children(&self, name: &str) -> Vec<NodeRef> {
        self.edges
            .iter()
            .filter(|edge| edge.source == name)
            .filter_map(|edge| self.nodes.get(&edge.destination).cloned())
            .collect()
    }

    /// Whether a node may be dispatched given the set of completed names.
    ///
    /// Conditions are evaluated live on every call; callers are expected to
    /// ask at most once per scheduling round per node.
    pub fn can_node_run(&self, name: &str, completed: &HashSet<String>) -> bool {
        self.eligibility(name, completed) == NodeEligibility::Runnable
    }

    /// Three-way eligibility used by the scheduler to distinguish "waiting on
    /// a parent" from "resolved as skipped".
    pub(crate) fn eligibility(&self, name: &str, completed: &HashSet<String>) -> NodeEligibility {
        if completed.contains(name) {
            return NodeEligibility::Blocked;
        }

        let parent_edges: Vec<&Edge> = self
            .edges
            .iter()
            .filter(|edge| edge.destination == name)
            .collect();

        for edge in &parent_edges {
            if !completed.contains(&edge.source) {
                return NodeEligibility::Blocked;
            }
        }

        let mut skipped = false;
        for edge in &parent_edges {
            if !self.evaluate_condition(edge) {
                skipped = true;
            }
        }
        if skipped {
            NodeEligibility::Skipped
        } else {
            NodeEligibility::Runnable
        }
    }

    /// Evaluate an edge's guard and record the observable outcome.
    fn evaluate_condition(&self, edge: &Edge) -> bool {
        let passed = match &edge.condition {
            None => true,
            Some(EdgeCondition::Predicate(predicate)) => predicate(),
            Some(EdgeCondition::SourceCompleted) => self
                .nodes
                .get(&edge.source)
                .map(|node| node.completed())
                .unwrap_or(false),
        };
        *edge.condition_passed.write() = Some(passed);
        passed
    }

    /// Clear per-run state: node attempt histories and edge evaluations.
    pub(crate) fn reset_run_state(&self) {
        for node in self.nodes.values() {
            node.reset_executions();
        }
        for edge in &self.edges {
            *edge.condition_passed.write() = None;
        }
    }

    /// Independent copy for a new run: fresh nodes with empty histories,
    /// edges with unevaluated guards.
    pub(crate) fn clone_for_run(&self) -> WorkflowGraph {
        WorkflowGraph {
            nodes: self
                .nodes
                .iter()
                .map(|(name, node)| (name.clone(), node.clone_for_run()))
                .collect(),
            edges: self.edges.iter().map(Edge::clone_for_run).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{node_fn, Node};

    fn test_node(name: &str) -> NodeRef {
        Node::new(name, node_fn(|_| Ok(()))).unwrap()
    }

    fn three_node_graph() -> WorkflowGraph {
        let mut graph = WorkflowGraph::new();
        graph.add_node(test_node("node-a")).unwrap();
        graph.add_node(test_node("node-b")).unwrap();
        graph.add_node(test_node("node-c")).unwrap();
        graph
    }

    #[test]
    fn test_duplicate_node_rejected() {
        let mut graph = three_node_graph();
        let error = graph.add_node(test_node("node-a")).unwrap_err();
        assert!(matches!(error, WorkflowError::DuplicateNode { .. }));
    }

    #[test]
    fn test_unknown_endpoint_rejected() {
        let mut graph = three_node_graph();
        let error = graph.add_edge("node-a", "ghost").unwrap_err();
        assert!(matches!(error, WorkflowError::UnknownNode { .. }));
    }

    #[test]
    fn test_self_loop_rejected() {
        let mut graph = three_node_graph();
        let error = graph.add_edge("node-a", "node-a").unwrap_err();
        assert!(matches!(error, WorkflowError::SelfLoop { .. }));
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let mut graph = three_node_graph();
        graph.add_edge("node-a", "node-b").unwrap();
        let error = graph.add_edge("node-a", "node-b").unwrap_err();
        assert!(matches!(error, WorkflowError::DuplicateEdge { .. }));
    }

    #[test]
    fn test_cycle_rejected_atomically() {
        let mut graph = three_node_graph();
        graph.add_edge("node-a", "node-b").unwrap();
        graph.add_edge("node-b", "node-c").unwrap();

        let error = graph.add_edge("node-c", "node-a").unwrap_err();
        assert!(matches!(error, WorkflowError::Cycle { .. }));
        assert_eq!(graph.edges().len(), 2);
    }

    #[test]
    fn test_parents_and_children_in_insertion_order() {
        let mut graph = three_node_graph();
        graph.add_edge("node-a", "node-c").unwrap();
        graph.add_edge("node-b", "node-c").unwrap();

        let parents: Vec<String> = graph
            .parents("node-c")
            .iter()
            .map(|node| node.name().to_string())
            .collect();
        assert_eq!(parents, vec!["node-a", "node-b"]);
        assert_eq!(graph.children("node-a").len(), 1);
    }

    #[tokio::test]
    async fn test_can_node_run_waits_for_parents() {
        let mut graph = three_node_graph();
        graph.add_edge("node-a", "node-b").unwrap();

        let mut completed = HashSet::new();
        assert!(graph.can_node_run("node-a", &completed));
        assert!(!graph.can_node_run("node-b", &completed));

        completed.insert("node-a".to_string());
        assert!(graph.can_node_run("node-b", &completed));
        assert!(!graph.can_node_run("node-a", &completed));
    }

    #[tokio::test]
    async fn test_condition_gates_destination() {
        let mut graph = three_node_graph();
        graph
            .add_conditional_edge("node-a", "node-b", || false)
            .unwrap();

        let mut completed = HashSet::new();
        completed.insert("node-a".to_string());
        assert_eq!(
            graph.eligibility("node-b", &completed),
            NodeEligibility::Skipped
        );
        assert_eq!(
            graph.edge("node-a", "node-b").unwrap().condition_passed(),
            Some(false)
        );
    }

    #[tokio::test]
    async fn test_source_completed_condition() {
        let mut graph = three_node_graph();
        graph
            .add_edge_if_source_completed("node-a", "node-b")
            .unwrap();

        let mut completed = HashSet::new();
        completed.insert("node-a".to_string());
        // node-a never ran, so the guard fails
        assert_eq!(
            graph.eligibility("node-b", &completed),
            NodeEligibility::Skipped
        );

        let node_a = graph.node("node-a").unwrap().clone();
        node_a.execute().await.unwrap();
        assert_eq!(
            graph.eligibility("node-b", &completed),
            NodeEligibility::Runnable
        );
    }

    #[tokio::test]
    async fn test_clone_for_run_is_independent() {
        let graph = {
            let mut graph = three_node_graph();
            graph
                .add_edge_if_source_completed("node-a", "node-b")
                .unwrap();
            graph
        };

        let clone = graph.clone_for_run();
        let cloned_a = clone.node("node-a").unwrap().clone();
        cloned_a.execute().await.unwrap();

        assert_eq!(graph.node("node-a").unwrap().attempt(), 0);
        assert_eq!(clone.node("node-a").unwrap().attempt(), 1);

        let mut completed = HashSet::new();
        completed.insert("node-a".to_string());
        // the clone's guard sees the clone's node, not the template's
        assert_eq!(
            clone.eligibility("node-b", &completed),
            NodeEligibility::Runnable
        );
        assert_eq!(
            graph.eligibility("node-b", &completed),
            NodeEligibility::Skipped
        );
    }
}
