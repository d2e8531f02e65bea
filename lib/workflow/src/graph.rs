//! Workflow graph storage and lookup.
//!
//! The graph keeps nodes and edges in authored order. Edge order matters:
//! whenever several edges qualify, the earliest one in the stored document
//! wins. Lookups go through a node index built when the graph is loaded.
//!
//! Graphs are never rejected at load time. [`WorkflowGraph::validate`]
//! reports problems for editors and logs, while execution tolerates them
//! (a dangling edge simply ends the chain).

use crate::edge::Edge;
use crate::node::{Node, NodeCategory, NodeId};
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

/// A workflow graph: nodes plus ordered, optionally handle-qualified edges.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "GraphDocument", into = "GraphDocument")]
pub struct WorkflowGraph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    /// Map from node id to position in `nodes`.
    index: HashMap<NodeId, usize>,
}

impl WorkflowGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a graph from nodes and edges in authored order.
    ///
    /// When two nodes share an id the first one is kept for lookups.
    #[must_use]
    pub fn from_parts(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let mut index = HashMap::with_capacity(nodes.len());
        for (position, node) in nodes.iter().enumerate() {
            index.entry(node.id.clone()).or_insert(position);
        }
        Self {
            nodes,
            edges,
            index,
        }
    }

    /// Adds a node to the graph.
    pub fn add_node(&mut self, node: Node) {
        self.index
            .entry(node.id.clone())
            .or_insert(self.nodes.len());
        self.nodes.push(node);
    }

    /// Appends an edge. Endpoints are not checked.
    pub fn add_edge(&mut self, edge: Edge) {
        self.edges.push(edge);
    }

    /// Builder form of [`add_node`](Self::add_node).
    #[must_use]
    pub fn with_node(mut self, node: Node) -> Self {
        self.add_node(node);
        self
    }

    /// Builder form of [`add_edge`](Self::add_edge).
    #[must_use]
    pub fn with_edge(mut self, edge: Edge) -> Self {
        self.add_edge(edge);
        self
    }

    /// Gets a node by id.
    #[must_use]
    pub fn node(&self, node_id: &NodeId) -> Option<&Node> {
        self.index.get(node_id).map(|&position| &self.nodes[position])
    }

    /// Returns true if the graph contains the node.
    #[must_use]
    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.index.contains_key(node_id)
    }

    /// Returns all nodes in authored order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    /// Returns all edges in authored order.
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    /// Returns the number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Returns the number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Returns the outgoing edges of a node in authored order.
    pub fn outgoing<'a>(
        &'a self,
        node_id: &NodeId,
    ) -> impl Iterator<Item = &'a Edge> + use<'a> {
        let node_id = node_id.clone();
        self.edges.iter().filter(move |edge| edge.source == node_id)
    }

    /// Returns the first outgoing edge of a node.
    #[must_use]
    pub fn first_outgoing(&self, node_id: &NodeId) -> Option<&Edge> {
        self.outgoing(node_id).next()
    }

    /// Returns the first outgoing edge of a node carrying `handle`.
    #[must_use]
    pub fn outgoing_with_handle(&self, node_id: &NodeId, handle: &str) -> Option<&Edge> {
        self.outgoing(node_id).find(|edge| edge.has_handle(handle))
    }

    /// Returns the first edge anywhere in the graph carrying `handle`.
    #[must_use]
    pub fn edge_with_handle(&self, handle: &str) -> Option<&Edge> {
        self.edges.iter().find(|edge| edge.has_handle(handle))
    }

    /// Checks the graph for authoring problems.
    ///
    /// Checks:
    /// - Two edges leave one node with the same handle
    /// - Edges whose source or target does not exist
    /// - Nodes that could not be loaded
    /// - Cycles made only of nodes that continue the chain without waiting
    ///   for the customer; those loop until the executor aborts the chain
    #[must_use]
    pub fn validate(&self) -> Vec<GraphIssue> {
        let mut issues = Vec::new();

        for node in &self.nodes {
            if node.kind.category() == NodeCategory::Unsupported {
                issues.push(GraphIssue::UnsupportedNode {
                    node_id: node.id.clone(),
                    kind: node.kind.type_tag().to_string(),
                });
            }
        }

        let mut seen_handles = HashSet::new();
        for edge in &self.edges {
            if !self.contains(&edge.source) {
                issues.push(GraphIssue::UnknownSource {
                    source: edge.source.clone(),
                });
            }
            if !self.contains(&edge.target) {
                issues.push(GraphIssue::DanglingEdge {
                    source: edge.source.clone(),
                    target: edge.target.clone(),
                });
            }
            if let Some(handle) = &edge.source_handle {
                if !seen_handles.insert((&edge.source, handle.as_str())) {
                    issues.push(GraphIssue::DuplicateHandle {
                        source: edge.source.clone(),
                        handle: handle.clone(),
                    });
                }
            }
        }

        issues.extend(self.chain_cycles());
        issues
    }

    fn chain_cycles(&self) -> Vec<GraphIssue> {
        let continues = |node: &Node| {
            matches!(
                node.kind.category(),
                NodeCategory::Message | NodeCategory::Action
            )
        };

        let mut graph: DiGraph<&NodeId, ()> = DiGraph::new();
        let mut indices: HashMap<&NodeId, NodeIndex> = HashMap::new();
        for node in self.nodes.iter().filter(|node| continues(node)) {
            indices
                .entry(&node.id)
                .or_insert_with(|| graph.add_node(&node.id));
        }
        for edge in &self.edges {
            if let (Some(&from), Some(&to)) = (indices.get(&edge.source), indices.get(&edge.target))
            {
                graph.add_edge(from, to, ());
            }
        }

        tarjan_scc(&graph)
            .into_iter()
            .filter(|component| {
                component.len() > 1
                    || component
                        .first()
                        .is_some_and(|&index| graph.contains_edge(index, index))
            })
            .map(|component| {
                let mut nodes: Vec<NodeId> =
                    component.iter().map(|&index| NodeId::clone(graph[index])).collect();
                nodes.sort();
                GraphIssue::ChainCycle { nodes }
            })
            .collect()
    }
}

/// An authoring problem found by [`WorkflowGraph::validate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphIssue {
    /// Two edges leave the same node with the same handle; only the first
    /// one is ever followed.
    DuplicateHandle { source: NodeId, handle: String },
    /// An edge points at a node that does not exist.
    DanglingEdge { source: NodeId, target: NodeId },
    /// An edge leaves a node that does not exist.
    UnknownSource { source: NodeId },
    /// A node whose type or configuration could not be loaded.
    UnsupportedNode { node_id: NodeId, kind: String },
    /// A loop that never waits for the customer.
    ChainCycle { nodes: Vec<NodeId> },
}

impl fmt::Display for GraphIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateHandle { source, handle } => {
                write!(f, "node {source} has more than one edge for handle '{handle}'")
            }
            Self::DanglingEdge { source, target } => {
                write!(f, "edge from {source} points at missing node {target}")
            }
            Self::UnknownSource { source } => {
                write!(f, "edge leaves missing node {source}")
            }
            Self::UnsupportedNode { node_id, kind } => {
                write!(f, "node {node_id} has unsupported type '{kind}'")
            }
            Self::ChainCycle { nodes } => {
                let names: Vec<&str> = nodes.iter().map(NodeId::as_str).collect();
                write!(f, "nodes form a loop without a reply: {}", names.join(", "))
            }
        }
    }
}

/// The stored shape of a graph.
#[derive(Serialize, Deserialize)]
struct GraphDocument {
    #[serde(default)]
    nodes: Vec<Node>,
    #[serde(default)]
    edges: Vec<Edge>,
}

impl From<GraphDocument> for WorkflowGraph {
    fn from(document: GraphDocument) -> Self {
        Self::from_parts(document.nodes, document.edges)
    }
}

impl From<WorkflowGraph> for GraphDocument {
    fn from(graph: WorkflowGraph) -> Self {
        Self {
            nodes: graph.nodes,
            edges: graph.edges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpActionConfig, QuickReplyConfig, TextMessageConfig};
    use crate::node::NodeKind;
    use serde_json::json;

    fn text(id: &str) -> Node {
        Node::new(
            id,
            NodeKind::Text(TextMessageConfig {
                text: format!("text {id}"),
            }),
        )
    }

    #[test]
    fn outgoing_preserves_authored_order() {
        let graph = WorkflowGraph::new()
            .with_node(text("a"))
            .with_node(text("b"))
            .with_node(text("c"))
            .with_edge(Edge::new("a", "c"))
            .with_edge(Edge::new("a", "b"));

        let a = NodeId::from("a");
        let targets: Vec<&str> = graph.outgoing(&a).map(|e| e.target.as_str()).collect();
        assert_eq!(targets, vec!["c", "b"]);
        assert_eq!(graph.first_outgoing(&a).map(|e| e.target.as_str()), Some("c"));
    }

    // Looked-up edges borrow the graph, not the id used to find them.
    fn edge_targets<'g>(graph: &'g WorkflowGraph, source: &str) -> Vec<&'g str> {
        let id = NodeId::from(source);
        graph.outgoing(&id).map(|e| e.target.as_str()).collect()
    }

    #[test]
    fn outgoing_edges_outlive_the_lookup_id() {
        let graph = WorkflowGraph::new()
            .with_node(text("a"))
            .with_node(text("b"))
            .with_edge(Edge::new("a", "b").with_handle("yes"));

        let first = graph.first_outgoing(&NodeId::from("a"));
        let handled = graph.outgoing_with_handle(&NodeId::from("a"), "yes");
        assert_eq!(first.map(|e| e.target.as_str()), Some("b"));
        assert_eq!(handled.map(|e| e.target.as_str()), Some("b"));
        assert_eq!(edge_targets(&graph, "a"), vec!["b"]);
        assert!(edge_targets(&graph, "b").is_empty());
    }

    #[test]
    fn graph_from_document() {
        let graph: WorkflowGraph = serde_json::from_value(json!({
            "nodes": [
                {"id": "start", "type": "textMessage", "data": {"text": "Hi"}},
                {"id": "next", "type": "textMessage", "data": {"text": "Bye"}}
            ],
            "edges": [
                {"id": "e1", "source": "start", "target": "next"}
            ]
        }))
        .expect("deserialize");

        assert_eq!(graph.node_count(), 2);
        assert!(graph.node(&NodeId::from("next")).is_some());
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn empty_document_loads() {
        let graph: WorkflowGraph = serde_json::from_value(json!({})).expect("deserialize");
        assert_eq!(graph.node_count(), 0);
        assert!(graph.validate().is_empty());
    }

    #[test]
    fn validate_reports_dangling_and_duplicate_edges() {
        let graph = WorkflowGraph::new()
            .with_node(text("a"))
            .with_node(text("b"))
            .with_edge(Edge::new("a", "b").with_handle("x"))
            .with_edge(Edge::new("a", "b").with_handle("x"))
            .with_edge(Edge::new("a", "ghost"));

        let issues = graph.validate();
        assert!(issues.contains(&GraphIssue::DuplicateHandle {
            source: NodeId::from("a"),
            handle: "x".to_string(),
        }));
        assert!(issues.contains(&GraphIssue::DanglingEdge {
            source: NodeId::from("a"),
            target: NodeId::from("ghost"),
        }));
    }

    #[test]
    fn validate_reports_loops_without_replies() {
        let graph = WorkflowGraph::new()
            .with_node(text("a"))
            .with_node(Node::new(
                "call",
                NodeKind::HttpAction(HttpActionConfig::default()),
            ))
            .with_edge(Edge::new("a", "call"))
            .with_edge(Edge::new("call", "a").with_handle("success"));

        let issues = graph.validate();
        assert_eq!(
            issues,
            vec![GraphIssue::ChainCycle {
                nodes: vec![NodeId::from("a"), NodeId::from("call")],
            }]
        );
    }

    #[test]
    fn loops_through_interactive_nodes_are_fine() {
        let graph = WorkflowGraph::new()
            .with_node(text("a"))
            .with_node(Node::new(
                "menu",
                NodeKind::QuickReply(QuickReplyConfig::default()),
            ))
            .with_edge(Edge::new("a", "menu"))
            .with_edge(Edge::new("menu", "a"));

        assert!(graph.validate().is_empty());
    }

    #[test]
    fn self_loop_is_reported() {
        let graph = WorkflowGraph::new()
            .with_node(text("a"))
            .with_edge(Edge::new("a", "a"));

        assert_eq!(graph.validate().len(), 1);
    }
}
