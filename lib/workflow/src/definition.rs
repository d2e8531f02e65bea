//! Workflow definition types.
//!
//! A workflow belongs to one account and consists of:
//! - Metadata (name, active flag, timestamps)
//! - The webhook token the messaging provider posts events with
//! - An optional entry node that starts the first-message-of-day chain
//! - A graph of nodes and edges

use crate::graph::WorkflowGraph;
use crate::node::{Node, NodeId};
use chatflow_core::{AccountId, WorkflowId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A complete workflow definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub account_id: AccountId,
    pub name: String,
    pub is_active: bool,
    /// Node that starts the chain for a customer's first message of the day.
    pub entry_node_id: Option<NodeId>,
    /// Secret path segment that authenticates inbound webhook calls.
    pub webhook_token: String,
    pub graph: WorkflowGraph,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    /// Creates a new, active workflow with an empty graph.
    #[must_use]
    pub fn new(
        account_id: AccountId,
        name: impl Into<String>,
        webhook_token: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::new(),
            account_id,
            name: name.into(),
            is_active: true,
            entry_node_id: None,
            webhook_token: webhook_token.into(),
            graph: WorkflowGraph::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Sets the graph.
    #[must_use]
    pub fn with_graph(mut self, graph: WorkflowGraph) -> Self {
        self.graph = graph;
        self
    }

    /// Sets the entry node.
    #[must_use]
    pub fn with_entry_node(mut self, node_id: impl Into<NodeId>) -> Self {
        self.entry_node_id = Some(node_id.into());
        self
    }

    /// Returns the entry node, if it is set and present in the graph.
    #[must_use]
    pub fn entry_node(&self) -> Option<&Node> {
        self.entry_node_id
            .as_ref()
            .and_then(|node_id| self.graph.node(node_id))
    }

    /// Activates the workflow.
    pub fn activate(&mut self) {
        self.is_active = true;
        self.touch();
    }

    /// Deactivates the workflow.
    pub fn deactivate(&mut self) {
        self.is_active = false;
        self.touch();
    }

    /// Marks the workflow as updated (bumps updated_at timestamp).
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TextMessageConfig;
    use crate::node::NodeKind;

    #[test]
    fn entry_node_requires_node_in_graph() {
        let workflow = Workflow::new(AccountId::new(), "Greeting", "tok").with_entry_node("start");
        assert!(workflow.entry_node().is_none());

        let graph = WorkflowGraph::new().with_node(Node::new(
            "start",
            NodeKind::Text(TextMessageConfig {
                text: "Hi".to_string(),
            }),
        ));
        let workflow = workflow.with_graph(graph);
        assert_eq!(
            workflow.entry_node().map(|node| node.id.as_str()),
            Some("start")
        );
    }

    #[test]
    fn deactivate_bumps_updated_at() {
        let mut workflow = Workflow::new(AccountId::new(), "Greeting", "tok");
        let before = workflow.updated_at;
        workflow.deactivate();
        assert!(!workflow.is_active);
        assert!(workflow.updated_at >= before);
    }
}
