//! Edge types for workflow graphs.
//!
//! An edge connects a source node to a target node. The optional source
//! handle qualifies which reply or outcome of the source node the edge
//! belongs to: a button id, a list row id, a card id, or a named outcome
//! such as `success`, `error`, `booked` or `no_slots`.

use crate::node::NodeId;
use serde::{Deserialize, Deserializer, Serialize};

/// A directed edge in a workflow graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Editor-assigned edge id, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: NodeId,
    /// Qualifies which reply or outcome of the source the edge follows.
    #[serde(
        default,
        deserialize_with = "empty_as_none",
        skip_serializing_if = "Option::is_none"
    )]
    pub source_handle: Option<String>,
    pub target: NodeId,
}

impl Edge {
    /// Creates an unqualified edge.
    #[must_use]
    pub fn new(source: impl Into<NodeId>, target: impl Into<NodeId>) -> Self {
        Self {
            id: None,
            source: source.into(),
            source_handle: None,
            target: target.into(),
        }
    }

    /// Sets the source handle.
    #[must_use]
    pub fn with_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    /// Returns true if the edge's source handle equals `handle`.
    #[must_use]
    pub fn has_handle(&self, handle: &str) -> bool {
        self.source_handle.as_deref() == Some(handle)
    }

    /// Returns true if the edge carries no source handle.
    #[must_use]
    pub const fn is_unqualified(&self) -> bool {
        self.source_handle.is_none()
    }
}

// The editor writes `""` or `null` for edges drawn from the default handle.
fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<String>::deserialize(deserializer)?;
    Ok(value.filter(|handle| !handle.is_empty()))
}
