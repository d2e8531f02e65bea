//! Error types for the engine crate.
//!
//! - `ExecutionError`: why one chain stopped early; recorded on the
//!   execution log, never surfaced to the webhook caller
//! - `WebhookError`: the failures that do reach the webhook caller

use chatflow_core::AccountId;
use chatflow_workflow::NodeId;
use std::fmt;

/// Errors that stop a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The account has no active, authorized channel to send through.
    NoChannel { account_id: AccountId },
    /// The messaging provider rejected or failed a send.
    SendFailed { node_id: NodeId, details: String },
    /// The node could not be loaded from the stored graph.
    UnsupportedNode {
        node_id: NodeId,
        kind: String,
        reason: String,
    },
    /// The booking store failed.
    Booking { node_id: NodeId, details: String },
    /// The chain visited more nodes than the graph has.
    CycleDetected { node_id: NodeId, limit: usize },
    /// Conversation state could not be saved.
    StateSaveFailed { details: String },
    /// A lookup the chain depends on failed.
    Lookup { details: String },
}

impl ExecutionError {
    /// Returns true if the failure is a persistence failure the webhook
    /// caller must see.
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(self, Self::StateSaveFailed { .. })
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoChannel { account_id } => {
                write!(f, "no active channel for account {account_id}")
            }
            Self::SendFailed { node_id, details } => {
                write!(f, "send from node {node_id} failed: {details}")
            }
            Self::UnsupportedNode {
                node_id,
                kind,
                reason,
            } => write!(f, "node {node_id} ({kind}) cannot be executed: {reason}"),
            Self::Booking { node_id, details } => {
                write!(f, "booking node {node_id} failed: {details}")
            }
            Self::CycleDetected { node_id, limit } => write!(
                f,
                "chain exceeded {limit} nodes at node {node_id}; the graph has a cycle"
            ),
            Self::StateSaveFailed { details } => {
                write!(f, "conversation state save failed: {details}")
            }
            Self::Lookup { details } => write!(f, "lookup failed: {details}"),
        }
    }
}

impl std::error::Error for ExecutionError {}

/// Errors returned to the webhook caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookError {
    /// No workflow of the account uses this webhook token.
    Unauthorized,
    /// Storage the engine cannot work without failed.
    Persistence { details: String },
}

impl fmt::Display for WebhookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unauthorized => write!(f, "unknown webhook token"),
            Self::Persistence { details } => write!(f, "persistence failure: {details}"),
        }
    }
}

impl std::error::Error for WebhookError {}
