//! Error types for the workflow crate.
//!
//! Graph problems are never errors at execution time: malformed graphs are
//! reported through [`GraphIssue`](crate::graph::GraphIssue) and tolerated.
//! The only failures surfaced here come from loading workflows.

use chatflow_core::{AccountId, WorkflowId};
use std::fmt;

/// Errors from workflow loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// Workflow not found.
    NotFound { workflow_id: WorkflowId },
    /// The backing store failed.
    Storage { account_id: AccountId, details: String },
    /// The stored graph document could not be decoded.
    InvalidGraph { workflow_id: WorkflowId, details: String },
}

impl fmt::Display for WorkflowError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { workflow_id } => {
                write!(f, "workflow not found: {workflow_id}")
            }
            Self::Storage {
                account_id,
                details,
            } => {
                write!(f, "workflow storage failed for {account_id}: {details}")
            }
            Self::InvalidGraph {
                workflow_id,
                details,
            } => {
                write!(f, "invalid graph for workflow {workflow_id}: {details}")
            }
        }
    }
}

impl std::error::Error for WorkflowError {}
