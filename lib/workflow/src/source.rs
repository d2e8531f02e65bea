//! The repository seam workflows are loaded through.

use crate::definition::Workflow;
use crate::error::WorkflowError;
use async_trait::async_trait;
use chatflow_core::AccountId;
use rootcause::Report;
use std::sync::{Arc, Mutex};

/// Loads workflow definitions for inbound event handling.
#[async_trait]
pub trait WorkflowSource: Send + Sync {
    /// Returns the active workflows of `account_id` whose webhook token
    /// equals `token`, in creation order.
    async fn find_by_webhook_token(
        &self,
        account_id: AccountId,
        token: &str,
    ) -> Result<Vec<Workflow>, Report<WorkflowError>>;

    /// Returns the active workflows of `account_id` that have an entry node
    /// configured, in creation order.
    async fn list_with_entry_node(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Workflow>, Report<WorkflowError>>;
}

/// In-memory workflow source for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryWorkflowSource {
    workflows: Arc<Mutex<Vec<Workflow>>>,
}

impl InMemoryWorkflowSource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a workflow.
    pub fn insert(&self, workflow: Workflow) {
        if let Ok(mut workflows) = self.workflows.lock() {
            workflows.push(workflow);
        }
    }

    fn select(
        &self,
        account_id: AccountId,
        predicate: impl Fn(&Workflow) -> bool,
    ) -> Result<Vec<Workflow>, Report<WorkflowError>> {
        let workflows = self.workflows.lock().map_err(|e| WorkflowError::Storage {
            account_id,
            details: e.to_string(),
        })?;
        Ok(workflows
            .iter()
            .filter(|w| w.account_id == account_id && w.is_active && predicate(w))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl WorkflowSource for InMemoryWorkflowSource {
    async fn find_by_webhook_token(
        &self,
        account_id: AccountId,
        token: &str,
    ) -> Result<Vec<Workflow>, Report<WorkflowError>> {
        self.select(account_id, |w| w.webhook_token == token)
    }

    async fn list_with_entry_node(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Workflow>, Report<WorkflowError>> {
        self.select(account_id, |w| w.entry_node_id.is_some())
    }
}
