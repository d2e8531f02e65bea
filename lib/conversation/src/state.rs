//! Per-conversation state.
//!
//! One [`ConversationState`] exists per (workflow, phone) pair. It is
//! created on first interaction, saved at every node boundary and never
//! deleted by the engine.

use crate::context::ConversationContext;
use crate::error::StateError;
use async_trait::async_trait;
use chatflow_core::WorkflowId;
use chatflow_workflow::NodeId;
use chrono::{DateTime, NaiveDate, Utc};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Identifies one conversation: a participant talking to one workflow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationKey {
    pub workflow_id: WorkflowId,
    pub phone: String,
}

impl ConversationKey {
    /// Creates a key.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, phone: impl Into<String>) -> Self {
        Self {
            workflow_id,
            phone: phone.into(),
        }
    }
}

/// Persisted progress of one conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationState {
    pub workflow_id: WorkflowId,
    pub phone: String,
    /// The node the conversation last reached.
    pub current_node_id: Option<NodeId>,
    pub context: ConversationContext,
    pub last_message_at: Option<DateTime<Utc>>,
    /// Local calendar date of the last inbound message.
    pub last_message_date: Option<NaiveDate>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ConversationState {
    /// Creates a fresh state with an empty context.
    #[must_use]
    pub fn new(workflow_id: WorkflowId, phone: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            workflow_id,
            phone: phone.into(),
            current_node_id: None,
            context: ConversationContext::new(),
            last_message_at: None,
            last_message_date: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the key of this conversation.
    #[must_use]
    pub fn key(&self) -> ConversationKey {
        ConversationKey::new(self.workflow_id, self.phone.clone())
    }

    /// Moves the node pointer.
    pub fn advance_to(&mut self, node_id: NodeId) {
        self.current_node_id = Some(node_id);
        self.touch();
    }

    /// Records the arrival of an inbound message.
    pub fn record_inbound(&mut self, at: DateTime<Utc>, local_date: NaiveDate) {
        self.last_message_at = Some(at);
        self.last_message_date = Some(local_date);
        self.touch();
    }

    /// Bumps the updated_at timestamp.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Storage for conversation state.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    /// Loads the state for a conversation, if one exists.
    async fn load(
        &self,
        workflow_id: WorkflowId,
        phone: &str,
    ) -> Result<Option<ConversationState>, Report<StateError>>;

    /// Inserts or replaces the state for its (workflow, phone) key.
    async fn save(&self, state: &ConversationState) -> Result<(), Report<StateError>>;
}

/// In-memory conversation store for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryConversationStore {
    states: Arc<Mutex<HashMap<ConversationKey, ConversationState>>>,
}

impl InMemoryConversationStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of one conversation.
    #[must_use]
    pub fn get(&self, workflow_id: WorkflowId, phone: &str) -> Option<ConversationState> {
        let states = self.states.lock().ok()?;
        states
            .get(&ConversationKey::new(workflow_id, phone))
            .cloned()
    }

    /// Returns the number of stored conversations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.states.lock().map(|states| states.len()).unwrap_or(0)
    }

    /// Returns true if no conversation is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn load(
        &self,
        workflow_id: WorkflowId,
        phone: &str,
    ) -> Result<Option<ConversationState>, Report<StateError>> {
        let states = self.states.lock().map_err(|e| StateError::StorageFailed {
            reason: e.to_string(),
        })?;
        Ok(states
            .get(&ConversationKey::new(workflow_id, phone))
            .cloned())
    }

    async fn save(&self, state: &ConversationState) -> Result<(), Report<StateError>> {
        let mut states = self.states.lock().map_err(|e| StateError::StorageFailed {
            reason: e.to_string(),
        })?;
        states.insert(state.key(), state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn advance_moves_pointer() {
        let mut state = ConversationState::new(WorkflowId::new(), "919800000001");
        assert!(state.current_node_id.is_none());

        state.advance_to(NodeId::from("welcome"));
        assert_eq!(state.current_node_id, Some(NodeId::from("welcome")));
    }

    #[tokio::test]
    async fn save_is_an_upsert() {
        let store = InMemoryConversationStore::new();
        let workflow_id = WorkflowId::new();

        let mut state = ConversationState::new(workflow_id, "919800000001");
        store.save(&state).await.expect("save");

        state.context.set("customerId", json!("42"));
        store.save(&state).await.expect("save again");

        assert_eq!(store.len(), 1);
        let loaded = store
            .load(workflow_id, "919800000001")
            .await
            .expect("load")
            .expect("present");
        assert_eq!(loaded.context.get("customerId"), Some(&json!("42")));
    }

    #[tokio::test]
    async fn states_are_scoped_by_workflow() {
        let store = InMemoryConversationStore::new();
        let first = WorkflowId::new();
        let second = WorkflowId::new();
        store
            .save(&ConversationState::new(first, "919800000001"))
            .await
            .expect("save");

        assert!(store.load(second, "919800000001").await.expect("load").is_none());
        assert!(store.load(first, "919800000001").await.expect("load").is_some());
    }
}
