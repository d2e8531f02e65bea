//! Audit log of processed inbound events.
//!
//! One entry is appended per inbound event a workflow handled, carrying the
//! raw trigger payload and every response sent along the chain.

use crate::error::RecordError;
use async_trait::async_trait;
use chatflow_core::{ExecutionLogId, WorkflowId};
use chatflow_workflow::NodeId;
use chrono::{DateTime, Utc};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::{Arc, Mutex};

/// How the triggering inbound message was classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    ButtonReply,
    ListReply,
}

impl MessageKind {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::ButtonReply => "button_reply",
            Self::ListReply => "list_reply",
        }
    }

    /// Parses from the stored string representation.
    #[must_use]
    pub fn from_str_value(value: &str) -> Option<Self> {
        match value {
            "text" => Some(Self::Text),
            "button_reply" => Some(Self::ButtonReply),
            "list_reply" => Some(Self::ListReply),
            _ => None,
        }
    }
}

/// Outcome of handling one inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
}

impl ExecutionStatus {
    /// Returns the string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Parses from the stored string representation.
    #[must_use]
    pub fn from_str_value(value: &str) -> Option<Self> {
        match value {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A message sent while executing a chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentResponse {
    pub node_id: NodeId,
    /// Node type tag of the sending node.
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_message_id: Option<String>,
}

/// One audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExecutionLog {
    pub id: ExecutionLogId,
    pub workflow_id: WorkflowId,
    pub phone: String,
    pub message_kind: MessageKind,
    /// The raw provider event that triggered the chain.
    pub trigger: JsonValue,
    pub responses: Vec<SentResponse>,
    pub status: ExecutionStatus,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WorkflowExecutionLog {
    /// Creates a successful entry with no responses.
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        phone: impl Into<String>,
        message_kind: MessageKind,
        trigger: JsonValue,
    ) -> Self {
        Self {
            id: ExecutionLogId::new(),
            workflow_id,
            phone: phone.into(),
            message_kind,
            trigger,
            responses: Vec::new(),
            status: ExecutionStatus::Success,
            error: None,
            created_at: Utc::now(),
        }
    }

    /// Sets the responses.
    #[must_use]
    pub fn with_responses(mut self, responses: Vec<SentResponse>) -> Self {
        self.responses = responses;
        self
    }

    /// Marks the entry failed.
    #[must_use]
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.status = ExecutionStatus::Failed;
        self.error = Some(error.into());
        self
    }
}

/// Append-only storage for execution log entries.
#[async_trait]
pub trait ExecutionLogStore: Send + Sync {
    /// Appends an entry.
    async fn append(&self, entry: &WorkflowExecutionLog) -> Result<(), Report<RecordError>>;
}

/// In-memory execution log for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryExecutionLogStore {
    entries: Arc<Mutex<Vec<WorkflowExecutionLog>>>,
}

impl InMemoryExecutionLogStore {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every entry in append order.
    #[must_use]
    pub fn entries(&self) -> Vec<WorkflowExecutionLog> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ExecutionLogStore for InMemoryExecutionLogStore {
    async fn append(&self, entry: &WorkflowExecutionLog) -> Result<(), Report<RecordError>> {
        let mut entries = self.entries.lock().map_err(|e| RecordError::StorageFailed {
            store: "execution log",
            reason: e.to_string(),
        })?;
        entries.push(entry.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_string_roundtrip() {
        for status in [ExecutionStatus::Success, ExecutionStatus::Failed] {
            assert_eq!(ExecutionStatus::from_str_value(status.as_str()), Some(status));
        }
        assert_eq!(MessageKind::from_str_value("list_reply"), Some(MessageKind::ListReply));
        assert_eq!(MessageKind::from_str_value("voice"), None);
    }

    #[tokio::test]
    async fn failed_entry_keeps_responses() {
        let store = InMemoryExecutionLogStore::new();
        let entry = WorkflowExecutionLog::new(
            WorkflowId::new(),
            "919800000001",
            MessageKind::ButtonReply,
            json!({"id": "wamid.9"}),
        )
        .with_responses(vec![SentResponse {
            node_id: NodeId::from("welcome"),
            kind: "textMessage".to_string(),
            provider_message_id: Some("wamid.10".to_string()),
        }])
        .failed("send failed");

        store.append(&entry).await.expect("append");

        let entries = store.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, ExecutionStatus::Failed);
        assert_eq!(entries[0].responses.len(), 1);
    }
}
