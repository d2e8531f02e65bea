//! Records of interactive messages sent on behalf of a workflow.
//!
//! When a customer replies to an interactive message the provider echoes
//! the id of the message being replied to. Looking that id up here tells
//! which workflow sent it.

use crate::error::RecordError;
use async_trait::async_trait;
use chatflow_core::WorkflowId;
use chrono::{DateTime, Utc};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

const STORE: &str = "sent message";

/// One interactive message sent by a workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessageRecord {
    pub workflow_id: WorkflowId,
    /// Message id assigned by the messaging provider.
    pub provider_message_id: String,
    pub phone: String,
    /// Node type tag of the node that sent the message.
    pub message_kind: String,
    pub sent_at: DateTime<Utc>,
}

impl SentMessageRecord {
    /// Creates a record stamped with the current time.
    #[must_use]
    pub fn new(
        workflow_id: WorkflowId,
        provider_message_id: impl Into<String>,
        phone: impl Into<String>,
        message_kind: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id,
            provider_message_id: provider_message_id.into(),
            phone: phone.into(),
            message_kind: message_kind.into(),
            sent_at: Utc::now(),
        }
    }
}

/// Storage for sent-message records.
#[async_trait]
pub trait SentMessageStore: Send + Sync {
    /// Records a sent message.
    async fn record(&self, record: &SentMessageRecord) -> Result<(), Report<RecordError>>;

    /// Finds the record for a provider message id.
    async fn find_by_message_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<SentMessageRecord>, Report<RecordError>>;
}

/// In-memory sent-message store for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemorySentMessageStore {
    records: Arc<Mutex<HashMap<String, SentMessageRecord>>>,
}

impl InMemorySentMessageStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every record, in no particular order.
    #[must_use]
    pub fn records(&self) -> Vec<SentMessageRecord> {
        self.records
            .lock()
            .map(|records| records.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl SentMessageStore for InMemorySentMessageStore {
    async fn record(&self, record: &SentMessageRecord) -> Result<(), Report<RecordError>> {
        let mut records = self.records.lock().map_err(|e| RecordError::StorageFailed {
            store: STORE,
            reason: e.to_string(),
        })?;
        records.insert(record.provider_message_id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_message_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<SentMessageRecord>, Report<RecordError>> {
        let records = self.records.lock().map_err(|e| RecordError::StorageFailed {
            store: STORE,
            reason: e.to_string(),
        })?;
        Ok(records.get(provider_message_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn record_then_find() {
        let store = InMemorySentMessageStore::new();
        let workflow_id = WorkflowId::new();
        store
            .record(&SentMessageRecord::new(
                workflow_id,
                "wamid.1",
                "919800000001",
                "quickReply",
            ))
            .await
            .expect("record");

        let found = store
            .find_by_message_id("wamid.1")
            .await
            .expect("find")
            .expect("present");
        assert_eq!(found.workflow_id, workflow_id);
        assert!(store.find_by_message_id("wamid.2").await.expect("find").is_none());
    }
}
