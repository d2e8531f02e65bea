//! Ownership of interactive replies.
//!
//! Several workflows of one account can share a webhook token. A reply
//! quotes the provider id of the message it answers; if that message was
//! recorded as sent by another workflow, the reply is not ours.

use crate::error::ExecutionError;
use chatflow_conversation::{SentMessageRecord, SentMessageStore};
use chatflow_core::WorkflowId;
use rootcause::Report;
use std::sync::Arc;
use tracing::debug;

/// Who may handle a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// This workflow sent the quoted message.
    Mine,
    /// Another workflow sent the quoted message.
    NotMine { owner: WorkflowId },
    /// The quoted message was never recorded; any workflow may try.
    Untracked,
}

impl Ownership {
    /// Decides ownership from the record of the quoted message.
    #[must_use]
    pub fn of(record: Option<&SentMessageRecord>, workflow_id: WorkflowId) -> Self {
        match record {
            Some(record) if record.workflow_id == workflow_id => Self::Mine,
            Some(record) => Self::NotMine {
                owner: record.workflow_id,
            },
            None => Self::Untracked,
        }
    }

    /// Returns true unless another workflow owns the reply.
    #[must_use]
    pub const fn may_handle(&self) -> bool {
        !matches!(self, Self::NotMine { .. })
    }
}

/// Looks up the owner of quoted messages.
#[derive(Clone)]
pub struct OwnershipResolver {
    sent_messages: Arc<dyn SentMessageStore>,
}

impl OwnershipResolver {
    /// Creates a resolver.
    #[must_use]
    pub fn new(sent_messages: Arc<dyn SentMessageStore>) -> Self {
        Self { sent_messages }
    }

    /// Finds the record of a quoted message.
    ///
    /// The lookup is done once per reply and shared across candidate
    /// workflows.
    ///
    /// # Errors
    ///
    /// Returns an error if the record store fails.
    pub async fn lookup(
        &self,
        quoted_id: Option<&str>,
    ) -> Result<Option<SentMessageRecord>, Report<ExecutionError>> {
        let Some(quoted_id) = quoted_id.filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        let record = self
            .sent_messages
            .find_by_message_id(quoted_id)
            .await
            .map_err(|e| ExecutionError::Lookup {
                details: e.to_string(),
            })?;
        if record.is_none() {
            debug!(quoted_id, "quoted message is untracked");
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatflow_conversation::InMemorySentMessageStore;

    #[test]
    fn ownership_from_record() {
        let mine = WorkflowId::new();
        let other = WorkflowId::new();
        let record = SentMessageRecord::new(other, "wamid.1", "919800000001", "quickReply");

        assert_eq!(
            Ownership::of(Some(&record), other),
            Ownership::Mine
        );
        assert_eq!(
            Ownership::of(Some(&record), mine),
            Ownership::NotMine { owner: other }
        );
        assert_eq!(Ownership::of(None, mine), Ownership::Untracked);
        assert!(Ownership::Untracked.may_handle());
        assert!(!Ownership::NotMine { owner: other }.may_handle());
    }

    #[tokio::test]
    async fn lookup_finds_recorded_message() {
        let store = InMemorySentMessageStore::new();
        let workflow_id = WorkflowId::new();
        store
            .record(&SentMessageRecord::new(
                workflow_id,
                "wamid.1",
                "919800000001",
                "listMessage",
            ))
            .await
            .expect("record");
        let resolver = OwnershipResolver::new(Arc::new(store));

        let found = resolver.lookup(Some("wamid.1")).await.expect("lookup");
        assert_eq!(found.map(|r| r.workflow_id), Some(workflow_id));
        assert!(resolver.lookup(Some("wamid.2")).await.expect("lookup").is_none());
        assert!(resolver.lookup(None).await.expect("lookup").is_none());
    }
}
