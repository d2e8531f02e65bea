//! Conversation state, sent-message records, daily claims and execution
//! logs.

use super::decode_error;
use async_trait::async_trait;
use chatflow_conversation::{
    ConversationContext, ConversationState, ConversationStore, DailyClaimStore,
    ExecutionLogStore, RecordError, SentMessageRecord, SentMessageStore, StateError,
    WorkflowExecutionLog,
};
use chatflow_core::{AccountId, WorkflowId};
use chatflow_workflow::NodeId;
use chrono::{DateTime, NaiveDate, Utc};
use rootcause::Report;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for conversation state queries.
#[derive(FromRow)]
struct ConversationRow {
    workflow_id: String,
    phone: String,
    current_node_id: Option<String>,
    context: serde_json::Value,
    last_message_at: Option<DateTime<Utc>>,
    last_message_date: Option<NaiveDate>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ConversationRow {
    fn try_into_state(self) -> Result<ConversationState, sqlx::Error> {
        let workflow_id = WorkflowId::from_str(&self.workflow_id)
            .map_err(|e| decode_error("workflow id", &self.workflow_id, e))?;
        let context: ConversationContext = serde_json::from_value(self.context)
            .map_err(|e| decode_error("conversation context", &self.phone, e))?;
        Ok(ConversationState {
            workflow_id,
            phone: self.phone,
            current_node_id: self.current_node_id.map(NodeId::from),
            context,
            last_message_at: self.last_message_at,
            last_message_date: self.last_message_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Postgres-backed conversation state.
#[derive(Clone)]
pub struct PgConversationStore {
    pool: PgPool,
}

impl PgConversationStore {
    /// Creates a new store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationStore for PgConversationStore {
    async fn load(
        &self,
        workflow_id: WorkflowId,
        phone: &str,
    ) -> Result<Option<ConversationState>, Report<StateError>> {
        let row: Option<ConversationRow> = sqlx::query_as(
            r#"
            SELECT workflow_id, phone, current_node_id, context, last_message_at,
                   last_message_date, created_at, updated_at
            FROM conversation_states
            WHERE workflow_id = $1 AND phone = $2
            "#,
        )
        .bind(workflow_id.to_string())
        .bind(phone)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StateError::StorageFailed {
            reason: e.to_string(),
        })?;

        match row {
            Some(row) => Ok(Some(row.try_into_state().map_err(|e| {
                StateError::InvalidData {
                    reason: e.to_string(),
                }
            })?)),
            None => Ok(None),
        }
    }

    async fn save(&self, state: &ConversationState) -> Result<(), Report<StateError>> {
        let context = serde_json::to_value(&state.context).map_err(|e| {
            StateError::InvalidData {
                reason: e.to_string(),
            }
        })?;
        sqlx::query(
            r#"
            INSERT INTO conversation_states
                (workflow_id, phone, current_node_id, context, last_message_at,
                 last_message_date, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW())
            ON CONFLICT (workflow_id, phone) DO UPDATE
            SET current_node_id = EXCLUDED.current_node_id,
                context = EXCLUDED.context,
                last_message_at = EXCLUDED.last_message_at,
                last_message_date = EXCLUDED.last_message_date,
                updated_at = NOW()
            "#,
        )
        .bind(state.workflow_id.to_string())
        .bind(&state.phone)
        .bind(state.current_node_id.as_ref().map(NodeId::as_str))
        .bind(&context)
        .bind(state.last_message_at)
        .bind(state.last_message_date)
        .bind(state.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| StateError::StorageFailed {
            reason: e.to_string(),
        })?;
        Ok(())
    }
}

/// Row type for sent-message queries.
#[derive(FromRow)]
struct SentMessageRow {
    workflow_id: String,
    provider_message_id: String,
    phone: String,
    message_kind: String,
    sent_at: DateTime<Utc>,
}

impl SentMessageRow {
    fn try_into_record(self) -> Result<SentMessageRecord, sqlx::Error> {
        let workflow_id = WorkflowId::from_str(&self.workflow_id)
            .map_err(|e| decode_error("workflow id", &self.workflow_id, e))?;
        Ok(SentMessageRecord {
            workflow_id,
            provider_message_id: self.provider_message_id,
            phone: self.phone,
            message_kind: self.message_kind,
            sent_at: self.sent_at,
        })
    }
}

/// Postgres-backed sent-message records.
#[derive(Clone)]
pub struct PgSentMessageStore {
    pool: PgPool,
}

impl PgSentMessageStore {
    /// Creates a new store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SentMessageStore for PgSentMessageStore {
    async fn record(&self, record: &SentMessageRecord) -> Result<(), Report<RecordError>> {
        sqlx::query(
            r#"
            INSERT INTO sent_messages
                (provider_message_id, workflow_id, phone, message_kind, sent_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (provider_message_id) DO NOTHING
            "#,
        )
        .bind(&record.provider_message_id)
        .bind(record.workflow_id.to_string())
        .bind(&record.phone)
        .bind(&record.message_kind)
        .bind(record.sent_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RecordError::StorageFailed {
            store: "sent_messages",
            reason: e.to_string(),
        })?;
        Ok(())
    }

    async fn find_by_message_id(
        &self,
        provider_message_id: &str,
    ) -> Result<Option<SentMessageRecord>, Report<RecordError>> {
        let row: Option<SentMessageRow> = sqlx::query_as(
            r#"
            SELECT workflow_id, provider_message_id, phone, message_kind, sent_at
            FROM sent_messages
            WHERE provider_message_id = $1
            "#,
        )
        .bind(provider_message_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RecordError::StorageFailed {
            store: "sent_messages",
            reason: e.to_string(),
        })?;

        match row {
            Some(row) => Ok(Some(row.try_into_record().map_err(|e| {
                RecordError::InvalidData {
                    store: "sent_messages",
                    reason: e.to_string(),
                }
            })?)),
            None => Ok(None),
        }
    }
}

/// Postgres-backed daily first-message claims.
///
/// The claim is the insert itself; the unique key on
/// `(account_id, phone, local_date)` makes concurrent claims race safely.
#[derive(Clone)]
pub struct PgDailyClaimStore {
    pool: PgPool,
}

impl PgDailyClaimStore {
    /// Creates a new store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DailyClaimStore for PgDailyClaimStore {
    async fn claim(
        &self,
        account_id: AccountId,
        phone: &str,
        date: NaiveDate,
    ) -> Result<bool, Report<RecordError>> {
        let result = sqlx::query(
            r#"
            INSERT INTO daily_first_messages (account_id, phone, local_date, claimed_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (account_id, phone, local_date) DO NOTHING
            "#,
        )
        .bind(account_id.to_string())
        .bind(phone)
        .bind(date)
        .execute(&self.pool)
        .await
        .map_err(|e| RecordError::StorageFailed {
            store: "daily_first_messages",
            reason: e.to_string(),
        })?;
        Ok(result.rows_affected() == 1)
    }
}

/// Postgres-backed execution log.
#[derive(Clone)]
pub struct PgExecutionLogStore {
    pool: PgPool,
}

impl PgExecutionLogStore {
    /// Creates a new store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ExecutionLogStore for PgExecutionLogStore {
    async fn append(&self, entry: &WorkflowExecutionLog) -> Result<(), Report<RecordError>> {
        let responses = serde_json::to_value(&entry.responses).map_err(|e| {
            RecordError::InvalidData {
                store: "workflow_execution_logs",
                reason: e.to_string(),
            }
        })?;
        sqlx::query(
            r#"
            INSERT INTO workflow_execution_logs
                (id, workflow_id, phone, message_kind, trigger, responses, status,
                 error, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.workflow_id.to_string())
        .bind(&entry.phone)
        .bind(entry.message_kind.as_str())
        .bind(&entry.trigger)
        .bind(&responses)
        .bind(entry.status.as_str())
        .bind(&entry.error)
        .bind(entry.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| RecordError::StorageFailed {
            store: "workflow_execution_logs",
            reason: e.to_string(),
        })?;
        Ok(())
    }
}
