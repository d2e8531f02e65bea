//! Workflow lookups for inbound webhooks.

use super::decode_error;
use async_trait::async_trait;
use chatflow_core::{AccountId, WorkflowId};
use chatflow_workflow::{NodeId, Workflow, WorkflowError, WorkflowGraph, WorkflowSource};
use chrono::{DateTime, Utc};
use rootcause::Report;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for workflow queries.
#[derive(FromRow)]
struct WorkflowRow {
    id: String,
    account_id: String,
    name: String,
    is_active: bool,
    entry_node_id: Option<String>,
    webhook_token: String,
    graph_data: serde_json::Value,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl WorkflowRow {
    fn try_into_workflow(self) -> Result<Workflow, sqlx::Error> {
        let id = WorkflowId::from_str(&self.id)
            .map_err(|e| decode_error("workflow id", &self.id, e))?;
        let account_id = AccountId::from_str(&self.account_id)
            .map_err(|e| decode_error("account id", &self.account_id, e))?;
        // Node-level problems decode to unsupported nodes; only a document
        // that is not a graph at all fails here.
        let graph: WorkflowGraph = serde_json::from_value(self.graph_data)
            .map_err(|e| decode_error("workflow graph", &self.id, e))?;

        Ok(Workflow {
            id,
            account_id,
            name: self.name,
            is_active: self.is_active,
            entry_node_id: self.entry_node_id.map(NodeId::from),
            webhook_token: self.webhook_token,
            graph,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

/// Postgres-backed workflow source.
#[derive(Clone)]
pub struct PgWorkflowSource {
    pool: PgPool,
}

impl PgWorkflowSource {
    /// Creates a new source.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Stores a workflow, replacing any previous version.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph cannot be encoded or the write fails.
    pub async fn upsert(&self, workflow: &Workflow) -> Result<(), sqlx::Error> {
        let graph = serde_json::to_value(&workflow.graph)
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        sqlx::query(
            r#"
            INSERT INTO workflows
                (id, account_id, name, is_active, entry_node_id, webhook_token,
                 graph_data, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, is_active = EXCLUDED.is_active,
                entry_node_id = EXCLUDED.entry_node_id,
                webhook_token = EXCLUDED.webhook_token,
                graph_data = EXCLUDED.graph_data, updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(workflow.id.to_string())
        .bind(workflow.account_id.to_string())
        .bind(&workflow.name)
        .bind(workflow.is_active)
        .bind(workflow.entry_node_id.as_ref().map(NodeId::as_str))
        .bind(&workflow.webhook_token)
        .bind(&graph)
        .bind(workflow.created_at)
        .bind(workflow.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    fn storage_error(account_id: AccountId, error: &sqlx::Error) -> WorkflowError {
        WorkflowError::Storage {
            account_id,
            details: error.to_string(),
        }
    }
}

#[async_trait]
impl WorkflowSource for PgWorkflowSource {
    async fn find_by_webhook_token(
        &self,
        account_id: AccountId,
        token: &str,
    ) -> Result<Vec<Workflow>, Report<WorkflowError>> {
        let rows: Vec<WorkflowRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, name, is_active, entry_node_id, webhook_token,
                   graph_data, created_at, updated_at
            FROM workflows
            WHERE account_id = $1 AND webhook_token = $2 AND is_active
            ORDER BY created_at, id
            "#,
        )
        .bind(account_id.to_string())
        .bind(token)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::storage_error(account_id, &e))?;

        let workflows = rows
            .into_iter()
            .map(WorkflowRow::try_into_workflow)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Self::storage_error(account_id, &e))?;
        Ok(workflows)
    }

    async fn list_with_entry_node(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<Workflow>, Report<WorkflowError>> {
        let rows: Vec<WorkflowRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, name, is_active, entry_node_id, webhook_token,
                   graph_data, created_at, updated_at
            FROM workflows
            WHERE account_id = $1 AND is_active AND entry_node_id IS NOT NULL
            ORDER BY created_at, id
            "#,
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| Self::storage_error(account_id, &e))?;

        let workflows = rows
            .into_iter()
            .map(WorkflowRow::try_into_workflow)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| Self::storage_error(account_id, &e))?;
        Ok(workflows)
    }
}
