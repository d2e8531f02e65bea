//! Channel and administrator setting lookups.

use super::decode_error;
use async_trait::async_trait;
use chatflow_core::{AccountId, ChannelId};
use chatflow_integration::{Channel, ChannelDirectory, ChannelError, SettingsError, SettingsStore};
use rootcause::Report;
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Row type for channel queries.
#[derive(FromRow)]
struct ChannelRow {
    id: String,
    account_id: String,
    token: String,
    is_active: bool,
    is_authorized: bool,
}

impl ChannelRow {
    fn try_into_channel(self) -> Result<Channel, sqlx::Error> {
        let id = ChannelId::from_str(&self.id)
            .map_err(|e| decode_error("channel id", &self.id, e))?;
        let account_id = AccountId::from_str(&self.account_id)
            .map_err(|e| decode_error("account id", &self.account_id, e))?;
        Ok(Channel {
            id,
            account_id,
            token: self.token,
            is_active: self.is_active,
            is_authorized: self.is_authorized,
        })
    }
}

/// Postgres-backed channel directory.
#[derive(Clone)]
pub struct PgChannelDirectory {
    pool: PgPool,
}

impl PgChannelDirectory {
    /// Creates a new directory.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelDirectory for PgChannelDirectory {
    async fn active_channel(
        &self,
        account_id: AccountId,
    ) -> Result<Option<Channel>, Report<ChannelError>> {
        let row: Option<ChannelRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, token, is_active, is_authorized
            FROM channels
            WHERE account_id = $1 AND is_active AND is_authorized
            ORDER BY created_at, id
            LIMIT 1
            "#,
        )
        .bind(account_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ChannelError::StorageFailed {
            reason: e.to_string(),
        })?;

        match row {
            Some(row) => Ok(Some(row.try_into_channel().map_err(|e| {
                ChannelError::StorageFailed {
                    reason: e.to_string(),
                }
            })?)),
            None => Ok(None),
        }
    }
}

/// Postgres-backed administrator settings.
#[derive(Clone)]
pub struct PgSettingsStore {
    pool: PgPool,
}

impl PgSettingsStore {
    /// Creates a new store.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SettingsStore for PgSettingsStore {
    async fn get_setting(&self, key: &str) -> Result<Option<String>, Report<SettingsError>> {
        let value: Option<(String,)> =
            sqlx::query_as("SELECT value FROM settings WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| SettingsError::StorageFailed {
                    key: key.to_string(),
                    reason: e.to_string(),
                })?;
        Ok(value.map(|(value,)| value))
    }
}
