//! Messaging channels connected to an account.

use crate::error::ChannelError;
use async_trait::async_trait;
use chatflow_core::{AccountId, ChannelId};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// A provider channel an account sends through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: ChannelId,
    pub account_id: AccountId,
    /// Provider send token.
    pub token: String,
    pub is_active: bool,
    /// Whether the provider has finished authorizing the channel.
    pub is_authorized: bool,
}

impl Channel {
    /// Creates an active, authorized channel.
    #[must_use]
    pub fn new(account_id: AccountId, token: impl Into<String>) -> Self {
        Self {
            id: ChannelId::new(),
            account_id,
            token: token.into(),
            is_active: true,
            is_authorized: true,
        }
    }

    /// Returns true if messages can be sent through this channel.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.is_active && self.is_authorized
    }
}

/// Finds the channel an account sends through.
#[async_trait]
pub trait ChannelDirectory: Send + Sync {
    /// Returns the account's first active, authorized channel.
    async fn active_channel(
        &self,
        account_id: AccountId,
    ) -> Result<Option<Channel>, Report<ChannelError>>;
}

/// In-memory channel directory for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryChannelDirectory {
    channels: Arc<Mutex<Vec<Channel>>>,
}

impl InMemoryChannelDirectory {
    /// Creates an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a channel.
    pub fn insert(&self, channel: Channel) {
        if let Ok(mut channels) = self.channels.lock() {
            channels.push(channel);
        }
    }
}

#[async_trait]
impl ChannelDirectory for InMemoryChannelDirectory {
    async fn active_channel(
        &self,
        account_id: AccountId,
    ) -> Result<Option<Channel>, Report<ChannelError>> {
        let channels = self.channels.lock().map_err(|e| ChannelError::StorageFailed {
            reason: e.to_string(),
        })?;
        Ok(channels
            .iter()
            .find(|channel| channel.account_id == account_id && channel.is_usable())
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn skips_unauthorized_channels() {
        let directory = InMemoryChannelDirectory::new();
        let account = AccountId::new();
        let mut pending = Channel::new(account, "pending");
        pending.is_authorized = false;
        directory.insert(pending);
        directory.insert(Channel::new(account, "ready"));

        let channel = directory
            .active_channel(account)
            .await
            .expect("lookup")
            .expect("channel");
        assert_eq!(channel.token, "ready");
        assert!(
            directory
                .active_channel(AccountId::new())
                .await
                .expect("lookup")
                .is_none()
        );
    }
}
