//! Administrator settings read at execution time.

use crate::error::SettingsError;
use async_trait::async_trait;
use rootcause::Report;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Setting keys the engine reads.
pub mod keys {
    /// Domains HTTP actions may call.
    pub const HTTP_ACTION_ALLOWED_DOMAINS: &str = "http_action_allowed_domains";
    /// Delay between consecutive sends within one chain, in milliseconds.
    pub const CHAIN_MESSAGE_DELAY_MS: &str = "chain_message_delay_ms";
}

/// Key/value settings storage.
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// Gets a setting value.
    async fn get_setting(&self, key: &str) -> Result<Option<String>, Report<SettingsError>>;
}

/// In-memory settings for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemorySettingsStore {
    values: Arc<Mutex<HashMap<String, String>>>,
}

impl InMemorySettingsStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a value.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        if let Ok(mut values) = self.values.lock() {
            values.insert(key.into(), value.into());
        }
    }

    /// Builder form of [`set`](Self::set).
    #[must_use]
    pub fn with(self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }
}

#[async_trait]
impl SettingsStore for InMemorySettingsStore {
    async fn get_setting(&self, key: &str) -> Result<Option<String>, Report<SettingsError>> {
        let values = self.values.lock().map_err(|e| SettingsError::StorageFailed {
            key: key.to_string(),
            reason: e.to_string(),
        })?;
        Ok(values.get(key).cloned())
    }
}
