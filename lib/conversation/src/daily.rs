//! The first-message-of-day claim.
//!
//! A claim is an atomic conditional insert keyed by (account, phone, local
//! date). Exactly one caller per key ever sees `true`, no matter how many
//! deliveries race.

use crate::error::RecordError;
use async_trait::async_trait;
use chatflow_core::AccountId;
use chrono::NaiveDate;
use rootcause::Report;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Storage for daily first-message claims.
#[async_trait]
pub trait DailyClaimStore: Send + Sync {
    /// Claims the first message of `date` for `phone`.
    ///
    /// Returns `true` if this call made the claim and `false` if the key was
    /// already claimed.
    async fn claim(
        &self,
        account_id: AccountId,
        phone: &str,
        date: NaiveDate,
    ) -> Result<bool, Report<RecordError>>;
}

/// In-memory claim store for tests.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDailyClaimStore {
    claims: Arc<Mutex<HashSet<(AccountId, String, NaiveDate)>>>,
}

impl InMemoryDailyClaimStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DailyClaimStore for InMemoryDailyClaimStore {
    async fn claim(
        &self,
        account_id: AccountId,
        phone: &str,
        date: NaiveDate,
    ) -> Result<bool, Report<RecordError>> {
        let mut claims = self.claims.lock().map_err(|e| RecordError::StorageFailed {
            store: "daily claim",
            reason: e.to_string(),
        })?;
        Ok(claims.insert((account_id, phone.to_string(), date)))
    }
}
