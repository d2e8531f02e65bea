//! The first-message-of-day trigger.
//!
//! A participant's first text message of a local calendar day starts the
//! entry node of every active workflow of the account that has one. The
//! day is computed in a fixed reference offset from the event timestamp,
//! and the "first" decision is an atomic claim, so concurrent deliveries
//! start the entry nodes exactly once.

use crate::error::ExecutionError;
use chatflow_conversation::DailyClaimStore;
use chatflow_core::AccountId;
use chatflow_workflow::{Workflow, WorkflowSource};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveTime, Utc};
use rootcause::Report;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Converts event timestamps to the reference local time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalClock {
    offset: FixedOffset,
}

impl LocalClock {
    /// Creates a clock for an offset east of UTC, in minutes.
    ///
    /// Returns `None` for offsets of a day or more.
    #[must_use]
    pub fn from_offset_minutes(minutes: i32) -> Option<Self> {
        let offset = FixedOffset::east_opt(minutes.checked_mul(60)?)?;
        Some(Self { offset })
    }

    /// Local calendar date of `at`.
    #[must_use]
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }

    /// Local wall-clock time of `at`.
    #[must_use]
    pub fn local_time(&self, at: DateTime<Utc>) -> NaiveTime {
        at.with_timezone(&self.offset).time()
    }
}

/// What a text message means for the daily trigger.
#[derive(Debug, Clone)]
pub enum TriggerDecision {
    /// First message of the day: start these workflows' entry nodes.
    FirstOfDay(Vec<Workflow>),
    /// The day was already claimed; the message is an inquiry.
    Inquiry,
}

/// Claims the first message of a day and lists the workflows to start.
#[derive(Clone)]
pub struct FirstMessageTrigger {
    claims: Arc<dyn DailyClaimStore>,
    workflows: Arc<dyn WorkflowSource>,
    clock: LocalClock,
}

impl FirstMessageTrigger {
    /// Creates a trigger.
    #[must_use]
    pub fn new(
        claims: Arc<dyn DailyClaimStore>,
        workflows: Arc<dyn WorkflowSource>,
        clock: LocalClock,
    ) -> Self {
        Self {
            claims,
            workflows,
            clock,
        }
    }

    /// Decides whether a text message at `at` is the phone's first today.
    ///
    /// # Errors
    ///
    /// Returns an error if the claim or the workflow lookup fails.
    #[instrument(skip(self), fields(account_id = %account_id))]
    pub async fn evaluate(
        &self,
        account_id: AccountId,
        phone: &str,
        at: DateTime<Utc>,
    ) -> Result<TriggerDecision, Report<ExecutionError>> {
        let date = self.clock.local_date(at);
        let claimed = self
            .claims
            .claim(account_id, phone, date)
            .await
            .map_err(|e| ExecutionError::Lookup {
                details: e.to_string(),
            })?;
        if !claimed {
            debug!(%date, "day already claimed");
            return Ok(TriggerDecision::Inquiry);
        }

        let workflows = self
            .workflows
            .list_with_entry_node(account_id)
            .await
            .map_err(|e| ExecutionError::Lookup {
                details: e.to_string(),
            })?;
        debug!(%date, workflows = workflows.len(), "first message of the day");
        Ok(TriggerDecision::FirstOfDay(workflows))
    }
}
