//! Postgres implementations of the engine's store seams.
//!
//! This module provides data access for:
//! - Workflows, looked up by webhook token and by entry node
//! - Conversation state, sent-message records, daily claims and
//!   execution logs
//! - Channels and administrator settings
//! - Booking departments, staff, slots and bookings

pub mod booking;
pub mod conversation;
pub mod integration;
pub mod workflow;

pub use booking::PgBookingStore;
pub use conversation::{
    PgConversationStore, PgDailyClaimStore, PgExecutionLogStore, PgSentMessageStore,
};
pub use integration::{PgChannelDirectory, PgSettingsStore};
pub use workflow::PgWorkflowSource;

use std::fmt::Display;

/// Builds the decode error for a column value that does not parse.
pub(crate) fn decode_error(what: &str, value: &str, error: impl Display) -> sqlx::Error {
    sqlx::Error::Decode(Box::new(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("invalid {what} '{value}': {error}"),
    )))
}
