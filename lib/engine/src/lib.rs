//! Webhook processing and node execution.
//!
//! This crate provides:
//!
//! - **Inbound Normalizer**: provider message events into text, reply or
//!   ignorable events
//! - **First-Message-of-Day Trigger**: the atomic daily claim and the
//!   entry-node fan-out
//! - **Ownership Disambiguator**: which workflow sent a quoted message
//! - **Node Executor**: the chain loop with its cycle guard
//! - **Webhook Processor**: per-delivery orchestration under per-key locks

pub mod error;
pub mod executor;
pub mod inbound;
pub mod ownership;
pub mod processor;
pub mod render;
pub mod trigger;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{ExecutionError, WebhookError};
pub use executor::{ChainExecutor, ChainReport, ChainStart, EventFacts, ExecutorDeps};
pub use inbound::{IgnoreReason, InboundEvent, ReplyEvent, TextEvent, WebhookPayload};
pub use ownership::{Ownership, OwnershipResolver};
pub use processor::{Collaborators, WebhookOutcome, WebhookProcessor};
pub use render::{OutboundMessage, render_flow_message, render_node};
pub use trigger::{FirstMessageTrigger, LocalClock, TriggerDecision};
