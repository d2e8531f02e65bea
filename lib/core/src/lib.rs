//! Core domain types for the chatflow conversational workflow engine.
//!
//! This crate provides the typed identifiers shared by every other
//! chatflow crate.

pub mod id;

pub use id::{AccountId, ChannelId, ExecutionLogId, ParseIdError, WorkflowId};
