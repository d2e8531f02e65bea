//! Conversation persistence for the chatflow engine.
//!
//! This crate provides:
//!
//! - **Conversation State**: per (workflow, phone) node pointer and typed
//!   context, with booking and capture sub-states
//! - **Sent Message Records**: provider message ids of interactive sends,
//!   used to decide which workflow owns a reply
//! - **Execution Logs**: one audit entry per processed inbound event
//! - **Daily Claims**: the atomic first-message-of-day primitive
//! - **Keyed Locks**: in-process serialization of one conversation's
//!   read-modify-write cycle

pub mod context;
pub mod daily;
pub mod error;
pub mod execution_log;
pub mod lock;
pub mod sent_message;
pub mod state;

pub use context::{
    BookingFlow, BookingState, BookingStep, CaptureField, CaptureState, CapturedAnswer,
    ConversationContext,
};
pub use daily::{DailyClaimStore, InMemoryDailyClaimStore};
pub use error::{RecordError, StateError};
pub use execution_log::{
    ExecutionLogStore, ExecutionStatus, InMemoryExecutionLogStore, MessageKind, SentResponse,
    WorkflowExecutionLog,
};
pub use lock::KeyedLocks;
pub use sent_message::{InMemorySentMessageStore, SentMessageRecord, SentMessageStore};
pub use state::{ConversationKey, ConversationState, ConversationStore, InMemoryConversationStore};
