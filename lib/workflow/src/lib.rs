//! Workflow graph model for the chatflow engine.
//!
//! This crate provides:
//!
//! - **Graph Model**: nodes with a closed set of kinds and edges qualified
//!   by an optional source handle
//! - **Node Configuration**: per-kind configuration for messages,
//!   interactive layouts, HTTP actions and booking nodes
//! - **Edge Resolver**: ordered fallback strategies that map an
//!   interactive reply id or a named outcome to the edge that should fire
//! - **Workflow Source**: the repository seam the engine loads graphs from

pub mod config;
pub mod definition;
pub mod edge;
pub mod error;
pub mod graph;
pub mod node;
pub mod resolver;
pub mod source;

pub use config::{
    ActionButton, BookAppointmentConfig, ButtonsMessageConfig, CarouselCard, CarouselConfig,
    CheckBookingsConfig, HttpActionConfig, HttpAuth, HttpBody, HttpMethod, KeyValue,
    ListMessageConfig, ListRow, ListSection, LocationMessageConfig, MediaHeader,
    MediaMessageConfig, MediaType, QuickReplyConfig, ReplyButton, ResponseMapping,
    TextMessageConfig,
};
pub use definition::Workflow;
pub use edge::Edge;
pub use error::WorkflowError;
pub use graph::{GraphIssue, WorkflowGraph};
pub use node::{Node, NodeCategory, NodeId, NodeKind};
pub use resolver::{
    Resolution, ResolutionStrategy, resolve_outcome, resolve_primary_outcome, resolve_reply,
};
pub use source::{InMemoryWorkflowSource, WorkflowSource};
