//! Outbound integrations for the chatflow engine.
//!
//! This crate provides:
//!
//! - **Template Resolver**: `{{path.to.value}}` placeholders resolved
//!   against a JSON scope
//! - **JSON Paths**: dot/bracket lookups shared by templates and response
//!   mapping
//! - **Secure HTTP Action**: HTTPS-only, allowlisted, redirect-free,
//!   size-capped outbound calls behind a transport seam
//! - **Messaging**: the provider send API seam and its HTTP client
//! - **Settings and Channels**: lookups the engine needs at send time

pub mod channel;
pub mod error;
pub mod http_action;
pub mod json_path;
pub mod messaging;
pub mod settings;
pub mod template;

pub use channel::{Channel, ChannelDirectory, InMemoryChannelDirectory};
pub use error::{ChannelError, HttpActionError, MessagingError, SettingsError};
pub use http_action::{
    DomainAllowlist, HttpActionLimits, HttpActionOutcome, HttpRequestBody, HttpTransport,
    PreparedRequest, ReqwestTransport, RequestAuth, SecureHttpAction, TransportResponse,
};
pub use messaging::{
    InteractiveMessage, LocationMessage, MediaMessage, MessagingClient, WhapiClient,
};
pub use settings::{InMemorySettingsStore, SettingsStore, keys as setting_keys};
