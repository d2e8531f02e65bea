//! Error types for the integration crate.
//!
//! - `HttpActionError`: transport failures of an outbound HTTP action
//! - `MessagingError`: failures sending through the messaging provider
//! - `SettingsError`: settings lookup failures
//! - `ChannelError`: channel lookup failures

use std::fmt;

/// Transport failures of an outbound HTTP action.
///
/// These never escape the HTTP action node: they are turned into an
/// unsuccessful outcome and routed along the node's `error` edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpActionError {
    /// The request did not complete within its timeout.
    Timeout { timeout_ms: u64 },
    /// The server answered with a redirect.
    Redirect { status: u16 },
    /// The response body exceeded the size cap.
    ResponseTooLarge { limit_bytes: usize },
    /// The request could not be sent or the body could not be read.
    RequestFailed { details: String },
}

impl fmt::Display for HttpActionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout { timeout_ms } => {
                write!(f, "request timed out after {timeout_ms}ms")
            }
            Self::Redirect { status } => {
                write!(f, "redirects not supported (status {status})")
            }
            Self::ResponseTooLarge { limit_bytes } => {
                write!(f, "response exceeds {limit_bytes} bytes")
            }
            Self::RequestFailed { details } => {
                write!(f, "request failed: {details}")
            }
        }
    }
}

impl std::error::Error for HttpActionError {}

/// Errors from the messaging provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    /// The provider rejected the message.
    Provider { status: u16, details: String },
    /// The provider could not be reached.
    Transport { details: String },
    /// The provider's response could not be understood.
    InvalidResponse { details: String },
}

impl fmt::Display for MessagingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Provider { status, details } => {
                write!(f, "messaging provider returned {status}: {details}")
            }
            Self::Transport { details } => {
                write!(f, "messaging provider unreachable: {details}")
            }
            Self::InvalidResponse { details } => {
                write!(f, "invalid messaging provider response: {details}")
            }
        }
    }
}

impl std::error::Error for MessagingError {}

/// Errors from settings lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    /// Storage operation failed.
    StorageFailed { key: String, reason: String },
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StorageFailed { key, reason } => {
                write!(f, "failed to read setting '{key}': {reason}")
            }
        }
    }
}

impl std::error::Error for SettingsError {}

/// Errors from channel lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    /// Storage operation failed.
    StorageFailed { reason: String },
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StorageFailed { reason } => {
                write!(f, "channel lookup failed: {reason}")
            }
        }
    }
}

impl std::error::Error for ChannelError {}
